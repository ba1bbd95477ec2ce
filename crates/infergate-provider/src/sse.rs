//! Server-Sent Events decoding for engine chat streams.
//!
//! Engines stream `data: {chunk}` lines separated by blank lines and end
//! with `data: [DONE]`. Chunks may be split across network reads, so bytes
//! are buffered until a full line is available.

use std::pin::Pin;

use bytes::BytesMut;
use futures_util::{Stream, StreamExt};
use infergate_core::ChatCompletionChunk;
use tracing::{debug, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::http::ByteStream;

/// Decoded chat chunks.
pub type SseChunkStream = Pin<Box<dyn Stream<Item = ProviderResult<ChatCompletionChunk>> + Send>>;

/// State threaded through the `unfold` stream.
struct SseState {
    stream: ByteStream,
    buf: BytesMut,
    done: bool,
}

/// Decode an SSE byte stream into chat completion chunks.
///
/// Ends at `[DONE]` or when upstream closes. A malformed data line or a
/// transport error is yielded once and ends the stream.
pub fn decode_chunks(byte_stream: ByteStream) -> SseChunkStream {
    let state = SseState {
        stream: byte_stream,
        buf: BytesMut::new(),
        done: false,
    };

    futures_util::stream::unfold(state, |mut st| async move {
        if st.done {
            return None;
        }

        loop {
            if let Some(line_end) = st.buf.iter().position(|b| *b == b'\n') {
                let line = st.buf.split_to(line_end + 1);
                let line = String::from_utf8_lossy(&line);
                let trimmed = line.trim();

                // Blank separators and `:` comments.
                if trimmed.is_empty() || trimmed.starts_with(':') {
                    continue;
                }

                let Some(data) = trimmed.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data == "[DONE]" {
                    st.done = true;
                    return None;
                }

                return match serde_json::from_str::<ChatCompletionChunk>(data) {
                    Ok(chunk) => Some((Ok(chunk), st)),
                    Err(e) => {
                        warn!(error = %e, "Malformed SSE chunk from engine");
                        st.done = true;
                        Some((Err(ProviderError::Decode(e.to_string())), st))
                    }
                };
            }

            match st.stream.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    warn!(error = %e, "Engine stream broke");
                    st.done = true;
                    return Some((Err(e), st));
                }
                None => {
                    // Flush a final line that had no trailing newline.
                    if !st.buf.is_empty() {
                        st.buf.extend_from_slice(b"\n");
                        continue;
                    }
                    debug!("Engine stream closed without [DONE]");
                    return None;
                }
            }
        }
    })
    .boxed()
}
