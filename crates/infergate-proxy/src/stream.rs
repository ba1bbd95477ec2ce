//! Server-sent event framing for gateway streams.

use std::convert::Infallible;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use infergate_core::{ChatEventStream, StreamEvent};
use tracing::warn;

use crate::models::ErrorResponse;

const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Render one event as an SSE frame.
pub(crate) fn frame(event: &StreamEvent) -> Bytes {
    let payload = match event {
        StreamEvent::Chunk(chunk) => serde_json::to_string(chunk),
        StreamEvent::Done => return Bytes::from_static(DONE_FRAME.as_bytes()),
        StreamEvent::Error(err) => {
            warn!(code = err.code(), "Stream ended with error");
            serde_json::to_string(&ErrorResponse::from(err))
        }
    };
    // Serializing these plain structs cannot fail; fall back to an empty object.
    let json = payload.unwrap_or_else(|_| "{}".to_string());
    Bytes::from(format!("data: {json}\n\n"))
}

fn sse_body(events: ChatEventStream) -> impl Stream<Item = Result<Bytes, Infallible>> + Send {
    events.map(|event| Ok(frame(&event)))
}

/// Wrap a gateway stream in a `text/event-stream` response.
pub(crate) fn sse_response(events: ChatEventStream) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(sse_body(events)))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
