//! Translation between the OpenAI chat contract and backend-native shapes.
//!
//! Prediction backends take a single prompt string plus flat sampling
//! knobs; engines already speak the chat contract and only need the model
//! name and configured defaults filled in.

use std::pin::Pin;

use async_stream::stream;
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::{Map, Value};

use crate::domain::{
    CHAT_COMPLETION_CHUNK_OBJECT, CHAT_COMPLETION_OBJECT, ChatChoice, ChatCompletionChunk,
    ChatCompletionRequest, ChatCompletionResponse, ChatDelta, ChatMessage, ChunkChoice,
    ModelConfig, Prediction, ResponseMessage,
};
use crate::error::GatewayError;
use crate::ports::{ChunkStream, PredictionStream};

/// Finish reason reported for every terminal prediction.
pub const FINISH_STOP: &str = "stop";

/// One item of a gateway chat stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Chunk(ChatCompletionChunk),
    /// Normal end of stream.
    Done,
    /// Terminal failure. Nothing follows it.
    Error(GatewayError),
}

pub type ChatEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

// =============================================================================
// Request direction
// =============================================================================

fn role_label(role: &str) -> String {
    match role {
        "system" | "developer" => "System".to_string(),
        "user" => "User".to_string(),
        "assistant" => "Assistant".to_string(),
        other => {
            let mut chars = other.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        }
    }
}

/// Flatten a conversation into one prompt.
///
/// A lone user message passes through verbatim. Anything else becomes
/// `Role: content` lines in original order.
pub fn flatten_messages(messages: &[ChatMessage]) -> String {
    if let [only] = messages {
        if only.role == "user" {
            return only.content.to_text();
        }
    }
    messages
        .iter()
        .map(|message| format!("{}: {}", role_label(&message.role), message.content.to_text()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the prediction input for a chat request.
///
/// Only fields the caller set are emitted; defaults are merged later by
/// the provider client.
pub fn to_native(request: &ChatCompletionRequest) -> Result<Map<String, Value>, GatewayError> {
    if request.messages.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "messages must not be empty".to_string(),
        ));
    }

    let mut input = Map::new();
    input.insert("prompt".into(), Value::String(flatten_messages(&request.messages)));
    if let Some(temperature) = request.temperature {
        input.insert("temperature".into(), Value::from(temperature));
    }
    if let Some(max_tokens) = request.effective_max_tokens() {
        input.insert("max_tokens".into(), Value::from(max_tokens));
    }
    if let Some(top_p) = request.top_p {
        input.insert("top_p".into(), Value::from(top_p));
    }
    if let Some(stop) = &request.stop {
        let joined = stop.to_vec().join(",");
        if !joined.is_empty() {
            input.insert("stop_sequences".into(), Value::String(joined));
        }
    }
    Ok(input)
}

/// Engine request: served model name plus configured defaults for any
/// sampling field the caller left unset.
pub fn apply_engine_defaults(
    request: &ChatCompletionRequest,
    config: &ModelConfig,
) -> ChatCompletionRequest {
    let mut native = request.clone();
    native.model.clone_from(&config.native_model_name);

    let defaults = &config.default_parameters;
    if native.temperature.is_none() {
        native.temperature = defaults.get("temperature").and_then(Value::as_f64);
    }
    if native.top_p.is_none() {
        native.top_p = defaults.get("top_p").and_then(Value::as_f64);
    }
    if native.effective_max_tokens().is_none() {
        native.max_tokens = defaults
            .get("max_tokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());
    }
    native
}

// =============================================================================
// Response direction
// =============================================================================

fn completion_id(prediction_id: &str) -> String {
    format!("chatcmpl-{prediction_id}")
}

/// Build a chat response from a succeeded prediction.
pub fn from_native(prediction: &Prediction, request: &ChatCompletionRequest) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: completion_id(&prediction.id),
        object: CHAT_COMPLETION_OBJECT.to_string(),
        created: chrono::Utc::now().timestamp(),
        model: request.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: prediction.output_text(),
            },
            finish_reason: Some(FINISH_STOP.to_string()),
        }],
        usage: prediction.usage(),
    }
}

/// Produces the chunks of one streamed completion.
///
/// The first chunk emitted carries `role: "assistant"`.
#[derive(Debug, Clone)]
pub struct ChunkBuilder {
    id: String,
    model: String,
    created: i64,
    role_sent: bool,
}

impl ChunkBuilder {
    pub fn new(id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            model: model.into(),
            created: chrono::Utc::now().timestamp(),
            role_sent: false,
        }
    }

    /// Builder with a fresh random id.
    pub fn for_request(request: &ChatCompletionRequest) -> Self {
        Self::new(
            completion_id(&uuid::Uuid::new_v4().simple().to_string()),
            request.model.clone(),
        )
    }

    fn chunk(&mut self, content: Option<String>, finish_reason: Option<String>) -> ChatCompletionChunk {
        let role = (!self.role_sent).then(|| "assistant".to_string());
        self.role_sent = true;
        ChatCompletionChunk {
            id: self.id.clone(),
            object: CHAT_COMPLETION_CHUNK_OBJECT.to_string(),
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChatDelta { role, content },
                finish_reason,
            }],
        }
    }

    pub fn delta(&mut self, text: &str) -> ChatCompletionChunk {
        self.chunk(Some(text.to_string()), None)
    }

    pub fn finish(&mut self) -> ChatCompletionChunk {
        self.chunk(None, Some(FINISH_STOP.to_string()))
    }
}

/// Re-wrap an emulated prediction stream as chat events.
///
/// Each non-empty suffix becomes one delta chunk, followed by a finish
/// chunk and [`StreamEvent::Done`]. A backend error yields a single
/// [`StreamEvent::Error`] and ends the stream.
pub fn stream_events(mut upstream: PredictionStream, builder: ChunkBuilder) -> ChatEventStream {
    Box::pin(stream! {
        let mut builder = builder;
        let mut failed = false;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(text) if text.is_empty() => {}
                Ok(text) => {
                    yield StreamEvent::Chunk(builder.delta(&text));
                }
                Err(err) => {
                    yield StreamEvent::Error(GatewayError::from(err));
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            yield StreamEvent::Chunk(builder.finish());
            yield StreamEvent::Done;
        }
    })
}

/// Relay an engine's native chunk stream, relabeling chunks with the
/// gateway model id.
pub fn relay_engine_stream(mut upstream: ChunkStream, model_id: String) -> ChatEventStream {
    Box::pin(stream! {
        let mut failed = false;
        while let Some(item) = upstream.next().await {
            match item {
                Ok(mut chunk) => {
                    chunk.model.clone_from(&model_id);
                    yield StreamEvent::Chunk(chunk);
                }
                Err(err) => {
                    yield StreamEvent::Error(GatewayError::from(err));
                    failed = true;
                    break;
                }
            }
        }
        if !failed {
            yield StreamEvent::Done;
        }
    })
}
