//! Backend ports.
//!
//! Two backend shapes exist: create-then-poll prediction APIs and
//! OpenAI-compatible engines. The gateway talks to both through these
//! traits; HTTP adapters live in `infergate-provider`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use thiserror::Error;

use crate::domain::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ModelConfig, Prediction,
    PredictionRequest,
};

/// Incremental text from an emulated prediction stream.
pub type PredictionStream = Pin<Box<dyn Stream<Item = Result<String, BackendError>> + Send>>;

/// Chunks from an engine's native SSE stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, BackendError>> + Send>>;

/// Errors surfaced by a backend adapter.
///
/// Retry has already happened inside the adapter by the time one of
/// these reaches the gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Upstream answered with a non-success status.
    #[error("Upstream returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Connection, DNS, or read failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Local deadline passed while the prediction was still running.
    #[error("Prediction {prediction_id} still running after {waited:?}")]
    Timeout {
        prediction_id: String,
        waited: Duration,
    },

    #[error("Prediction {prediction_id} failed: {message}")]
    Failed {
        prediction_id: String,
        message: String,
    },

    #[error("Prediction {prediction_id} was canceled")]
    Canceled { prediction_id: String },

    /// Upstream body could not be decoded.
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Backend misconfigured: {0}")]
    Configuration(String),
}

impl BackendError {
    /// 429, 5xx and network failures may succeed on retry.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) => true,
            _ => false,
        }
    }
}

/// Port for create-then-poll prediction backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PredictionPort: Send + Sync {
    /// Submit a job. Configured defaults are merged under `request.input`.
    async fn predict(&self, request: PredictionRequest) -> Result<Prediction, BackendError>;

    /// Current state of a job.
    async fn get_prediction(&self, id: &str) -> Result<Prediction, BackendError>;

    /// Ask the backend to stop a job.
    async fn cancel_prediction(&self, id: &str) -> Result<Prediction, BackendError>;

    /// Poll until terminal. Returns only succeeded predictions.
    ///
    /// On deadline a best-effort cancel is sent before
    /// [`BackendError::Timeout`] is returned.
    async fn wait_for_completion(
        &self,
        prediction: Prediction,
        timeout: Duration,
    ) -> Result<Prediction, BackendError>;

    /// Submit a job and yield newly appended output text per poll.
    fn stream_prediction(&self, request: PredictionRequest, max_wait: Duration) -> PredictionStream;
}

/// Port for OpenAI-compatible engines.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EnginePort: Send + Sync {
    async fn chat_completion(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, BackendError>;

    /// Open a streaming completion. Errors before the first chunk are
    /// returned directly; later errors arrive inside the stream.
    async fn chat_completion_stream(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, BackendError>;
}

/// A constructed backend for one model.
#[derive(Clone)]
pub enum Backend {
    Prediction(Arc<dyn PredictionPort>),
    Engine(Arc<dyn EnginePort>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prediction(_) => f.write_str("Backend::Prediction"),
            Self::Engine(_) => f.write_str("Backend::Engine"),
        }
    }
}

/// Builds backends from model configuration.
///
/// Called once per model the first time it is routed to; the result is
/// kept until the model is evicted.
#[cfg_attr(test, mockall::automock)]
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &ModelConfig) -> Result<Backend, BackendError>;
}
