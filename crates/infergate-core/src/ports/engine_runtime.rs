//! Engine runtime port.
//!
//! Process-hosted engines are started and supervised by an external
//! process manager. The gateway only needs to ask it for a reachable base
//! URL when a model's configuration does not carry one.

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// A running engine instance the gateway can route to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningEngine {
    /// Full URL of the engine (e.g., <http://127.0.0.1:8000>).
    pub base_url: String,
    /// Model name the engine serves under.
    pub model_name: String,
}

impl RunningEngine {
    /// Engine listening on localhost.
    #[must_use]
    pub fn local(port: u16, model_name: impl Into<String>) -> Self {
        Self {
            base_url: format!("http://127.0.0.1:{port}"),
            model_name: model_name.into(),
        }
    }
}

/// Errors reported by the process manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineRuntimeError {
    #[error("Engine not managed: {0}")]
    NotManaged(String),

    /// Engine is starting up. Callers should answer 503.
    #[error("Engine is starting, try again")]
    Starting,

    #[error("Failed to start engine: {0}")]
    StartFailed(String),

    #[error("Engine health check failed: {0}")]
    Unhealthy(String),
}

impl EngineRuntimeError {
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Starting)
    }

    #[must_use]
    pub const fn suggested_status_code(&self) -> u16 {
        match self {
            Self::Starting => 503,
            Self::NotManaged(_) => 404,
            Self::StartFailed(_) | Self::Unhealthy(_) => 502,
        }
    }
}

/// Port to the external engine process manager.
///
/// Implementations resolve a model to a running process, start it when
/// needed, and wait for it to become healthy.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EngineRuntimePort: Send + Sync + fmt::Debug {
    /// Ensure the engine for `model_id` is running and return its address.
    ///
    /// `model_name` is the served model name from configuration.
    async fn ensure_running(
        &self,
        model_id: &str,
        model_name: &str,
    ) -> Result<RunningEngine, EngineRuntimeError>;

    /// Address of the engine for `model_id` if it is already running.
    async fn running(&self, model_id: &str) -> Option<RunningEngine>;
}
