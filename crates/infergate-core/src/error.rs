//! Request-level error type.
//!
//! [`GatewayError`] is what the gateway service returns for a single chat
//! request. It is `Clone` so a coalesced cache fetch can hand the same
//! failure to every waiter.

use thiserror::Error;

use crate::admission::AdmissionError;
use crate::domain::Capability;
use crate::ports::{BackendError, EngineRuntimeError};
use crate::redact::redact;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Model '{0}' is not registered")]
    ModelNotFound(String),

    #[error("Model '{model}' does not support {capability}")]
    UnsupportedCapability {
        model: String,
        capability: Capability,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream kept answering 429 after all retries.
    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    /// Non-retryable upstream 4xx. The status is passed through.
    #[error("Upstream rejected the request ({status}): {message}")]
    UpstreamRejected { status: u16, message: String },

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),

    #[error("Prediction was canceled upstream: {0}")]
    PredictionCanceled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Admission error: {0}")]
    Admission(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The coalesced fetch this request was waiting on went away without
    /// a result.
    #[error("Shared fetch was abandoned before completing")]
    Abandoned,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status this failure maps to.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::ModelNotFound(_) => 404,
            Self::UnsupportedCapability { .. } | Self::InvalidRequest(_) => 400,
            Self::RateLimited(_) => 429,
            Self::UpstreamRejected { status, .. } if *status >= 400 && *status < 500 => *status,
            Self::UpstreamRejected { .. }
            | Self::Upstream(_)
            | Self::PredictionFailed(_)
            | Self::PredictionCanceled(_) => 502,
            Self::Timeout(_) => 504,
            Self::Abandoned => 503,
            Self::Admission(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Short stable code for the error body.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ModelNotFound(_) => "model_not_found",
            Self::UnsupportedCapability {
                capability: Capability::Streaming,
                ..
            } => "streaming_not_supported",
            Self::UnsupportedCapability { .. } => "unsupported_capability",
            Self::InvalidRequest(_) => "invalid_request",
            Self::RateLimited(_) => "rate_limited",
            Self::UpstreamRejected { .. } => "upstream_rejected",
            Self::Upstream(_) => "upstream_error",
            Self::PredictionFailed(_) => "prediction_failed",
            Self::PredictionCanceled(_) => "prediction_canceled",
            Self::Timeout(_) => "timeout",
            Self::Admission(_) => "admission_error",
            Self::Configuration(_) => "configuration_error",
            Self::Abandoned => "fetch_abandoned",
            Self::Internal(_) => "internal_error",
        }
    }

    /// OpenAI-style error `type`.
    pub const fn error_type(&self) -> &'static str {
        match self.status_code() {
            400 | 404 => "invalid_request_error",
            429 => "rate_limit_error",
            401 | 403 => "authentication_error",
            500 => "server_error",
            _ => "upstream_error",
        }
    }

    /// Message safe to show a caller.
    pub fn public_message(&self) -> String {
        redact(&self.to_string())
    }

    /// Low-cardinality outcome label for metrics.
    pub const fn outcome(&self) -> &'static str {
        self.code()
    }
}

impl From<BackendError> for GatewayError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status: 429, message } => Self::RateLimited(message),
            BackendError::Status { status, message } if (400..500).contains(&status) => {
                Self::UpstreamRejected { status, message }
            }
            BackendError::Status { status, message } => {
                Self::Upstream(format!("HTTP {status}: {message}"))
            }
            BackendError::Network(msg) => Self::Upstream(msg),
            err @ BackendError::Timeout { .. } => Self::Timeout(err.to_string()),
            BackendError::Failed {
                prediction_id,
                message,
            } => Self::PredictionFailed(format!("{prediction_id}: {message}")),
            BackendError::Canceled { prediction_id } => Self::PredictionCanceled(prediction_id),
            BackendError::InvalidResponse(msg) => Self::Upstream(msg),
            BackendError::InvalidArgument(msg) => Self::InvalidRequest(msg),
            BackendError::Configuration(msg) => Self::Configuration(msg),
        }
    }
}

impl From<AdmissionError> for GatewayError {
    fn from(err: AdmissionError) -> Self {
        Self::Admission(err.to_string())
    }
}

impl From<EngineRuntimeError> for GatewayError {
    fn from(err: EngineRuntimeError) -> Self {
        if matches!(err, EngineRuntimeError::NotManaged(_)) {
            Self::Configuration(err.to_string())
        } else {
            Self::Upstream(err.to_string())
        }
    }
}

/// Result alias for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn status(status: u16) -> BackendError {
        BackendError::Status {
            status,
            message: "upstream said no".into(),
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(GatewayError::from(status(429)).status_code(), 429);
        assert_eq!(GatewayError::from(status(503)).status_code(), 502);
        assert_eq!(GatewayError::from(status(401)).status_code(), 401);
        assert_eq!(GatewayError::from(status(404)).status_code(), 404);
        for odd in [101, 204, 302, 304] {
            let err = GatewayError::from(status(odd));
            assert_eq!(err.status_code(), 502, "status {odd}");
            assert_eq!(err.code(), "upstream_error");
        }
        let direct = GatewayError::UpstreamRejected {
            status: 302,
            message: "moved".into(),
        };
        assert_eq!(direct.status_code(), 502);
        assert_eq!(
            GatewayError::from(BackendError::Network("refused".into())).status_code(),
            502
        );
        let timeout = GatewayError::from(BackendError::Timeout {
            prediction_id: "p1".into(),
            waited: Duration::from_secs(5),
        });
        assert_eq!(timeout.status_code(), 504);
        assert_eq!(timeout.code(), "timeout");
    }

    #[test]
    fn test_capability_codes() {
        let streaming = GatewayError::UnsupportedCapability {
            model: "m1".into(),
            capability: Capability::Streaming,
        };
        assert_eq!(streaming.status_code(), 400);
        assert_eq!(streaming.code(), "streaming_not_supported");
        assert_eq!(streaming.error_type(), "invalid_request_error");

        let image = GatewayError::UnsupportedCapability {
            model: "m1".into(),
            capability: Capability::TextToImage,
        };
        assert_eq!(image.code(), "unsupported_capability");
        assert!(image.to_string().contains("text-to-image"));
    }

    #[test]
    fn test_public_message_is_redacted() {
        let err = GatewayError::from(BackendError::Status {
            status: 401,
            message: "bad token r8_0123456789abcdef".into(),
        });
        let message = err.public_message();
        assert!(!message.contains("r8_0123456789abcdef"));
        assert!(message.contains("401"));
    }

    #[test]
    fn test_canceled_is_distinct_from_failed() {
        let canceled = GatewayError::from(BackendError::Canceled {
            prediction_id: "p9".into(),
        });
        assert_eq!(canceled.code(), "prediction_canceled");
        assert_eq!(canceled.status_code(), 502);
    }
}
