//! Internal error types for provider operations.
//!
//! These errors stay inside `infergate-provider` and are mapped to
//! [`infergate_core::BackendError`] at the port boundary.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// Upstream answered with a non-success status.
    #[error("Upstream request to {url} failed with status {status}: {message}")]
    Status {
        status: u16,
        url: String,
        /// Redacted, truncated response body.
        message: String,
    },

    /// Connection, DNS, TLS or read failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Body could not be decoded into the expected shape.
    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Prediction {id} did not finish within {waited:?}")]
    Timeout { id: String, waited: Duration },

    #[error("Prediction {id} failed: {message}")]
    PredictionFailed { id: String, message: String },

    #[error("Prediction {id} was canceled")]
    PredictionCanceled { id: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl ProviderError {
    /// HTTP 429, 5xx and network errors are worth retrying.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// Short label for metrics.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { status, .. } if *status == 429 => "rate_limited",
            Self::Status { status, .. } if *status >= 500 => "server_error",
            Self::Status { .. } => "client_error",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
            Self::InvalidArgument(_) | Self::InvalidUrl(_) => "invalid",
            Self::Timeout { .. } => "timeout",
            Self::PredictionFailed { .. } => "failed",
            Self::PredictionCanceled { .. } => "canceled",
            Self::Client(_) => "client",
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        let message = infergate_core::redact(&err.to_string());
        if err.is_decode() {
            Self::Decode(message)
        } else if err.is_builder() {
            Self::Client(message)
        } else {
            Self::Network(message)
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_message() {
        let error = ProviderError::Status {
            status: 422,
            url: "https://api.example.com/v1/predictions".to_string(),
            message: "invalid input".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("invalid input"));
        assert!(!error.is_retryable());
        assert_eq!(error.kind(), "client_error");
    }

    #[test]
    fn test_retryable_classes() {
        let status = |status| ProviderError::Status {
            status,
            url: String::new(),
            message: String::new(),
        };
        assert!(status(429).is_retryable());
        assert!(status(502).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(ProviderError::Network("reset".into()).is_retryable());
        assert!(!ProviderError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_json_error_converts_to_decode() {
        let err: ProviderError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProviderError::Decode(_)));
    }
}
