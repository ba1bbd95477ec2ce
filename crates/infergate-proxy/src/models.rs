//! OpenAI API envelope types served by the proxy.
//!
//! Chat request/response bodies are the core's domain types; this module
//! only adds the list and error envelopes.

use infergate_core::{Capability, GatewayError, ModelConfig};
use serde::Serialize;

// =============================================================================
// Model Listing Types
// =============================================================================

/// Response from the /v1/models endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub object: String,
    pub data: Vec<ModelEntry>,
}

impl ModelsResponse {
    pub fn from_configs(configs: Vec<ModelConfig>) -> Self {
        Self {
            object: "list".to_string(),
            data: configs.iter().map(ModelEntry::from).collect(),
        }
    }
}

/// A single registered model (OpenAI format).
#[derive(Debug, Clone, Serialize)]
pub struct ModelEntry {
    pub id: String,
    pub object: String,
    pub created: i64,
    /// Provider type the model is served by.
    pub owned_by: String,
    pub capabilities: Vec<Capability>,
}

impl From<&ModelConfig> for ModelEntry {
    fn from(config: &ModelConfig) -> Self {
        Self {
            id: config.model_id.clone(),
            object: "model".to_string(),
            created: 0,
            owned_by: config.provider_type.as_str().to_string(),
            capabilities: config.capabilities.clone(),
        }
    }
}

// =============================================================================
// Error Response Types
// =============================================================================

/// Error response matching OpenAI format.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn with_code(
        message: impl Into<String>,
        error_type: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                r#type: error_type.into(),
                code: Some(code.into()),
            },
        }
    }

    /// Body could not be parsed as a chat request.
    pub fn invalid_body(reason: &str) -> Self {
        Self::with_code(
            format!("Invalid request body: {reason}"),
            "invalid_request_error",
            "invalid_request",
        )
    }
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        Self::with_code(err.public_message(), err.error_type(), err.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infergate_core::ProviderType;
    use serde_json::json;

    #[test]
    fn test_error_envelope_shape() {
        let err = GatewayError::ModelNotFound("ghost".into());
        let body = serde_json::to_value(ErrorResponse::from(&err)).unwrap();
        assert_eq!(body["error"]["type"], json!("invalid_request_error"));
        assert_eq!(body["error"]["code"], json!("model_not_found"));
        assert!(body["error"]["message"].as_str().unwrap().contains("ghost"));
    }

    #[test]
    fn test_model_entry_reports_provider() {
        let config = ModelConfig::new("local", ProviderType::Engine, "qwen");
        let entry = ModelEntry::from(&config);
        assert_eq!(entry.owned_by, "engine");
        assert_eq!(entry.object, "model");
    }
}
