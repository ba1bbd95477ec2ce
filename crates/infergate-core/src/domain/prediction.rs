//! Prediction-style backend objects.
//!
//! A prediction is an asynchronous job: it is created, polled until it
//! reaches a terminal status, and may be canceled. These types mirror the
//! JSON the prediction API returns. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::chat::Usage;

/// Lifecycle of a prediction.
///
/// `Succeeded`, `Failed` and `Canceled` are terminal; polling stops there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl PredictionStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for PredictionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing and token metrics reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predict_time: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_token_count: Option<u32>,
}

/// Links returned alongside a prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionUrls {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<String>,
}

/// A prediction as returned by create/get/cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub status: PredictionStatus,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub metrics: Option<PredictionMetrics>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Prediction {
    /// Text view of the output. See [`output_text`].
    pub fn output_text(&self) -> String {
        self.output.as_ref().map_or_else(String::new, output_text)
    }

    /// Backend error message, if the prediction reported one.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Token usage, zero-filled where counts are absent.
    pub fn usage(&self) -> Usage {
        let metrics = self.metrics.clone().unwrap_or_default();
        Usage::new(
            metrics.input_token_count.unwrap_or(0),
            metrics.output_token_count.unwrap_or(0),
        )
    }
}

/// Convert a prediction output into text.
///
/// Strings are returned as-is, arrays are concatenated element by element
/// (language models emit token lists), `null` becomes empty, and anything
/// else is rendered as its JSON text.
pub fn output_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect(),
        other => other.to_string(),
    }
}

/// Body of a create-prediction call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Native input object (prompt, temperature, ...).
    pub input: Map<String, Value>,
    /// Pinned version. When absent the model's latest version runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl PredictionRequest {
    pub fn new(input: Map<String, Value>) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Model metadata from `GET /models/{owner}/{name}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub latest_version: Option<ModelVersion>,
}

/// A published model version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelVersion {
    pub id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}
