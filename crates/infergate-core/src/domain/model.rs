//! Per-model routing configuration.
//!
//! A [`ModelConfig`] is built once from configuration (see
//! [`crate::config`]) and is read by every request. Runtime updates go
//! through [`crate::registry::ProviderRegistry::update_endpoints`], which
//! swaps whole records under the registry lock.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of backend serving a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    /// Cloud create-then-poll prediction API.
    #[serde(alias = "replicate")]
    Prediction,
    /// Process-hosted OpenAI-compatible engine (vLLM, Ollama, llama-server).
    #[serde(alias = "vllm", alias = "ollama")]
    Engine,
}

impl ProviderType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prediction => "prediction",
            Self::Engine => "engine",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A feature a model is allowed to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Chat,
    Streaming,
    TextToImage,
    Embeddings,
}

impl Capability {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Streaming => "streaming",
            Self::TextToImage => "text-to-image",
            Self::Embeddings => "embeddings",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Credential resolved from an environment indirection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// Name of the environment variable the secret came from.
    pub source_var: String,
    pub secret: Secret,
}

/// Parsed `owner/name[:version]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRef {
    pub owner: String,
    pub name: String,
    pub version: Option<String>,
}

impl ModelRef {
    /// Parse `owner/name` or `owner/name:version`.
    ///
    /// Returns `None` when either part is empty or the shape is wrong.
    pub fn parse(raw: &str) -> Option<Self> {
        let (path, version) = match raw.split_once(':') {
            Some((path, version)) if !version.is_empty() => (path, Some(version.to_string())),
            Some(_) => return None,
            None => (raw, None),
        };

        let (owner, name) = path.split_once('/')?;
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return None;
        }

        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            version,
        })
    }

    /// `owner/name` without the version suffix.
    pub fn path(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}:{version}", self.owner, self.name),
            None => write!(f, "{}/{}", self.owner, self.name),
        }
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub requests_per_second: f64,
    pub burst_capacity: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            requests_per_second: 1.0,
            burst_capacity: 5,
        }
    }
}

/// Response cache parameters for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

/// Fully validated configuration for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub model_id: String,
    pub provider_type: ProviderType,
    /// Name the backend knows the model by (`owner/name[:version]` for
    /// prediction backends, served model name for engines).
    pub native_model_name: String,
    pub credential: Option<Credential>,
    /// Backend base URL. Engines may leave this empty until discovered.
    pub base_url: Option<String>,
    /// Forwarded to the prediction provider. Requests carrying one bypass
    /// the response cache.
    pub webhook: Option<String>,
    pub default_parameters: Map<String, Value>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub rate_limit: RateLimit,
    pub cache_policy: CachePolicy,
    pub capabilities: Vec<Capability>,
}

impl ModelConfig {
    /// Minimal config with defaults, mostly useful for tests and embedding.
    pub fn new(
        model_id: impl Into<String>,
        provider_type: ProviderType,
        native_model_name: impl Into<String>,
    ) -> Self {
        Self {
            model_id: model_id.into(),
            provider_type,
            native_model_name: native_model_name.into(),
            credential: None,
            base_url: None,
            webhook: None,
            default_parameters: Map::new(),
            timeout: Duration::from_secs(120),
            max_retries: 3,
            rate_limit: RateLimit::default(),
            cache_policy: CachePolicy::default(),
            capabilities: vec![Capability::Chat, Capability::Streaming],
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Parsed reference for prediction backends.
    pub fn model_ref(&self) -> Option<ModelRef> {
        ModelRef::parse(&self.native_model_name)
    }

    /// Return a copy with `patch` applied.
    #[must_use]
    pub fn patched(&self, patch: &EndpointPatch) -> Self {
        let mut next = self.clone();
        if let Some(base_url) = &patch.base_url {
            next.base_url = Some(base_url.clone());
        }
        if let Some(name) = &patch.native_model_name {
            next.native_model_name.clone_from(name);
        }
        next
    }
}

/// Runtime-discovered fields merged into a [`ModelConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPatch {
    pub base_url: Option<String>,
    pub native_model_name: Option<String>,
}

impl EndpointPatch {
    pub fn base_url(url: impl Into<String>) -> Self {
        Self {
            base_url: Some(url.into()),
            native_model_name: None,
        }
    }
}
