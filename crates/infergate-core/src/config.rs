//! Gateway configuration loading and validation.
//!
//! Configuration is a YAML document with a `server` section and a `models`
//! map. Raw sections deserialize into [`RawModelConfig`]; validation turns
//! each into a [`ModelConfig`] once, at registration time, so no request
//! ever sees an invalid model.
//!
//! Credentials are never literals. `api_key` must be `env:NAME` or
//! `${NAME}`, resolved through the caller-supplied environment lookup.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::admission::MIN_REFILL_RATE;
use crate::domain::{
    CachePolicy, Capability, Credential, ModelConfig, ModelRef, ProviderType, RateLimit, Secret,
};

/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "INFERGATE_CONFIG";

/// File name looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "infergate.yaml";

/// Upper bound on `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Upper bound on a model's `timeout`, in seconds.
pub const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Configuration errors. All of them surface at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Model '{model}': api_key must be an env:NAME or ${{NAME}} reference, not a literal")]
    LiteralCredential { model: String },

    #[error("Model '{model}': prediction backends require an api_key")]
    MissingCredential { model: String },

    #[error("Model '{model}': environment variable {var} is not set")]
    UnsetEnvironment { model: String, var: String },

    #[error("Model '{model}': invalid model name '{name}' (expected owner/name[:version])")]
    InvalidModelName { model: String, name: String },

    #[error("Model '{model}': {field} {reason}")]
    InvalidRange {
        model: String,
        field: &'static str,
        reason: String,
    },

    #[error("Model '{model}': engine backends need a base_url when no engine runtime is attached")]
    MissingBaseUrl { model: String },
}

/// Fail on any engine model without a `base_url`.
///
/// Call this when the gateway will run without an engine runtime, since
/// nothing could discover those endpoints at request time.
pub fn require_engine_base_urls(models: &[ModelConfig]) -> Result<(), ConfigError> {
    models
        .iter()
        .find(|m| m.provider_type == ProviderType::Engine && m.base_url.is_none())
        .map_or(Ok(()), |m| {
            Err(ConfigError::MissingBaseUrl {
                model: m.model_id.clone(),
            })
        })
}

/// Listener and process-wide limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Upper bound on live rate-limiter buckets.
    pub max_buckets: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_buckets: 1024,
        }
    }
}

/// `rate_limit` section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawRateLimit {
    pub requests_per_second: f64,
    pub burst_capacity: u32,
}

/// `cache` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCachePolicy {
    #[serde(default)]
    pub enabled: bool,
    /// Seconds.
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,
    #[serde(default = "default_cache_size")]
    pub max_size: usize,
}

/// One entry of the `models` map, as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawModelConfig {
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub default_params: Map<String, Value>,
    /// Seconds.
    #[serde(default = "default_timeout")]
    pub timeout: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default)]
    pub rate_limit: Option<RawRateLimit>,
    #[serde(default)]
    pub cache: Option<RawCachePolicy>,
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<Capability>,
}

const fn default_timeout() -> f64 {
    120.0
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_cache_ttl() -> u64 {
    300
}

const fn default_cache_size() -> usize {
    1000
}

fn default_capabilities() -> Vec<Capability> {
    vec![Capability::Chat, Capability::Streaming]
}

impl RawModelConfig {
    /// Validate and resolve into a [`ModelConfig`].
    ///
    /// `env` resolves credential indirections; pass `|k| std::env::var(k).ok()`
    /// in production.
    pub fn resolve(
        &self,
        model_id: &str,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<ModelConfig, ConfigError> {
        let model = || model_id.to_string();
        let range = |field, reason: &str| ConfigError::InvalidRange {
            model: model(),
            field,
            reason: reason.to_string(),
        };

        if self.provider_type == ProviderType::Prediction && ModelRef::parse(&self.model).is_none()
        {
            return Err(ConfigError::InvalidModelName {
                model: model(),
                name: self.model.clone(),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModelName {
                model: model(),
                name: self.model.clone(),
            });
        }

        let credential = match &self.api_key {
            Some(raw) => Some(resolve_credential(model_id, raw, env)?),
            None if self.provider_type == ProviderType::Prediction => {
                return Err(ConfigError::MissingCredential { model: model() });
            }
            None => None,
        };

        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(range("timeout", "must be greater than 0"));
        }
        let timeout = Duration::try_from_secs_f64(self.timeout)
            .ok()
            .filter(|t| t.as_secs_f64() <= MAX_TIMEOUT_SECS)
            .ok_or_else(|| {
                range(
                    "timeout",
                    &format!("must be at most {MAX_TIMEOUT_SECS} seconds"),
                )
            })?;
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(range(
                "max_retries",
                &format!("must be at most {MAX_RETRIES_LIMIT}"),
            ));
        }

        let rate_limit = match self.rate_limit {
            Some(raw) => {
                if !(raw.requests_per_second.is_finite()
                    && raw.requests_per_second >= MIN_REFILL_RATE)
                {
                    return Err(range(
                        "rate_limit.requests_per_second",
                        &format!("must be at least {MIN_REFILL_RATE}"),
                    ));
                }
                if raw.burst_capacity == 0 {
                    return Err(range("rate_limit.burst_capacity", "must be at least 1"));
                }
                RateLimit {
                    requests_per_second: raw.requests_per_second,
                    burst_capacity: raw.burst_capacity,
                }
            }
            None => RateLimit::default(),
        };

        let cache_policy = match &self.cache {
            Some(raw) => {
                if raw.enabled && raw.max_size == 0 {
                    return Err(range("cache.max_size", "must be at least 1"));
                }
                if raw.enabled && raw.ttl == 0 {
                    return Err(range("cache.ttl", "must be at least 1 second"));
                }
                CachePolicy {
                    enabled: raw.enabled,
                    ttl: Duration::from_secs(raw.ttl),
                    max_size: raw.max_size,
                }
            }
            None => CachePolicy::default(),
        };

        if !self.capabilities.contains(&Capability::Chat)
            && self.capabilities.contains(&Capability::Streaming)
        {
            debug!(model = %model_id, "Model advertises streaming without chat");
        }

        Ok(ModelConfig {
            model_id: model(),
            provider_type: self.provider_type,
            native_model_name: self.model.clone(),
            credential,
            base_url: self
                .base_url
                .as_ref()
                .map(|url| url.trim_end_matches('/').to_string()),
            webhook: self.webhook.clone(),
            default_parameters: self.default_params.clone(),
            timeout,
            max_retries: self.max_retries,
            rate_limit,
            cache_policy,
            capabilities: self.capabilities.clone(),
        })
    }
}

/// Resolve an `env:NAME` / `${NAME}` reference.
fn resolve_credential(
    model_id: &str,
    raw: &str,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<Credential, ConfigError> {
    let raw = raw.trim();
    let var = raw
        .strip_prefix("env:")
        .or_else(|| raw.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')))
        .map(str::trim)
        .filter(|var| !var.is_empty())
        .ok_or_else(|| ConfigError::LiteralCredential {
            model: model_id.to_string(),
        })?;

    match env(var) {
        Some(value) if !value.is_empty() => Ok(Credential {
            source_var: var.to_string(),
            secret: Secret::new(value),
        }),
        _ => Err(ConfigError::UnsetEnvironment {
            model: model_id.to_string(),
            var: var.to_string(),
        }),
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub models: BTreeMap<String, RawModelConfig>,
}

impl GatewayConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Locate the config file.
    ///
    /// Order: explicit path, then `INFERGATE_CONFIG`, then
    /// `./infergate.yaml`. Returns `None` when nothing is found.
    pub fn discover(
        explicit: Option<&Path>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Some(path) = env(CONFIG_ENV_VAR).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(DEFAULT_CONFIG_FILE);
        local.exists().then_some(local)
    }

    /// Validate every model. Fails on the first invalid entry.
    pub fn model_configs(
        &self,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Vec<ModelConfig>, ConfigError> {
        self.models
            .iter()
            .map(|(id, raw)| raw.resolve(id, env))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r"
server:
  port: 9090
models:
  m1:
    type: replicate
    model: meta/llama-3-8b-instruct
    api_key: env:PROVIDER_TOKEN
    default_params:
      temperature: 0.7
    timeout: 30
    rate_limit:
      requests_per_second: 10
      burst_capacity: 20
    cache:
      enabled: true
      ttl: 60
  local:
    type: vllm
    model: qwen2.5-7b
    base_url: http://127.0.0.1:8000/
    capabilities: [chat]
";

    fn env_with_token(key: &str) -> Option<String> {
        (key == "PROVIDER_TOKEN").then(|| "r8_testtoken".to_string())
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_and_resolve() {
        let config = GatewayConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "127.0.0.1");

        let models = config.model_configs(&env_with_token).unwrap();
        assert_eq!(models.len(), 2);

        let local = &models[0];
        assert_eq!(local.model_id, "local");
        assert_eq!(local.provider_type, ProviderType::Engine);
        assert_eq!(local.base_url.as_deref(), Some("http://127.0.0.1:8000"));
        assert!(!local.supports(Capability::Streaming));
        assert!(local.credential.is_none());

        let m1 = &models[1];
        assert_eq!(m1.provider_type, ProviderType::Prediction);
        assert_eq!(m1.timeout, Duration::from_secs(30));
        assert_eq!(m1.rate_limit.burst_capacity, 20);
        assert!(m1.cache_policy.enabled);
        assert_eq!(m1.cache_policy.ttl, Duration::from_secs(60));
        assert_eq!(m1.cache_policy.max_size, 1000);
        assert_eq!(m1.max_retries, 3);
        assert_eq!(
            m1.credential.as_ref().unwrap().secret.expose(),
            "r8_testtoken"
        );
        assert!(m1.supports(Capability::Streaming));
    }

    fn raw(api_key: Option<&str>) -> RawModelConfig {
        RawModelConfig {
            provider_type: ProviderType::Prediction,
            model: "owner/name".into(),
            api_key: api_key.map(str::to_string),
            base_url: None,
            webhook: None,
            default_params: Map::new(),
            timeout: 120.0,
            max_retries: 3,
            rate_limit: None,
            cache: None,
            capabilities: default_capabilities(),
        }
    }

    #[test]
    fn test_literal_credential_rejected() {
        let err = raw(Some("r8_literal")).resolve("m", &no_env).unwrap_err();
        assert!(matches!(err, ConfigError::LiteralCredential { .. }));
        assert!(!err.to_string().contains("r8_literal"));
    }

    #[test]
    fn test_brace_credential_and_unset_env() {
        let resolved = raw(Some("${PROVIDER_TOKEN}"))
            .resolve("m", &env_with_token)
            .unwrap();
        assert_eq!(resolved.credential.unwrap().source_var, "PROVIDER_TOKEN");

        let err = raw(Some("env:MISSING")).resolve("m", &no_env).unwrap_err();
        assert!(matches!(err, ConfigError::UnsetEnvironment { ref var, .. } if var == "MISSING"));
    }

    #[test]
    fn test_prediction_requires_credential() {
        let err = raw(None).resolve("m", &no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredential { .. }));
    }

    #[test]
    fn test_invalid_model_name() {
        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.model = "just-a-name".into();
        let err = config.resolve("m", &env_with_token).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidModelName { .. }));
    }

    #[test]
    fn test_range_validation() {
        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.rate_limit = Some(RawRateLimit {
            requests_per_second: 0.0,
            burst_capacity: 5,
        });
        let err = config.resolve("m", &env_with_token).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRange { field: "rate_limit.requests_per_second", .. }
        ));

        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.max_retries = 11;
        assert!(config.resolve("m", &env_with_token).is_err());

        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.timeout = 0.0;
        assert!(config.resolve("m", &env_with_token).is_err());

        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.rate_limit = Some(RawRateLimit {
            requests_per_second: 1e-20,
            burst_capacity: 1,
        });
        let err = config.resolve("m", &env_with_token).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidRange { field: "rate_limit.requests_per_second", .. }
        ));

        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.cache = Some(RawCachePolicy {
            enabled: true,
            ttl: 60,
            max_size: 0,
        });
        assert!(config.resolve("m", &env_with_token).is_err());
    }

    #[test]
    fn test_engine_without_base_url_needs_runtime() {
        let mut local = ModelConfig::new("local", ProviderType::Engine, "qwen2.5");
        let err = require_engine_base_urls(std::slice::from_ref(&local)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingBaseUrl { ref model } if model == "local"));

        local.base_url = Some("http://127.0.0.1:8000".into());
        let hosted = ModelConfig::new("llama", ProviderType::Prediction, "meta/llama");
        assert!(require_engine_base_urls(&[local, hosted]).is_ok());
    }

    #[test]
    fn test_oversized_timeout_is_config_error() {
        for timeout in [1e20, MAX_TIMEOUT_SECS + 1.0] {
            let mut config = raw(Some("env:PROVIDER_TOKEN"));
            config.timeout = timeout;
            let err = config.resolve("m", &env_with_token).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidRange { field: "timeout", .. }));
        }

        let mut config = raw(Some("env:PROVIDER_TOKEN"));
        config.timeout = MAX_TIMEOUT_SECS;
        let resolved = config.resolve("m", &env_with_token).unwrap();
        assert_eq!(resolved.timeout, Duration::from_secs(86_400));
    }

    #[test]
    fn test_from_yaml_file_and_discover() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let loaded = GatewayConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(loaded.models.len(), 2);

        let path = file.path().to_string_lossy().into_owned();
        let env = move |key: &str| (key == CONFIG_ENV_VAR).then(|| path.clone());
        assert_eq!(
            GatewayConfig::discover(None, &env).as_deref(),
            Some(file.path())
        );

        let explicit = PathBuf::from("/etc/infergate.yaml");
        assert_eq!(
            GatewayConfig::discover(Some(&explicit), &env),
            Some(explicit.clone())
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = GatewayConfig::from_yaml_file("/nonexistent/infergate.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_provider_type_is_parse_error() {
        let err = GatewayConfig::from_yaml_str("models:\n  x:\n    type: grpc\n    model: a/b\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
