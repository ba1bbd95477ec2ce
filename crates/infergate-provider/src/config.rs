//! Public configuration for the provider clients.

use std::time::Duration;

use infergate_core::{ModelConfig, ModelRef};
use serde_json::{Map, Value};

/// Default prediction API endpoint.
pub const DEFAULT_PREDICTION_BASE_URL: &str = "https://api.replicate.com/v1";

/// Configuration for [`crate::PredictionClient`].
///
/// # Example
///
/// ```
/// use infergate_provider::PredictionClientConfig;
/// use std::time::Duration;
///
/// let config = PredictionClientConfig::new()
///     .with_token("r8_example")
///     .with_max_retries(5)
///     .with_poll_interval(Duration::from_millis(250));
/// ```
#[derive(Debug, Clone)]
pub struct PredictionClientConfig {
    pub(crate) base_url: String,
    pub(crate) user_agent: String,
    /// Per-HTTP-call timeout. Unrelated to how long a prediction may run.
    pub(crate) request_timeout: Duration,
    pub(crate) token: Option<String>,
    /// Model used for unversioned create calls.
    pub(crate) model: Option<ModelRef>,
    pub(crate) default_parameters: Map<String, Value>,
    pub(crate) max_retries: u32,
    pub(crate) retry_base_delay: Duration,
    pub(crate) poll_interval: Duration,
}

impl Default for PredictionClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_PREDICTION_BASE_URL.to_string(),
            user_agent: concat!("infergate/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(30),
            token: None,
            model: None,
            default_parameters: Map::new(),
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl PredictionClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a client config from a validated model config.
    #[must_use]
    pub fn from_model(config: &ModelConfig) -> Self {
        let mut client = Self::new()
            .with_max_retries(config.max_retries)
            .with_default_parameters(config.default_parameters.clone())
            .with_optional_token(
                config
                    .credential
                    .as_ref()
                    .map(|credential| credential.secret.expose().to_string()),
            );
        client.model = config.model_ref();
        if let Some(base_url) = &config.base_url {
            client = client.with_base_url(base_url.clone());
        }
        client
    }

    /// Defaults to `https://api.replicate.com/v1`.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Defaults to 30 seconds.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_optional_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: ModelRef) -> Self {
        self.model = Some(model);
        self
    }

    /// Parameters merged under every prediction input.
    #[must_use]
    pub fn with_default_parameters(mut self, defaults: Map<String, Value>) -> Self {
        self.default_parameters = defaults;
        self
    }

    /// Defaults to 3 retries.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Defaults to 1 second; retry `k` waits `base * 2^k`.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Defaults to 500ms.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Configuration for [`crate::EngineClient`].
#[derive(Debug, Clone)]
pub struct EngineClientConfig {
    pub(crate) user_agent: String,
    pub(crate) request_timeout: Duration,
    pub(crate) token: Option<String>,
    pub(crate) max_retries: u32,
    pub(crate) retry_base_delay: Duration,
}

impl Default for EngineClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("infergate/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: Duration::from_secs(120),
            token: None,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl EngineClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_model(config: &ModelConfig) -> Self {
        Self {
            request_timeout: config.timeout,
            token: config
                .credential
                .as_ref()
                .map(|credential| credential.secret.expose().to_string()),
            max_retries: config.max_retries,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }
}
