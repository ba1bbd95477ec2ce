//! Builds HTTP-backed [`Backend`]s from model configuration.

use std::sync::Arc;

use infergate_core::{Backend, BackendError, BackendFactory, ModelConfig, ProviderType};
use tracing::debug;

use crate::config::{EngineClientConfig, PredictionClientConfig};
use crate::engine::EngineClient;
use crate::port::map_error;
use crate::prediction::PredictionClient;

/// Default [`BackendFactory`]: reqwest-backed clients per provider type.
#[derive(Debug, Clone, Default)]
pub struct DefaultBackendFactory {
    user_agent: Option<String>,
}

impl DefaultBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the User-Agent sent upstream.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn prediction_config(&self, config: &ModelConfig) -> Result<PredictionClientConfig, BackendError> {
        if config.model_ref().is_none() {
            return Err(BackendError::Configuration(format!(
                "model '{}' needs an owner/name[:version] reference, got '{}'",
                config.model_id, config.native_model_name
            )));
        }
        let mut client = PredictionClientConfig::from_model(config);
        if let Some(user_agent) = &self.user_agent {
            client = client.with_user_agent(user_agent.clone());
        }
        Ok(client)
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn build(&self, config: &ModelConfig) -> Result<Backend, BackendError> {
        debug!(
            model = %config.model_id,
            provider = %config.provider_type,
            "Building backend"
        );
        match config.provider_type {
            ProviderType::Prediction => {
                let client =
                    PredictionClient::new(self.prediction_config(config)?).map_err(map_error)?;
                Ok(Backend::Prediction(Arc::new(client)))
            }
            ProviderType::Engine => {
                let client = EngineClient::new(EngineClientConfig::from_model(config))
                    .map_err(map_error)?;
                Ok(Backend::Engine(Arc::new(client)))
            }
        }
    }
}
