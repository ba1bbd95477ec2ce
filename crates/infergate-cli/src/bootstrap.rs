//! CLI bootstrap - the composition root.
//!
//! This is the only place where concrete adapters are wired together:
//! - Config discovery and validation (via infergate-core)
//! - HTTP provider clients (via infergate-provider)
//! - The gateway service handed to the HTTP server (via infergate-proxy)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use infergate_core::{
    GatewayConfig, InferenceGateway, ModelConfig, ProviderRegistry, RateLimiter, ServerSettings,
    require_engine_base_urls,
};
use infergate_provider::DefaultBackendFactory;
use tracing::{info, warn};

use crate::error::CliError;

/// Validated configuration, ready to build a gateway from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// File the config came from; `None` when no file was found.
    pub path: Option<PathBuf>,
    pub server: ServerSettings,
    pub models: Vec<ModelConfig>,
}

/// Load and validate configuration using the process environment.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, CliError> {
    load_config_with(explicit, &|name| std::env::var(name).ok())
}

/// Load and validate configuration with an injected environment lookup.
///
/// Every credential indirection is resolved here, so a bad config fails
/// before the server binds. The gateway built from it has no engine
/// runtime, so engine models must name their `base_url`.
pub fn load_config_with(
    explicit: Option<&Path>,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<LoadedConfig, CliError> {
    let path = GatewayConfig::discover(explicit, env);
    let config = match &path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            GatewayConfig::from_yaml_file(path)?
        }
        None => {
            warn!("No configuration file found; starting with no models");
            GatewayConfig::default()
        }
    };

    let models = config.model_configs(env)?;
    require_engine_base_urls(&models)?;
    Ok(LoadedConfig {
        path,
        server: config.server,
        models,
    })
}

/// Compose the gateway with HTTP-backed provider clients.
pub fn build_gateway(config: &LoadedConfig) -> Arc<InferenceGateway> {
    let registry = Arc::new(ProviderRegistry::with_models(config.models.clone()));
    let limiter = Arc::new(RateLimiter::new(config.server.max_buckets));
    let factory = Arc::new(DefaultBackendFactory::new());

    info!(models = config.models.len(), "Gateway composed");
    Arc::new(InferenceGateway::new(registry, limiter, factory))
}
