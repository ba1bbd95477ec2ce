//! `serve`: run the HTTP gateway until Ctrl-C.

use anyhow::Result;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::bootstrap::{LoadedConfig, build_gateway};
use crate::error::CliError;

/// Bind, serve and shut down gracefully on Ctrl-C.
pub async fn execute(config: &LoadedConfig, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    let gateway = build_gateway(config);
    let listener = TcpListener::bind(&addr).await.map_err(|e| CliError::Bind {
        addr: addr.clone(),
        reason: e.to_string(),
    })?;

    if config.models.is_empty() {
        warn!("No models registered; every chat request will return 404");
    }
    for model in &config.models {
        info!(
            model = %model.model_id,
            provider = %model.provider_type,
            upstream = %model.native_model_name,
            "Serving model"
        );
    }

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {e}"),
        }
    });

    infergate_proxy::serve(listener, gateway, cancel).await
}
