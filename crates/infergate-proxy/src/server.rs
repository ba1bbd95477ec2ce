//! Axum HTTP server for the OpenAI-compatible surface.
//!
//! [`serve`] runs the router on a pre-bound `TcpListener` until the
//! cancellation token fires.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum::http::StatusCode;
use bytes::Bytes;
use infergate_core::{ChatCompletionRequest, InferenceGateway};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ApiError;
use crate::models::{ErrorResponse, ModelsResponse};
use crate::stream::sse_response;

/// Shared application state.
#[derive(Clone)]
struct AppState {
    gateway: Arc<InferenceGateway>,
}

/// Build the router. Exposed separately from [`serve`] for tests.
pub fn create_router(gateway: Arc<InferenceGateway>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1/models", get(list_models))
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(AppState { gateway })
}

/// Run the server with a pre-bound listener.
///
/// Returns `Ok(())` on clean shutdown.
pub async fn serve(
    listener: TcpListener,
    gateway: Arc<InferenceGateway>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = create_router(gateway);

    info!("Gateway listening on {addr}");
    info!("Point OpenAI clients at: http://{addr}/v1");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("Gateway shut down");
    Ok(())
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok"
    }))
}

async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    debug!("GET /v1/models");
    Json(ModelsResponse::from_configs(state.gateway.registry().configs()))
}

/// Parse the body ourselves so malformed JSON gets the OpenAI error envelope.
async fn chat_completions(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("Failed to parse chat request: {e}");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::invalid_body(&e.to_string())),
            )
                .into_response();
        }
    };

    debug!(
        model = %request.model,
        streaming = request.stream,
        messages = request.messages.len(),
        "POST /v1/chat/completions"
    );

    if request.stream {
        match state.gateway.chat_completion_stream(&request).await {
            Ok(events) => sse_response(events),
            Err(err) => ApiError(err).into_response(),
        }
    } else {
        match state.gateway.chat_completion(&request).await {
            Ok(response) => Json(response).into_response(),
            Err(err) => ApiError(err).into_response(),
        }
    }
}
