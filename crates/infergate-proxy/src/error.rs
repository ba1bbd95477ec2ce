//! HTTP rendering of gateway errors.

use axum::Json;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use infergate_core::GatewayError;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// A [`GatewayError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(status = status.as_u16(), code = self.0.code(), "{}", self.0.public_message());
        } else {
            debug!(status = status.as_u16(), code = self.0.code(), "Request rejected");
        }

        let mut response = (status, Json(ErrorResponse::from(&self.0))).into_response();

        // Hint clients to back off when upstream is throttling or we gave up waiting.
        if matches!(
            status,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE
        ) {
            response
                .headers_mut()
                .insert("retry-after", HeaderValue::from_static("1"));
        }
        response
    }
}
