//! Core port implementations for the provider clients.
//!
//! This is the only place [`ProviderError`] crosses into the core's
//! [`BackendError`].

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use infergate_core::{
    BackendError, ChatCompletionRequest, ChatCompletionResponse, ChunkStream, EnginePort,
    Prediction, PredictionPort, PredictionRequest, PredictionStream,
};

use crate::engine::EngineClient;
use crate::error::ProviderError;
use crate::http::HttpBackend;
use crate::prediction::PredictionClient;

pub(crate) fn map_error(err: ProviderError) -> BackendError {
    match err {
        ProviderError::Status {
            status, message, ..
        } => BackendError::Status { status, message },
        ProviderError::Network(message) => BackendError::Network(message),
        ProviderError::Decode(message) => BackendError::InvalidResponse(message),
        ProviderError::InvalidArgument(message) => BackendError::InvalidArgument(message),
        ProviderError::InvalidUrl(message) | ProviderError::Client(message) => {
            BackendError::Configuration(message)
        }
        ProviderError::Timeout { id, waited } => BackendError::Timeout {
            prediction_id: id,
            waited,
        },
        ProviderError::PredictionFailed { id, message } => BackendError::Failed {
            prediction_id: id,
            message,
        },
        ProviderError::PredictionCanceled { id } => BackendError::Canceled { prediction_id: id },
    }
}

#[async_trait]
impl<B: HttpBackend + 'static> PredictionPort for PredictionClient<B> {
    async fn predict(&self, request: PredictionRequest) -> Result<Prediction, BackendError> {
        Self::predict(self, request).await.map_err(map_error)
    }

    async fn get_prediction(&self, id: &str) -> Result<Prediction, BackendError> {
        Self::get_prediction(self, id).await.map_err(map_error)
    }

    async fn cancel_prediction(&self, id: &str) -> Result<Prediction, BackendError> {
        Self::cancel_prediction(self, id).await.map_err(map_error)
    }

    async fn wait_for_completion(
        &self,
        prediction: Prediction,
        timeout: Duration,
    ) -> Result<Prediction, BackendError> {
        Self::wait_for_completion(self, prediction, timeout)
            .await
            .map_err(map_error)
    }

    fn stream_prediction(&self, request: PredictionRequest, max_wait: Duration) -> PredictionStream {
        Self::stream_prediction(self, request, max_wait)
            .map(|item| item.map_err(map_error))
            .boxed()
    }
}

#[async_trait]
impl<B: HttpBackend + 'static> EnginePort for EngineClient<B> {
    async fn chat_completion(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, BackendError> {
        Self::chat_completion(self, base_url, request)
            .await
            .map_err(map_error)
    }

    async fn chat_completion_stream(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> Result<ChunkStream, BackendError> {
        let chunks = Self::chat_completion_stream(self, base_url, request)
            .await
            .map_err(map_error)?;
        Ok(chunks.map(|item| item.map_err(map_error)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PredictionClientConfig;
    use crate::http::Method;
    use crate::http::testing::{CannedResponse, FakeBackend};
    use infergate_core::{GatewayError, ModelRef};
    use serde_json::json;

    #[test]
    fn test_status_maps_through() {
        let mapped = map_error(ProviderError::Status {
            status: 422,
            url: "https://api/predictions".into(),
            message: "invalid version".into(),
        });
        assert_eq!(
            mapped,
            BackendError::Status {
                status: 422,
                message: "invalid version".into()
            }
        );
        assert_eq!(GatewayError::from(mapped).status_code(), 422);
    }

    #[test]
    fn test_terminal_errors_keep_prediction_id() {
        let mapped = map_error(ProviderError::Timeout {
            id: "p9".into(),
            waited: Duration::from_secs(5),
        });
        assert!(matches!(mapped, BackendError::Timeout { ref prediction_id, .. } if prediction_id == "p9"));
        assert_eq!(
            map_error(ProviderError::PredictionCanceled { id: "p9".into() }),
            BackendError::Canceled {
                prediction_id: "p9".into()
            }
        );
    }

    #[tokio::test]
    async fn test_port_object_dispatches_to_client() {
        let backend = FakeBackend::new().with_response(
            Method::Post,
            "/predictions",
            CannedResponse::Json(json!({"id": "p1", "status": "starting"})),
        );
        let config = PredictionClientConfig::new()
            .with_base_url("https://api.test/v1")
            .with_model(ModelRef::parse("meta/llama").unwrap());
        let client = PredictionClient::with_backend(config, backend).unwrap();
        let port: &dyn PredictionPort = &client;

        let created = port
            .predict(PredictionRequest::new(serde_json::Map::new()))
            .await
            .unwrap();

        assert_eq!(created.id, "p1");
    }
}
