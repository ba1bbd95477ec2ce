//! Client for OpenAI-compatible inference engines (vLLM, llama-server,
//! Ollama's OpenAI surface).

use std::sync::Arc;

use infergate_core::{ChatCompletionRequest, ChatCompletionResponse};
use tracing::debug;

use crate::config::EngineClientConfig;
use crate::error::ProviderResult;
use crate::http::{ApiRequest, HttpBackend, ReqwestBackend};
use crate::retry::RetryPolicy;
use crate::sse::{SseChunkStream, decode_chunks};
use crate::url::{chat_url, health_url};

const PROVIDER: &str = "engine";

/// Engine client. The base URL is passed per call since engines may be
/// discovered after the client is built.
pub struct EngineClient<B = ReqwestBackend> {
    backend: Arc<B>,
    retry: RetryPolicy,
}

impl<B> Clone for EngineClient<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            retry: self.retry,
        }
    }
}

impl<B> std::fmt::Debug for EngineClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl EngineClient<ReqwestBackend> {
    pub fn new(config: EngineClientConfig) -> ProviderResult<Self> {
        let backend = ReqwestBackend::new(
            &config.user_agent,
            config.request_timeout,
            config.token.clone(),
        )?;
        Ok(Self::with_backend(config, backend))
    }
}

impl<B: HttpBackend + 'static> EngineClient<B> {
    pub fn with_backend(config: EngineClientConfig, backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
            retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
        }
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.backend
    }

    /// Non-streaming completion. `stream` is forced off.
    pub async fn chat_completion(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> ProviderResult<ChatCompletionResponse> {
        let mut body = request.clone();
        body.stream = false;
        let api_request = ApiRequest::post(chat_url(base_url)?, serde_json::to_value(&body)?);

        let value = self
            .retry
            .run(PROVIDER, "chat", || self.backend.send_json(&api_request))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Streaming completion. Only opening the stream is retried; once
    /// bytes flow, errors end the stream.
    pub async fn chat_completion_stream(
        &self,
        base_url: &str,
        request: &ChatCompletionRequest,
    ) -> ProviderResult<SseChunkStream> {
        let mut body = request.clone();
        body.stream = true;
        let api_request = ApiRequest::post(chat_url(base_url)?, serde_json::to_value(&body)?);

        let bytes = self
            .retry
            .run(PROVIDER, "chat_stream", || self.backend.send_stream(&api_request))
            .await?;
        debug!(base_url, model = %request.model, "Engine stream opened");
        Ok(decode_chunks(bytes))
    }

    /// Single probe of the engine's `/health` endpoint.
    pub async fn health(&self, base_url: &str) -> bool {
        let Ok(url) = health_url(base_url) else {
            return false;
        };
        match self.backend.send_json(&ApiRequest::get(url)).await {
            Ok(_) => true,
            Err(err) => {
                debug!(base_url, error = %err, "Engine health probe failed");
                false
            }
        }
    }
}
