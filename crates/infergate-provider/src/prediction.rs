//! Client for create-then-poll prediction APIs.
//!
//! A prediction is created with one POST, then polled with GETs until it
//! reaches a terminal status. Streaming is emulated on top of polling by
//! yielding the part of the output that grew since the previous poll.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::Stream;
use infergate_core::{ModelInfo, ModelRef, Prediction, PredictionRequest, PredictionStatus};
use serde_json::{Map, Value};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

use crate::config::PredictionClientConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::{ApiRequest, HttpBackend, ReqwestBackend};
use crate::retry::RetryPolicy;
use crate::url::PredictionRoutes;

const PROVIDER: &str = "prediction";

/// Ceiling for a local deadline that would overflow the clock.
const MAX_WAIT: Duration = Duration::from_secs(86_400);

/// Newly appended output text, one item per poll that saw growth.
pub type TextStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// Prediction API client.
///
/// Generic over the HTTP backend so tests can script responses. Cloning is
/// cheap; clones share one backend.
pub struct PredictionClient<B = ReqwestBackend> {
    inner: Arc<Inner<B>>,
}

struct Inner<B> {
    backend: B,
    routes: PredictionRoutes,
    model: Option<ModelRef>,
    default_parameters: Map<String, Value>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl<B> Clone for PredictionClient<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B> std::fmt::Debug for PredictionClient<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionClient")
            .field("routes", &self.inner.routes)
            .field("model", &self.inner.model)
            .field("retry", &self.inner.retry)
            .finish_non_exhaustive()
    }
}

impl PredictionClient<ReqwestBackend> {
    /// Create a client backed by reqwest.
    pub fn new(config: PredictionClientConfig) -> ProviderResult<Self> {
        let backend = ReqwestBackend::new(
            &config.user_agent,
            config.request_timeout,
            config.token.clone(),
        )?;
        Self::with_backend(config, backend)
    }
}

impl<B: HttpBackend + 'static> PredictionClient<B> {
    /// Create a client with a custom HTTP backend.
    pub fn with_backend(config: PredictionClientConfig, backend: B) -> ProviderResult<Self> {
        let routes = PredictionRoutes::new(&config.base_url)?;
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                routes,
                model: config.model,
                default_parameters: config.default_parameters,
                retry: RetryPolicy::new(config.max_retries, config.retry_base_delay),
                poll_interval: config.poll_interval,
            }),
        })
    }

    /// The backend, for inspecting recorded calls in tests.
    #[cfg(test)]
    pub(crate) fn backend(&self) -> &B {
        &self.inner.backend
    }

    /// Create a prediction.
    ///
    /// Configured default parameters sit under `request.input`; request
    /// keys win. A version pinned on the request takes precedence over one
    /// pinned in the model reference.
    pub async fn predict(&self, request: PredictionRequest) -> ProviderResult<Prediction> {
        let inner = &self.inner;
        let mut input = inner.default_parameters.clone();
        input.extend(request.input);

        let version = request
            .version
            .or_else(|| inner.model.as_ref().and_then(|m| m.version.clone()));
        let url = inner.routes.create(inner.model.as_ref(), version.is_some())?;

        let body = PredictionRequest {
            input,
            version,
            webhook: request.webhook,
            stream: request.stream,
        };
        let api_request = ApiRequest::post(url, serde_json::to_value(&body)?);

        let prediction: Prediction = self.send_with_retry("create", &api_request).await?;
        info!(
            prediction_id = %prediction.id,
            status = %prediction.status,
            "Prediction created"
        );
        Ok(prediction)
    }

    pub async fn get_prediction(&self, id: &str) -> ProviderResult<Prediction> {
        if id.trim().is_empty() {
            return Err(ProviderError::InvalidArgument(
                "prediction id must not be empty".to_string(),
            ));
        }
        let request = ApiRequest::get(self.inner.routes.get(id));
        self.send_with_retry("get", &request).await
    }

    /// Cancel a prediction. Single attempt; cancels are not retried.
    pub async fn cancel_prediction(&self, id: &str) -> ProviderResult<Prediction> {
        if id.trim().is_empty() {
            return Err(ProviderError::InvalidArgument(
                "prediction id must not be empty".to_string(),
            ));
        }
        let request = ApiRequest::post_empty(self.inner.routes.cancel(id));
        let value = self.inner.backend.send_json(&request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Metadata for the configured model.
    pub async fn get_model(&self) -> ProviderResult<ModelInfo> {
        let model = self.inner.model.as_ref().ok_or_else(|| {
            ProviderError::InvalidArgument("client has no model configured".to_string())
        })?;
        let request = ApiRequest::get(self.inner.routes.model(model));
        self.send_with_retry("model", &request).await
    }

    /// Poll until the prediction is terminal.
    ///
    /// Returns the prediction only when it succeeded. When `timeout`
    /// elapses first a cancel is sent (failures are logged and ignored)
    /// and [`ProviderError::Timeout`] is returned.
    pub async fn wait_for_completion(
        &self,
        prediction: Prediction,
        timeout: Duration,
    ) -> ProviderResult<Prediction> {
        let deadline = deadline_after(timeout);
        let mut current = prediction;
        loop {
            if current.status.is_terminal() {
                return into_succeeded(current);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self.abandon(&current.id, timeout).await);
            }
            sleep(self.inner.poll_interval.min(deadline - now)).await;
            current = match self.poll_before(&current.id, deadline).await {
                Some(Ok(next)) => next,
                Some(Err(err)) if Instant::now() < deadline => return Err(err),
                _ => return Err(self.abandon(&current.id, timeout).await),
            };
            debug!(prediction_id = %current.id, status = %current.status, "Polled prediction");
        }
    }

    /// Create a prediction and wait for it.
    pub async fn run(
        &self,
        request: PredictionRequest,
        timeout: Duration,
    ) -> ProviderResult<Prediction> {
        let created = self.predict(request).await?;
        self.wait_for_completion(created, timeout).await
    }

    /// Create a prediction and yield output growth per poll.
    ///
    /// The concatenation of all items equals the final output when the
    /// backend only ever appends. If it rewrites earlier output, nothing is
    /// yielded until the output is longer than what was already sent.
    pub fn stream_prediction(&self, request: PredictionRequest, max_wait: Duration) -> TextStream {
        let client = self.clone();
        Box::pin(stream! {
            let mut current = match client.predict(request).await {
                Ok(created) => created,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
            let deadline = deadline_after(max_wait);
            let mut emitted = String::new();

            loop {
                let text = current.output_text();
                if let Some(delta) = diff_suffix(&emitted, &text).map(str::to_string) {
                    emitted = text;
                    yield Ok(delta);
                }

                if current.status.is_terminal() {
                    if let Err(err) = into_succeeded(current) {
                        yield Err(err);
                    }
                    return;
                }

                let now = Instant::now();
                if now >= deadline {
                    yield Err(client.abandon(&current.id, max_wait).await);
                    return;
                }
                sleep(client.inner.poll_interval.min(deadline - now)).await;

                current = match client.poll_before(&current.id, deadline).await {
                    Some(Ok(next)) => next,
                    Some(Err(err)) if Instant::now() < deadline => {
                        yield Err(err);
                        return;
                    }
                    _ => {
                        yield Err(client.abandon(&current.id, max_wait).await);
                        return;
                    }
                };
            }
        })
    }

    /// One status fetch, retries included, cut off at `deadline`.
    ///
    /// `None` means the deadline passed before the fetch settled.
    async fn poll_before(&self, id: &str, deadline: Instant) -> Option<ProviderResult<Prediction>> {
        timeout_at(deadline, self.get_prediction(id)).await.ok()
    }

    /// Best-effort cancel after a local deadline; returns the timeout error.
    async fn abandon(&self, id: &str, waited: Duration) -> ProviderError {
        warn!(prediction_id = %id, ?waited, "Prediction timed out, canceling");
        if let Err(err) = self.cancel_prediction(id).await {
            warn!(prediction_id = %id, error = %err, "Cancel after timeout failed");
        }
        ProviderError::Timeout {
            id: id.to_string(),
            waited,
        }
    }

    async fn send_with_retry<T: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        request: &ApiRequest,
    ) -> ProviderResult<T> {
        let value = self
            .inner
            .retry
            .run(PROVIDER, operation, || self.inner.backend.send_json(request))
            .await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn into_succeeded(prediction: Prediction) -> ProviderResult<Prediction> {
    match prediction.status {
        PredictionStatus::Failed => Err(ProviderError::PredictionFailed {
            message: prediction
                .error_message()
                .unwrap_or_else(|| "unknown error".to_string()),
            id: prediction.id,
        }),
        PredictionStatus::Canceled => Err(ProviderError::PredictionCanceled { id: prediction.id }),
        _ => Ok(prediction),
    }
}

/// Text to emit when output moves from `previous` to `current`.
///
/// Growth past an existing prefix yields the appended part. A rewrite
/// yields whatever lies beyond the already-sent length, or nothing while
/// the output is not longer than that.
pub(crate) fn diff_suffix<'a>(previous: &str, current: &'a str) -> Option<&'a str> {
    if !current.starts_with(previous) {
        debug!(
            sent = previous.len(),
            current = current.len(),
            "Prediction output was rewritten"
        );
    }
    let mut start = previous.len();
    while start < current.len() && !current.is_char_boundary(start) {
        start += 1;
    }
    current.get(start..).filter(|suffix| !suffix.is_empty())
}

fn deadline_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait).unwrap_or_else(|| now + MAX_WAIT)
}
