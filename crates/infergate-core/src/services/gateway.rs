//! Inference gateway service.
//!
//! Routes one chat request through the fixed pipeline: model lookup,
//! capability check, prompt adaptation, admission, cache, backend call and
//! response adaptation. Each model gets its own backend handle and, when
//! its policy enables it, its own response cache sized from that policy.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::{self, ChatEventStream, ChunkBuilder};
use crate::admission::RateLimiter;
use crate::cache::{CacheKey, ResponseCache};
use crate::domain::{
    Capability, ChatCompletionRequest, ChatCompletionResponse, EndpointPatch, ModelConfig,
    PredictionRequest,
};
use crate::error::{GatewayError, GatewayResult};
use crate::ports::{Backend, BackendFactory, EnginePort, EngineRuntimePort, PredictionPort};
use crate::registry::ProviderRegistry;

/// Tokens one chat request takes from its model's bucket.
const REQUEST_COST: u32 = 1;

/// Per-model backend handle and cache.
struct ModelRoute {
    backend: Backend,
    cache: Option<ResponseCache<ChatCompletionResponse>>,
}

/// Front door for chat requests.
pub struct InferenceGateway {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<RateLimiter>,
    factory: Arc<dyn BackendFactory>,
    engine_runtime: Option<Arc<dyn EngineRuntimePort>>,
    routes: Mutex<HashMap<String, Arc<ModelRoute>>>,
}

impl std::fmt::Debug for InferenceGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceGateway")
            .field("models", &self.registry.len())
            .field("routes", &self.routes.lock().len())
            .finish_non_exhaustive()
    }
}

impl InferenceGateway {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        limiter: Arc<RateLimiter>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        Self {
            registry,
            limiter,
            factory,
            engine_runtime: None,
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Attach the engine process manager used to discover engine URLs.
    #[must_use]
    pub fn with_engine_runtime(mut self, runtime: Arc<dyn EngineRuntimePort>) -> Self {
        self.engine_runtime = Some(runtime);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Replace all model configs and drop every cached route.
    pub fn reload(&self, models: Vec<ModelConfig>) {
        self.registry.register(models);
        self.routes.lock().clear();
    }

    /// Forget a model: its config, backend, cache and rate-limit bucket.
    pub fn evict_model(&self, model_id: &str) -> bool {
        let removed = self.registry.remove(model_id).is_some();
        self.routes.lock().remove(model_id);
        self.limiter.evict(model_id);
        if removed {
            info!(model = %model_id, "Evicted model");
        }
        removed
    }

    /// Non-streaming chat completion.
    pub async fn chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> GatewayResult<ChatCompletionResponse> {
        let started = Instant::now();
        let result = self.complete(request).await;
        record_outcome(&request.model, started, result.as_ref().err());
        result
    }

    /// Streaming chat completion.
    ///
    /// Errors found before any backend call (unknown model, missing
    /// capability, admission) are returned directly. Later failures arrive
    /// as a single [`adapter::StreamEvent::Error`] inside the stream.
    pub async fn chat_completion_stream(
        &self,
        request: &ChatCompletionRequest,
    ) -> GatewayResult<ChatEventStream> {
        let started = Instant::now();
        let result = self.open_stream(request).await;
        record_outcome(&request.model, started, result.as_ref().err());
        result
    }

    async fn complete(&self, request: &ChatCompletionRequest) -> GatewayResult<ChatCompletionResponse> {
        if request.stream {
            return Err(GatewayError::InvalidRequest(
                "stream=true requests must use the streaming path".to_string(),
            ));
        }
        let config = self.lookup(&request.model)?;
        require(&config, Capability::Chat)?;
        let route = self.route(&config)?;

        match &route.backend {
            Backend::Prediction(port) => {
                let input = adapter::to_native(request)?;
                self.admit(&config).await?;
                let prediction_request = prediction_request(&config, input);
                let fetch = || run_prediction(port.as_ref(), &config, prediction_request.clone(), request);

                match &route.cache {
                    Some(cache) if prediction_request.webhook.is_none() => {
                        let key = CacheKey::for_prediction(
                            &config.model_id,
                            &Value::Object(prediction_request.input.clone()),
                            prediction_request.version.as_deref(),
                        );
                        cache.get_or_fetch(&key, fetch).await
                    }
                    _ => fetch().await,
                }
            }
            Backend::Engine(port) => {
                if request.messages.is_empty() {
                    return Err(GatewayError::InvalidRequest(
                        "messages must not be empty".to_string(),
                    ));
                }
                self.admit(&config).await?;
                let base_url = self.engine_base_url(&config).await?;
                let native = adapter::apply_engine_defaults(request, &config);
                let fetch = || run_engine(port.as_ref(), &base_url, &native, &request.model);

                match &route.cache {
                    Some(cache) => {
                        let key = CacheKey::from_value(&json!({
                            "model": config.model_id,
                            "input": native,
                            "version": Value::Null,
                        }));
                        cache.get_or_fetch(&key, fetch).await
                    }
                    None => fetch().await,
                }
            }
        }
    }

    async fn open_stream(&self, request: &ChatCompletionRequest) -> GatewayResult<ChatEventStream> {
        let config = self.lookup(&request.model)?;
        require(&config, Capability::Chat)?;
        require(&config, Capability::Streaming)?;
        let route = self.route(&config)?;

        match &route.backend {
            Backend::Prediction(port) => {
                let input = adapter::to_native(request)?;
                self.admit(&config).await?;
                let upstream =
                    port.stream_prediction(prediction_request(&config, input), config.timeout);
                debug!(model = %config.model_id, "Opened emulated prediction stream");
                Ok(adapter::stream_events(
                    upstream,
                    ChunkBuilder::for_request(request),
                ))
            }
            Backend::Engine(port) => {
                if request.messages.is_empty() {
                    return Err(GatewayError::InvalidRequest(
                        "messages must not be empty".to_string(),
                    ));
                }
                self.admit(&config).await?;
                let base_url = self.engine_base_url(&config).await?;
                let mut native = adapter::apply_engine_defaults(request, &config);
                native.stream = true;
                let upstream = port.chat_completion_stream(&base_url, &native).await?;
                debug!(model = %config.model_id, base_url = %base_url, "Opened engine stream");
                Ok(adapter::relay_engine_stream(upstream, request.model.clone()))
            }
        }
    }

    fn lookup(&self, model_id: &str) -> GatewayResult<ModelConfig> {
        self.registry
            .get_config(model_id)
            .ok_or_else(|| GatewayError::ModelNotFound(model_id.to_string()))
    }

    async fn admit(&self, config: &ModelConfig) -> GatewayResult<()> {
        self.limiter
            .acquire(&config.model_id, config.rate_limit, REQUEST_COST)
            .await?;
        Ok(())
    }

    /// Route for `config`, building backend and cache on first use.
    fn route(&self, config: &ModelConfig) -> GatewayResult<Arc<ModelRoute>> {
        if let Some(route) = self.routes.lock().get(&config.model_id) {
            return Ok(Arc::clone(route));
        }

        let backend = self
            .factory
            .build(config)
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;
        let cache = config
            .cache_policy
            .enabled
            .then(|| ResponseCache::from_policy(config.model_id.clone(), &config.cache_policy));
        debug!(
            model = %config.model_id,
            provider = %config.provider_type,
            cached = cache.is_some(),
            "Built model route"
        );

        let route = Arc::new(ModelRoute { backend, cache });
        let mut routes = self.routes.lock();
        Ok(Arc::clone(
            routes
                .entry(config.model_id.clone())
                .or_insert(route),
        ))
    }

    /// Base URL for an engine, asking the runtime when config has none.
    async fn engine_base_url(&self, config: &ModelConfig) -> GatewayResult<String> {
        if let Some(url) = &config.base_url {
            return Ok(url.clone());
        }
        let runtime = self.engine_runtime.as_ref().ok_or_else(|| {
            GatewayError::Configuration(format!(
                "model '{}' has no base_url and no engine runtime is attached",
                config.model_id
            ))
        })?;

        let running = runtime
            .ensure_running(&config.model_id, &config.native_model_name)
            .await?;
        self.registry
            .update_endpoints(&config.model_id, &EndpointPatch::base_url(running.base_url.clone()));
        info!(model = %config.model_id, base_url = %running.base_url, "Discovered engine endpoint");
        Ok(running.base_url)
    }
}

fn require(config: &ModelConfig, capability: Capability) -> GatewayResult<()> {
    if config.supports(capability) {
        Ok(())
    } else {
        Err(GatewayError::UnsupportedCapability {
            model: config.model_id.clone(),
            capability,
        })
    }
}

fn prediction_request(config: &ModelConfig, input: serde_json::Map<String, Value>) -> PredictionRequest {
    PredictionRequest {
        input,
        version: config.model_ref().and_then(|model| model.version),
        webhook: config.webhook.clone(),
        stream: false,
    }
}

async fn run_prediction(
    port: &dyn PredictionPort,
    config: &ModelConfig,
    prediction_request: PredictionRequest,
    request: &ChatCompletionRequest,
) -> GatewayResult<ChatCompletionResponse> {
    let created = port.predict(prediction_request).await?;
    debug!(model = %config.model_id, prediction_id = %created.id, "Prediction created");
    let finished = port.wait_for_completion(created, config.timeout).await?;
    Ok(adapter::from_native(&finished, request))
}

async fn run_engine(
    port: &dyn EnginePort,
    base_url: &str,
    native: &ChatCompletionRequest,
    model_id: &str,
) -> GatewayResult<ChatCompletionResponse> {
    let mut response = port.chat_completion(base_url, native).await?;
    model_id.clone_into(&mut response.model);
    Ok(response)
}

fn record_outcome(model_id: &str, started: Instant, error: Option<&GatewayError>) {
    let elapsed = started.elapsed();
    let outcome = error.map_or("ok", GatewayError::outcome);
    metrics::counter!(
        "infergate_requests_total",
        "model" => model_id.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("infergate_request_duration_seconds", "model" => model_id.to_string())
        .record(elapsed.as_secs_f64());

    match error {
        None => debug!(model = %model_id, elapsed_ms = elapsed.as_millis(), "Chat request served"),
        Some(err) if err.status_code() >= 500 => warn!(
            model = %model_id,
            code = err.code(),
            error = %err.public_message(),
            "Chat request failed"
        ),
        Some(err) => debug!(
            model = %model_id,
            code = err.code(),
            error = %err.public_message(),
            "Chat request rejected"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StreamEvent;
    use crate::domain::{
        CachePolicy, ChatMessage, Prediction, PredictionStatus, ProviderType, RateLimit,
    };
    use crate::ports::{
        BackendError, MockEnginePort, MockEngineRuntimePort, PredictionStream, RunningEngine,
    };
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct FakePredictions {
        created: AtomicUsize,
        waited: AtomicUsize,
        fail_with: Option<BackendError>,
    }

    fn prediction(status: PredictionStatus, output: Option<Value>) -> Prediction {
        serde_json::from_value(json!({
            "id": "p1",
            "model": "owner/name",
            "status": status,
            "output": output,
        }))
        .unwrap()
    }

    #[async_trait]
    impl PredictionPort for FakePredictions {
        async fn predict(&self, request: PredictionRequest) -> Result<Prediction, BackendError> {
            assert!(request.input.contains_key("prompt"));
            self.created.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(prediction(PredictionStatus::Starting, None)),
            }
        }

        async fn get_prediction(&self, _id: &str) -> Result<Prediction, BackendError> {
            Ok(prediction(PredictionStatus::Processing, None))
        }

        async fn cancel_prediction(&self, _id: &str) -> Result<Prediction, BackendError> {
            Ok(prediction(PredictionStatus::Canceled, None))
        }

        async fn wait_for_completion(
            &self,
            _prediction: Prediction,
            _timeout: Duration,
        ) -> Result<Prediction, BackendError> {
            self.waited.fetch_add(1, Ordering::SeqCst);
            Ok(prediction(
                PredictionStatus::Succeeded,
                Some(json!(["Hello", " there"])),
            ))
        }

        fn stream_prediction(&self, _request: PredictionRequest, _max_wait: Duration) -> PredictionStream {
            self.created.fetch_add(1, Ordering::SeqCst);
            Box::pin(futures_util::stream::iter(vec![
                Ok("Hello".to_string()),
                Ok(" there".to_string()),
            ]))
        }
    }

    struct StaticFactory(Backend);

    impl BackendFactory for StaticFactory {
        fn build(&self, _config: &ModelConfig) -> Result<Backend, BackendError> {
            Ok(self.0.clone())
        }
    }

    fn m1(cache: bool, capabilities: Vec<Capability>) -> ModelConfig {
        let mut config = ModelConfig::new("m1", ProviderType::Prediction, "owner/name");
        config.rate_limit = RateLimit {
            requests_per_second: 10.0,
            burst_capacity: 20,
        };
        config.cache_policy = CachePolicy {
            enabled: cache,
            ttl: Duration::from_secs(60),
            max_size: 100,
        };
        config.capabilities = capabilities;
        config
    }

    fn gateway(config: ModelConfig, backend: Backend) -> InferenceGateway {
        InferenceGateway::new(
            Arc::new(ProviderRegistry::with_models([config])),
            Arc::new(RateLimiter::new(16)),
            Arc::new(StaticFactory(backend)),
        )
    }

    fn ask(model: &str) -> ChatCompletionRequest {
        ChatCompletionRequest::new(model, vec![ChatMessage::user("Hi")])
    }

    #[tokio::test]
    async fn test_unknown_model_is_not_found() {
        let fake = Arc::new(FakePredictions::default());
        let gw = gateway(
            m1(false, vec![Capability::Chat]),
            Backend::Prediction(fake.clone()),
        );

        let err = gw.chat_completion(&ask("nope")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(fake.created.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_streaming_capability_checked_before_dispatch() {
        let fake = Arc::new(FakePredictions::default());
        let limiter = Arc::new(RateLimiter::new(16));
        let gw = InferenceGateway::new(
            Arc::new(ProviderRegistry::with_models([m1(false, vec![Capability::Chat])])),
            Arc::clone(&limiter),
            Arc::new(StaticFactory(Backend::Prediction(fake.clone()))),
        );

        let mut request = ask("m1");
        request.stream = true;
        let Err(err) = gw.chat_completion_stream(&request).await else {
            panic!("expected capability error");
        };

        assert_eq!(err.status_code(), 400);
        assert_eq!(err.code(), "streaming_not_supported");
        assert_eq!(fake.created.load(Ordering::SeqCst), 0);
        assert!(limiter.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_identical_requests_create_one_job() {
        let fake = Arc::new(FakePredictions::default());
        let gw = Arc::new(gateway(
            m1(true, vec![Capability::Chat, Capability::Streaming]),
            Backend::Prediction(fake.clone()),
        ));

        let (req_a, req_b) = (ask("m1"), ask("m1"));
        let (a, b) = tokio::join!(gw.chat_completion(&req_a), gw.chat_completion(&req_b));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(fake.created.load(Ordering::SeqCst), 1);
        assert_eq!(a.text(), "Hello there");
        assert_eq!(a.text(), b.text());
        assert_eq!(a.model, "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_disabled_calls_every_time() {
        let fake = Arc::new(FakePredictions::default());
        let gw = gateway(m1(false, vec![Capability::Chat]), Backend::Prediction(fake.clone()));

        gw.chat_completion(&ask("m1")).await.unwrap();
        gw.chat_completion(&ask("m1")).await.unwrap();

        assert_eq!(fake.created.load(Ordering::SeqCst), 2);
        assert_eq!(fake.waited.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upstream_client_error_keeps_status() {
        let fake = Arc::new(FakePredictions {
            fail_with: Some(BackendError::Status {
                status: 422,
                message: "invalid input".into(),
            }),
            ..FakePredictions::default()
        });
        let gw = gateway(m1(true, vec![Capability::Chat]), Backend::Prediction(fake.clone()));

        let err = gw.chat_completion(&ask("m1")).await.unwrap_err();
        assert_eq!(err.status_code(), 422);

        // Failures are not cached.
        gw.chat_completion(&ask("m1")).await.unwrap_err();
        assert_eq!(fake.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stream_request_on_non_stream_path_is_rejected() {
        let fake = Arc::new(FakePredictions::default());
        let gw = gateway(m1(false, vec![Capability::Chat]), Backend::Prediction(fake));
        let mut request = ask("m1");
        request.stream = true;

        let err = gw.chat_completion(&request).await.unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[tokio::test]
    async fn test_prediction_stream_events() {
        let fake = Arc::new(FakePredictions::default());
        let gw = gateway(
            m1(false, vec![Capability::Chat, Capability::Streaming]),
            Backend::Prediction(fake),
        );
        let mut request = ask("m1");
        request.stream = true;

        let events: Vec<_> = gw
            .chat_completion_stream(&request)
            .await
            .unwrap()
            .collect()
            .await;

        let text: String = events
            .iter()
            .filter_map(|event| match event {
                StreamEvent::Chunk(chunk) => chunk.content().map(str::to_string),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello there");
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_engine_endpoint_discovered_through_runtime() {
        let mut engine = MockEnginePort::new();
        engine
            .expect_chat_completion()
            .withf(|base_url, request| {
                base_url.to_string() == "http://127.0.0.1:7000" && request.model == "qwen"
            })
            .times(1)
            .returning(|_, request| {
                let mut response = adapter::from_native(
                    &prediction(PredictionStatus::Succeeded, Some(json!("pong"))),
                    request,
                );
                response.model = request.model.clone();
                Ok(response)
            });

        let mut runtime = MockEngineRuntimePort::new();
        runtime
            .expect_ensure_running()
            .times(1)
            .returning(|_, name| Ok(RunningEngine::local(7000, name)));

        let config = ModelConfig::new("local", ProviderType::Engine, "qwen");
        let gw = gateway(config, Backend::Engine(Arc::new(engine)))
            .with_engine_runtime(Arc::new(runtime));

        let response = gw.chat_completion(&ask("local")).await.unwrap();
        assert_eq!(response.text(), "pong");
        assert_eq!(response.model, "local");
        assert_eq!(
            gw.registry().get_config("local").unwrap().base_url.as_deref(),
            Some("http://127.0.0.1:7000")
        );
    }

    #[tokio::test]
    async fn test_engine_without_endpoint_or_runtime_is_configuration_error() {
        let config = ModelConfig::new("local", ProviderType::Engine, "qwen");
        let gw = gateway(config, Backend::Engine(Arc::new(MockEnginePort::new())));

        let err = gw.chat_completion(&ask("local")).await.unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn test_evict_model() {
        let fake = Arc::new(FakePredictions::default());
        let gw = gateway(m1(false, vec![Capability::Chat]), Backend::Prediction(fake));

        assert!(gw.evict_model("m1"));
        assert!(!gw.evict_model("m1"));
        let err = gw.chat_completion(&ask("m1")).await.unwrap_err();
        assert_eq!(err.status_code(), 404);
    }
}
