#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

pub mod adapter;
pub mod admission;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod redact;
pub mod registry;
pub mod services;

// Re-export commonly used types for convenience
pub use adapter::{ChatEventStream, ChunkBuilder, StreamEvent};
pub use admission::{AdmissionError, MIN_REFILL_RATE, RateLimiter, TokenBucket};
pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use config::{
    ConfigError, GatewayConfig, RawModelConfig, ServerSettings, require_engine_base_urls,
};
pub use domain::{
    CachePolicy, Capability, ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse,
    ChatMessage, Credential, EndpointPatch, ModelConfig, ModelInfo, ModelRef, Prediction,
    PredictionRequest, PredictionStatus, ProviderType, RateLimit, Secret, Usage,
};
pub use error::{GatewayError, GatewayResult};
pub use ports::{
    Backend, BackendError, BackendFactory, ChunkStream, EnginePort, EngineRuntimeError,
    EngineRuntimePort, PredictionPort, PredictionStream, RunningEngine,
};
pub use redact::redact;
pub use registry::ProviderRegistry;
pub use services::InferenceGateway;

#[cfg(test)]
use tokio_test as _;
