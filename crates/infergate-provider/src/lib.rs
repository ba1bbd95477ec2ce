#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

mod config;
mod engine;
mod error;
mod factory;
mod http;
mod port;
mod prediction;
mod retry;
mod sse;
mod url;

// ============================================================================
// Public API
// ============================================================================

// Clients
pub use engine::EngineClient;
pub use prediction::{PredictionClient, TextStream};

// Configuration
pub use config::{DEFAULT_PREDICTION_BASE_URL, EngineClientConfig, PredictionClientConfig};

// Backend construction
pub use factory::DefaultBackendFactory;

// Transport
pub use http::{ApiRequest, ByteStream, HttpBackend, Method, ReqwestBackend};
pub use retry::RetryPolicy;
pub use sse::SseChunkStream;

// Errors
pub use error::{ProviderError, ProviderResult};

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
