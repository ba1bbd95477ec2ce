//! Port definitions (trait abstractions) for infergate.
//!
//! Ports describe what the gateway needs from the outside world without
//! naming a transport. Adapter crates implement them:
//!
//! - `infergate-provider` implements [`PredictionPort`], [`EnginePort`] and
//!   [`BackendFactory`] over reqwest.
//! - The engine process manager (outside this workspace) implements
//!   [`EngineRuntimePort`].
//!
//! # Design Rules
//!
//! - No `reqwest` or `axum` types in any signature
//! - Errors are domain errors; HTTP statuses are carried as plain numbers
//! - All traits are `Send + Sync` so they can sit behind `Arc<dyn _>`

pub mod backend;
pub mod engine_runtime;

pub use backend::{
    Backend, BackendError, BackendFactory, ChunkStream, EnginePort, PredictionPort,
    PredictionStream,
};
pub use engine_runtime::{EngineRuntimeError, EngineRuntimePort, RunningEngine};

#[cfg(test)]
pub use backend::{MockBackendFactory, MockEnginePort, MockPredictionPort};
#[cfg(test)]
pub use engine_runtime::MockEngineRuntimePort;
