//! Core services - request orchestration over ports and domain logic.
//!
//! Services here only know trait objects; concrete HTTP clients are
//! injected by the binary's composition root.

mod gateway;

pub use gateway::InferenceGateway;
