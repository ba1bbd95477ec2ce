//! Domain types shared by every infergate crate.
//!
//! Nothing here performs I/O.

pub mod chat;
pub mod model;
pub mod prediction;

pub use chat::{
    CHAT_COMPLETION_CHUNK_OBJECT, CHAT_COMPLETION_OBJECT, ChatChoice, ChatCompletionChunk,
    ChatCompletionRequest, ChatCompletionResponse, ChatDelta, ChatMessage, ChunkChoice,
    ContentPart, MessageContent, ResponseMessage, StopSequences, Usage,
};
pub use model::{
    CachePolicy, Capability, Credential, EndpointPatch, ModelConfig, ModelRef, ProviderType,
    RateLimit, Secret,
};
pub use prediction::{
    ModelInfo, ModelVersion, Prediction, PredictionMetrics, PredictionRequest, PredictionStatus,
    PredictionUrls, output_text,
};
