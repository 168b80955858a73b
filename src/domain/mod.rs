pub mod chat;
mod error;

pub use chat::{
    validate_config, ChatMessage, ChatProvider, ChatRequest, ChatRequestBuilder, ChatResponse,
    ChatStream, FinishReason, MessageRole, ProviderConfig, ProviderMetrics, ProviderType,
    StreamChunk, TokenUsage,
};
pub use error::ProviderError;
