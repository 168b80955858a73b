//! Unified chat data model: the vendor-neutral shapes all core logic
//! operates on.

mod config;
mod message;
mod metrics;
mod provider;
mod request;
mod response;

pub use config::{validate_config, ProviderConfig};
pub use message::{ChatMessage, MessageRole};
pub use metrics::ProviderMetrics;
pub use provider::{ChatProvider, ChatStream};
pub use request::{ChatRequest, ChatRequestBuilder};
pub use response::{ChatResponse, FinishReason, ProviderType, StreamChunk, TokenUsage};
