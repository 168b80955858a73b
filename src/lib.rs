//! Chat Gateway Core
//!
//! A unified chat completion interface over multiple AI providers:
//! - One request/response model regardless of the upstream wire format
//! - Normalized error taxonomy with retry and rate-limit handling
//! - Streaming responses as a single chunk stream shape
//! - A registry for building providers from configuration by id
//!
//! The built-in providers cover OpenAI-compatible APIs, Dify applications
//! and Qwen (DashScope). Custom providers plug in through
//! [`ProviderBackend`](infrastructure::llm::ProviderBackend) plus
//! [`ProviderRegistry::register`](infrastructure::llm::ProviderRegistry::register).

pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::{
    ChatMessage, ChatProvider, ChatRequest, ChatResponse, ChatStream, FinishReason, MessageRole,
    ProviderConfig, ProviderError, ProviderMetrics, ProviderType, StreamChunk, TokenUsage,
};
pub use infrastructure::llm::ProviderRegistry;
