use std::fmt::Debug;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::{ChatRequest, ChatResponse, ProviderMetrics, ProviderType, StreamChunk};
use crate::domain::ProviderError;

/// Stream of normalized chunks for one request. Finite and single-pass;
/// dropping it releases the underlying transport.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, ProviderError>> + Send>>;

/// The capability every chat backend exposes to the surrounding application.
#[async_trait]
pub trait ChatProvider: Send + Sync + Debug {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Send a chat completion request and stream the response incrementally.
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream, ProviderError>;

    fn provider_type(&self) -> ProviderType;

    /// Snapshot of the call counters for this instance.
    fn metrics(&self) -> ProviderMetrics;

    fn reset_metrics(&self);
}
