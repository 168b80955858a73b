use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies which backend produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAi,
    Dify,
    Qwen,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAi => "openai",
            ProviderType::Dify => "dify",
            ProviderType::Qwen => "qwen",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason why the generation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

/// Token usage statistics.
///
/// `total_tokens` is always `prompt_tokens + completion_tokens`; providers
/// that report their own total go through `new` so the invariant holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Normalized non-streaming response from a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub provider: ProviderType,
    pub usage: TokenUsage,
    pub finish_reason: Option<FinishReason>,
    /// Latency of the last attempt, filled in by the call lifecycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Provider-specific fields the caller may need to thread back, e.g. the
    /// conversation id of a stateful provider.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_data: HashMap<String, serde_json::Value>,
}

impl ChatResponse {
    pub fn new(
        id: impl Into<String>,
        content: impl Into<String>,
        model: impl Into<String>,
        provider: ProviderType,
        usage: TokenUsage,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            model: model.into(),
            provider,
            usage,
            finish_reason: None,
            latency_ms: None,
            extra_data: HashMap::new(),
        }
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_data.insert(key.into(), value);
        self
    }
}

/// One incremental unit of a streamed response.
///
/// `finish_reason` stays `None` until the terminal chunk; concatenating every
/// `delta` of a stream yields the same text a non-streaming call returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub id: String,
    pub delta: String,
    pub model: String,
    pub provider: ProviderType,
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra_data: HashMap<String, serde_json::Value>,
}

impl StreamChunk {
    pub fn new(id: impl Into<String>, model: impl Into<String>, provider: ProviderType) -> Self {
        Self {
            id: id.into(),
            delta: String::new(),
            model: model.into(),
            provider,
            finish_reason: None,
            extra_data: HashMap::new(),
        }
    }

    pub fn with_delta(mut self, delta: impl Into<String>) -> Self {
        self.delta = delta.into();
        self
    }

    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra_data.insert(key.into(), value);
        self
    }
}
