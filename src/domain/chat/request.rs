use serde::{Deserialize, Serialize};

use super::ChatMessage;
use crate::domain::ProviderError;

/// Vendor-neutral chat completion request.
///
/// All provider code consumes this shape; a provider only ever sees its own
/// wire format inside its translation boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Model identifier; meaning is provider-specific. An empty string lets
    /// the provider fall back to its configured default model.
    #[serde(default)]
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    /// End-user identifier passed through to providers that accept one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Server-side conversation id for stateful providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            model: String::new(),
            temperature: None,
            max_tokens: None,
            stream: false,
            user: None,
            conversation_id: None,
        }
    }

    pub fn builder() -> ChatRequestBuilder {
        ChatRequestBuilder::new()
    }

    /// Shape checks performed before any network call.
    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.messages.is_empty() {
            return Err(ProviderError::validation(
                "request must contain at least one message",
            ));
        }

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(ProviderError::validation(format!(
                    "temperature must be between 0.0 and 2.0, got {}",
                    temperature
                )));
            }
        }

        if self.max_tokens == Some(0) {
            return Err(ProviderError::validation("max_tokens must be positive"));
        }

        Ok(())
    }
}

/// Builder for ChatRequest
#[derive(Debug, Default)]
pub struct ChatRequestBuilder {
    messages: Vec<ChatMessage>,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    stream: bool,
    user: Option<String>,
    conversation_id: Option<String>,
}

impl ChatRequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn system(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::system(content))
    }

    pub fn user(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::user(content))
    }

    pub fn assistant(self, content: impl Into<String>) -> Self {
        self.message(ChatMessage::assistant(content))
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn end_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn conversation_id(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }

    pub fn build(self) -> ChatRequest {
        ChatRequest {
            messages: self.messages,
            model: self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
            user: self.user,
            conversation_id: self.conversation_id,
        }
    }
}
