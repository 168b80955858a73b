use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::http_client::HttpClientTrait;
use super::managed::ProviderBackend;
use super::sse;
use crate::domain::{
    validate_config, ChatMessage, ChatRequest, ChatResponse, ChatStream, FinishReason,
    ProviderConfig, ProviderError, ProviderType, StreamChunk, TokenUsage,
};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for the OpenAI-style provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OpenAiConfig {
    #[serde(flatten)]
    #[validate(nested)]
    pub base: ProviderConfig,

    /// Optional organization header for multi-org accounts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base: ProviderConfig::new(api_key),
            organization: None,
        }
    }
}

/// OpenAI chat completions provider.
///
/// The unified message array maps near 1:1 onto the native `messages` field;
/// the response comes back through `choices[0].message.content` and `usage`.
#[derive(Debug)]
pub struct OpenAiProvider<C: HttpClientTrait> {
    client: C,
    config: OpenAiConfig,
    auth_header: String,
    base_url: String,
}

impl<C: HttpClientTrait> OpenAiProvider<C> {
    pub fn new(client: C, mut config: OpenAiConfig) -> Result<Self, ProviderError> {
        validate_config(&config)?;

        if config.base.default_model.is_empty() {
            config.base.default_model = DEFAULT_OPENAI_MODEL.to_string();
        }

        let auth_header = format!("Bearer {}", config.base.api_key);
        let base_url = config
            .base
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_OPENAI_BASE_URL)
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            config,
            auth_header,
            base_url,
        })
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config.base
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        let mut headers = vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ];

        if let Some(ref organization) = self.config.organization {
            headers.push(("OpenAI-Organization", organization.as_str()));
        }

        headers
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<OpenAiMessage> = request
            .messages
            .iter()
            .map(OpenAiMessage::from_unified)
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if let Some(ref user) = request.user {
            body["user"] = serde_json::json!(user);
        }

        body
    }

    fn parse_response(&self, json: serde_json::Value) -> Result<ChatResponse, ProviderError> {
        let response: OpenAiResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::parse(format!("unexpected openai response: {}", e)))?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::parse("openai response has no choices"))?;

        let content = choice
            .message
            .content
            .ok_or_else(|| ProviderError::parse("openai response has no message content"))?;

        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let mut unified = ChatResponse::new(
            response.id,
            content,
            response.model,
            ProviderType::OpenAi,
            usage,
        );

        if let Some(reason) = choice.finish_reason {
            unified = unified.with_finish_reason(parse_finish_reason(&reason));
        }

        Ok(unified)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderBackend for OpenAiProvider<C> {
    fn provider_type(&self) -> ProviderType {
        ProviderType::OpenAi
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.chat_completions_url();
        let body = self.build_request(request, false);
        let response = self.client.post_json(&url, self.headers(), &body).await?;

        self.parse_response(response)
    }

    async fn call_stream_api(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let url = self.chat_completions_url();
        let body = self.build_request(request, true);
        let byte_stream = self
            .client
            .post_json_stream(&url, self.headers(), &body)
            .await?;

        let model = request.model.clone();
        let mut finished = false;
        let mut last_id = String::new();

        Ok(sse::parse_lines(byte_stream, move |line| {
            let data = line.strip_prefix("data:")?.trim_start();

            if data == "[DONE]" {
                if finished {
                    return None;
                }
                finished = true;
                // Reuse the upstream id so the terminal chunk keys with the
                // rest of the stream.
                return Some(Ok(StreamChunk::new(
                    last_id.clone(),
                    model.clone(),
                    ProviderType::OpenAi,
                )
                .with_finish_reason(FinishReason::Stop)));
            }

            match serde_json::from_str::<OpenAiStreamEvent>(data) {
                Ok(event) => {
                    last_id = event.id.clone();
                    let choice = event.choices.into_iter().next()?;
                    let mut chunk = StreamChunk::new(
                        event.id,
                        event.model.unwrap_or_else(|| model.clone()),
                        ProviderType::OpenAi,
                    );

                    if let Some(text) = choice.delta.content {
                        chunk = chunk.with_delta(text);
                    }

                    if let Some(reason) = choice.finish_reason {
                        finished = true;
                        chunk = chunk.with_finish_reason(parse_finish_reason(&reason));
                    }

                    Some(Ok(chunk))
                }
                Err(e) => Some(Err(ProviderError::parse(format!(
                    "unexpected openai stream event: {}",
                    e
                )))),
            }
        }))
    }
}

fn parse_finish_reason(reason: &str) -> FinishReason {
    match reason {
        "length" => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

// OpenAI wire types

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

impl OpenAiMessage {
    fn from_unified(message: &ChatMessage) -> Self {
        Self {
            role: message.role().as_str(),
            content: message.content().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    id: String,
    model: String,
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamEvent {
    id: String,
    model: Option<String>,
    choices: Vec<OpenAiStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    content: Option<String>,
}
