use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::http_client::HttpClientTrait;
use super::managed::ProviderBackend;
use super::sse;
use crate::domain::{
    validate_config, ChatRequest, ChatResponse, ChatStream, FinishReason, MessageRole,
    ProviderConfig, ProviderError, ProviderType, StreamChunk, TokenUsage,
};

const DEFAULT_DIFY_BASE_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_DIFY_MODEL: &str = "gpt-3.5-turbo";

/// Configuration for the Dify provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DifyConfig {
    #[serde(flatten)]
    #[validate(nested)]
    pub base: ProviderConfig,

    /// Dify application id, for bookkeeping in multi-app setups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Conversation to continue when the request itself names none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl DifyConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base: ProviderConfig::new(api_key),
            app_id: None,
            conversation_id: None,
        }
    }
}

/// Dify chat-messages provider.
///
/// Dify does not take a message array: its API wants a single `query` plus
/// optional `inputs`, and tracks multi-turn context server-side through an
/// opaque `conversation_id`. Translation takes the last user message as the
/// query and flattens system messages into the inputs; the response's
/// conversation id is surfaced in `extra_data` so the caller can resupply it
/// on the next turn.
#[derive(Debug)]
pub struct DifyProvider<C: HttpClientTrait> {
    client: C,
    config: DifyConfig,
    auth_header: String,
    base_url: String,
}

impl<C: HttpClientTrait> DifyProvider<C> {
    pub fn new(client: C, mut config: DifyConfig) -> Result<Self, ProviderError> {
        validate_config(&config)?;

        if config.base.default_model.is_empty() {
            config.base.default_model = DEFAULT_DIFY_MODEL.to_string();
        }

        let auth_header = format!("Bearer {}", config.base.api_key);
        let base_url = config
            .base
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_DIFY_BASE_URL)
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

    fn chat_messages_url(&self) -> String {
        format!("{}/chat-messages", self.base_url)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    /// The last role=user message is the authoritative query; earlier turns
    /// live server-side under the conversation id.
    fn extract_query(request: &ChatRequest) -> Result<&str, ProviderError> {
        request
            .messages
            .iter()
            .rev()
            .find(|m| m.role() == MessageRole::User)
            .map(|m| m.content())
            .ok_or_else(|| {
                ProviderError::validation("dify requests must contain a user message")
            })
    }

    fn extract_inputs(request: &ChatRequest) -> Option<String> {
        let joined = request
            .messages
            .iter()
            .filter(|m| m.role() == MessageRole::System)
            .map(|m| m.content())
            .collect::<Vec<_>>()
            .join("\n");

        if joined.is_empty() { None } else { Some(joined) }
    }

    fn build_request(
        &self,
        request: &ChatRequest,
        response_mode: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let query = Self::extract_query(request)?;

        let mut body = serde_json::json!({
            "query": query,
            "response_mode": response_mode,
            "user": request
                .user
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        });

        if let Some(inputs) = Self::extract_inputs(request) {
            body["inputs"] = serde_json::json!(inputs);
        }

        if let Some(conversation_id) = request
            .conversation_id
            .as_deref()
            .or(self.config.conversation_id.as_deref())
        {
            body["conversation_id"] = serde_json::json!(conversation_id);
        }

        Ok(body)
    }

    fn parse_response(
        &self,
        request: &ChatRequest,
        json: serde_json::Value,
    ) -> Result<ChatResponse, ProviderError> {
        let response: DifyResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::parse(format!("unexpected dify response: {}", e)))?;

        let usage = response
            .metadata
            .as_ref()
            .and_then(|m| m.usage.as_ref())
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let id = response
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        // Dify does not report a model; echo the requested one.
        let mut unified = ChatResponse::new(
            id,
            response.answer,
            request.model.clone(),
            ProviderType::Dify,
            usage,
        )
        .with_finish_reason(FinishReason::Stop);

        if let Some(conversation_id) = response.conversation_id {
            unified = unified.with_extra("conversation_id", serde_json::json!(conversation_id));
        }
        if let Some(message_id) = response.message_id {
            unified = unified.with_extra("message_id", serde_json::json!(message_id));
        }

        Ok(unified)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderBackend for DifyProvider<C> {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Dify
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.chat_messages_url();
        let body = self.build_request(request, "blocking")?;
        let response = self.client.post_json(&url, self.headers(), &body).await?;

        self.parse_response(request, response)
    }

    async fn call_stream_api(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let url = self.chat_messages_url();
        let body = self.build_request(request, "streaming")?;
        let byte_stream = self
            .client
            .post_json_stream(&url, self.headers(), &body)
            .await?;

        let model = request.model.clone();
        let stream_id = uuid::Uuid::new_v4().to_string();

        Ok(sse::parse_lines(byte_stream, move |line| {
            let data = line.strip_prefix("data:")?.trim_start();
            if data.is_empty() {
                return None;
            }

            let event: DifyStreamEvent = match serde_json::from_str(data) {
                Ok(event) => event,
                Err(e) => {
                    return Some(Err(ProviderError::parse(format!(
                        "unexpected dify stream event: {}",
                        e
                    ))));
                }
            };

            match event.event.as_str() {
                // Incremental answer fragments.
                "message" | "agent_message" => {
                    let delta = event.answer.unwrap_or_default();
                    Some(Ok(StreamChunk::new(
                        stream_id.clone(),
                        model.clone(),
                        ProviderType::Dify,
                    )
                    .with_delta(delta)))
                }
                "message_delta" => {
                    let delta = event.delta.unwrap_or_default();
                    Some(Ok(StreamChunk::new(
                        stream_id.clone(),
                        model.clone(),
                        ProviderType::Dify,
                    )
                    .with_delta(delta)))
                }
                // Terminal event: a zero-delta chunk carrying conversation
                // metadata, not a normal data frame.
                "message_end" => {
                    let mut chunk = StreamChunk::new(
                        stream_id.clone(),
                        model.clone(),
                        ProviderType::Dify,
                    )
                    .with_finish_reason(FinishReason::Stop);

                    if let Some(conversation_id) = event.conversation_id {
                        chunk = chunk
                            .with_extra("conversation_id", serde_json::json!(conversation_id));
                    }

                    Some(Ok(chunk))
                }
                "error" => Some(Err(ProviderError::server_unavailable(format!(
                    "dify stream error: {}",
                    event.message.unwrap_or_default()
                )))),
                // ping, workflow events and the like carry no answer text.
                _ => None,
            }
        }))
    }
}

// Dify wire types

#[derive(Debug, Deserialize)]
struct DifyResponse {
    id: Option<String>,
    answer: String,
    conversation_id: Option<String>,
    message_id: Option<String>,
    metadata: Option<DifyMetadata>,
}

#[derive(Debug, Deserialize)]
struct DifyMetadata {
    usage: Option<DifyUsage>,
}

#[derive(Debug, Deserialize)]
struct DifyUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct DifyStreamEvent {
    event: String,
    answer: Option<String>,
    delta: Option<String>,
    conversation_id: Option<String>,
    message: Option<String>,
}
