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

const DEFAULT_QWEN_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";
const DEFAULT_QWEN_MODEL: &str = "qwen3-32b";

/// Configuration for the Qwen (DashScope) provider.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QwenConfig {
    #[serde(flatten)]
    #[validate(nested)]
    pub base: ProviderConfig,
}

impl QwenConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base: ProviderConfig::new(api_key),
        }
    }
}

/// Qwen provider against the DashScope text-generation API.
///
/// Structurally the same problem as the OpenAI provider — a message array in,
/// a single completion out — but under DashScope's own schema: the messages
/// nest under `input`, tuning knobs under `parameters`, usage comes back as
/// `input_tokens`/`output_tokens`, and streaming needs the `X-DashScope-SSE`
/// header. Kept as its own translator so DashScope schema changes never touch
/// the generic provider.
#[derive(Debug)]
pub struct QwenProvider<C: HttpClientTrait> {
    client: C,
    config: QwenConfig,
    auth_header: String,
    base_url: String,
}

impl<C: HttpClientTrait> QwenProvider<C> {
    pub fn new(client: C, mut config: QwenConfig) -> Result<Self, ProviderError> {
        validate_config(&config)?;

        if config.base.default_model.is_empty() {
            config.base.default_model = DEFAULT_QWEN_MODEL.to_string();
        }

        let auth_header = format!("Bearer {}", config.base.api_key);
        let base_url = config
            .base
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_QWEN_BASE_URL)
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

    fn generation_url(&self) -> String {
        format!("{}/services/aigc/text-generation/generation", self.base_url)
    }

    fn headers(&self, stream: bool) -> Vec<(&str, &str)> {
        let mut headers = vec![
            ("Authorization", self.auth_header.as_str()),
            ("Content-Type", "application/json"),
        ];

        if stream {
            headers.push(("X-DashScope-SSE", "enable"));
        }

        headers
    }

    fn build_request(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<QwenMessage> = request
            .messages
            .iter()
            .map(QwenMessage::from_unified)
            .collect();

        let mut parameters = serde_json::json!({
            "result_format": "message",
        });

        if let Some(temperature) = request.temperature {
            parameters["temperature"] = serde_json::json!(temperature);
        }

        if let Some(max_tokens) = request.max_tokens {
            parameters["max_tokens"] = serde_json::json!(max_tokens);
        }

        if stream {
            parameters["incremental_output"] = serde_json::json!(true);
        }

        serde_json::json!({
            "model": request.model,
            "input": { "messages": messages },
            "parameters": parameters,
        })
    }

    fn parse_response(
        &self,
        request: &ChatRequest,
        json: serde_json::Value,
    ) -> Result<ChatResponse, ProviderError> {
        let response: QwenResponse = serde_json::from_value(json)
            .map_err(|e| ProviderError::parse(format!("unexpected qwen response: {}", e)))?;

        let choice = response
            .output
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::parse("qwen response has no choices"))?;

        let usage = response
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_default();

        let mut unified = ChatResponse::new(
            response.request_id,
            choice.message.content,
            request.model.clone(),
            ProviderType::Qwen,
            usage,
        );

        if let Some(reason) = parse_finish_reason(choice.finish_reason.as_deref()) {
            unified = unified.with_finish_reason(reason);
        }

        Ok(unified)
    }
}

#[async_trait]
impl<C: HttpClientTrait> ProviderBackend for QwenProvider<C> {
    fn provider_type(&self) -> ProviderType {
        ProviderType::Qwen
    }

    async fn call_api(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let url = self.generation_url();
        let body = self.build_request(request, false);
        let response = self
            .client
            .post_json(&url, self.headers(false), &body)
            .await?;

        self.parse_response(request, response)
    }

    async fn call_stream_api(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError> {
        let url = self.generation_url();
        let body = self.build_request(request, true);
        let byte_stream = self
            .client
            .post_json_stream(&url, self.headers(true), &body)
            .await?;

        let model = request.model.clone();

        Ok(sse::parse_lines(byte_stream, move |line| {
            // DashScope frames events as "id:", "event:" and "data:" lines;
            // only the data payload matters here.
            let data = line.strip_prefix("data:")?.trim_start();
            if data.is_empty() {
                return None;
            }

            let event: QwenResponse = match serde_json::from_str(data) {
                Ok(event) => event,
                Err(e) => {
                    return Some(Err(ProviderError::parse(format!(
                        "unexpected qwen stream event: {}",
                        e
                    ))));
                }
            };

            let choice = event.output.choices.into_iter().next()?;
            let mut chunk =
                StreamChunk::new(event.request_id, model.clone(), ProviderType::Qwen)
                    .with_delta(choice.message.content);

            if let Some(reason) = parse_finish_reason(choice.finish_reason.as_deref()) {
                chunk = chunk.with_finish_reason(reason);
            }

            Some(Ok(chunk))
        }))
    }
}

/// DashScope reports `"null"` (the string) until the final frame.
fn parse_finish_reason(reason: Option<&str>) -> Option<FinishReason> {
    match reason {
        Some("stop") => Some(FinishReason::Stop),
        Some("length") => Some(FinishReason::Length),
        _ => None,
    }
}

// DashScope wire types

#[derive(Debug, Serialize)]
struct QwenMessage {
    role: &'static str,
    content: String,
}

impl QwenMessage {
    fn from_unified(message: &ChatMessage) -> Self {
        Self {
            role: message.role().as_str(),
            content: message.content().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct QwenResponse {
    request_id: String,
    output: QwenOutput,
    usage: Option<QwenUsage>,
}

#[derive(Debug, Deserialize)]
struct QwenOutput {
    #[serde(default)]
    choices: Vec<QwenChoice>,
}

#[derive(Debug, Deserialize)]
struct QwenChoice {
    message: QwenResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QwenResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct QwenUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::llm::http_client::mock::MockHttpClient;
    use bytes::Bytes;
    use futures::StreamExt;

    const TEST_URL: &str =
        "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation";

    fn test_config() -> QwenConfig {
        QwenConfig::new("test-api-key-123")
    }

    #[test]
    fn test_request_body_shape() {
        let provider = QwenProvider::new(MockHttpClient::new(), test_config()).unwrap();

        let request = ChatRequest::builder()
            .system("Be terse")
            .user("Hi")
            .model("qwen3-32b")
            .temperature(0.7)
            .build();

        let body = provider.build_request(&request, false);
        assert_eq!(body["model"], "qwen3-32b");
        assert_eq!(body["input"]["messages"][0]["role"], "system");
        assert_eq!(body["input"]["messages"][1]["content"], "Hi");
        assert_eq!(body["parameters"]["result_format"], "message");
        assert_eq!(body["parameters"]["temperature"], 0.7);
        assert!(body["parameters"].get("incremental_output").is_none());

        let body = provider.build_request(&request, true);
        assert_eq!(body["parameters"]["incremental_output"], true);
    }

    #[test]
    fn test_streaming_header() {
        let provider = QwenProvider::new(MockHttpClient::new(), test_config()).unwrap();

        assert!(provider
            .headers(true)
            .contains(&("X-DashScope-SSE", "enable")));
        assert!(!provider
            .headers(false)
            .contains(&("X-DashScope-SSE", "enable")));
    }

    #[tokio::test]
    async fn test_chat_translates_vendor_fields() {
        let mock_response = serde_json::json!({
            "request_id": "req-7",
            "output": {
                "choices": [{
                    "message": { "role": "assistant", "content": "你好!" },
                    "finish_reason": "stop"
                }]
            },
            "usage": { "input_tokens": 9, "output_tokens": 4, "total_tokens": 13 }
        });

        let client = MockHttpClient::new().with_response(TEST_URL, mock_response);
        let provider = QwenProvider::new(client, test_config()).unwrap();

        let request = ChatRequest::builder().user("你好").model("qwen3-32b").build();
        let response = provider.call_api(&request).await.unwrap();

        assert_eq!(response.id, "req-7");
        assert_eq!(response.content, "你好!");
        assert_eq!(response.provider, ProviderType::Qwen);
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
        assert_eq!(response.usage.prompt_tokens, 9);
        assert_eq!(response.usage.completion_tokens, 4);
        assert_eq!(response.usage.total_tokens, 13);
    }

    #[tokio::test]
    async fn test_empty_choices_is_parse_error() {
        let mock_response = serde_json::json!({
            "request_id": "req-7",
            "output": { "choices": [] }
        });

        let client = MockHttpClient::new().with_response(TEST_URL, mock_response);
        let provider = QwenProvider::new(client, test_config()).unwrap();

        let request = ChatRequest::builder().user("Hi").model("qwen3-32b").build();
        let error = provider.call_api(&request).await.unwrap_err();
        assert!(matches!(error, ProviderError::Parse { .. }));
    }

    #[tokio::test]
    async fn test_stream_incremental_output() {
        let events = vec![
            Bytes::from(
                "id:1\nevent:result\ndata:{\"request_id\":\"req-7\",\"output\":{\"choices\":[{\"message\":{\"content\":\"Hel\"},\"finish_reason\":\"null\"}]}}\n\n",
            ),
            Bytes::from(
                "id:2\nevent:result\ndata:{\"request_id\":\"req-7\",\"output\":{\"choices\":[{\"message\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}]}}\n\n",
            ),
        ];

        let client = MockHttpClient::new().with_stream_response(TEST_URL, events);
        let provider = QwenProvider::new(client, test_config()).unwrap();

        let request = ChatRequest::builder()
            .user("Hi")
            .model("qwen3-32b")
            .stream(true)
            .build();
        let stream = provider.call_stream_api(&request).await.unwrap();
        let chunks: Vec<StreamChunk> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.len(), 2);
        let text: String = chunks.iter().map(|c| c.delta.as_str()).collect();
        assert_eq!(text, "Hello");
        assert_eq!(chunks[0].finish_reason, None);
        assert_eq!(chunks[1].finish_reason, Some(FinishReason::Stop));
    }
}
