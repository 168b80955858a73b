use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::domain::ProviderError;

/// Stream type for HTTP response bodies
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError>;

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, ProviderError>;
}

/// Real HTTP client using reqwest.
///
/// Classifies transport and status failures into the normalized error
/// taxonomy so callers never see raw HTTP detail outside the error message.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: std::time::Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client })
    }

    async fn send(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            return Err(classify_status_error(response).await);
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderError> {
        let response = self.send(url, headers, body).await?;

        response
            .json()
            .await
            .map_err(|e| ProviderError::parse(format!("failed to parse response body: {}", e)))
    }

    async fn post_json_stream(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<ByteStream, ProviderError> {
        let response = self.send(url, headers, body).await?;

        use futures::StreamExt;
        // Dropping the returned stream drops the reqwest body and with it the
        // connection, so an early-terminating consumer leaks nothing.
        let stream = response.bytes_stream().map(|result| {
            result.map_err(|e| ProviderError::connection(format!("stream error: {}", e)))
        });

        Ok(Box::pin(stream))
    }
}

fn classify_transport_error(error: reqwest::Error) -> ProviderError {
    if error.is_timeout() {
        ProviderError::connection(format!("request timed out: {}", error))
    } else {
        ProviderError::connection(format!("request failed: {}", error))
    }
}

/// Map a non-success status to the error taxonomy, preserving the native
/// status and body for logging.
async fn classify_status_error(response: reqwest::Response) -> ProviderError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status, body);

    match status.as_u16() {
        401 | 403 => ProviderError::authorization(message),
        429 => ProviderError::rate_limit(message, retry_after),
        400..=499 => ProviderError::configuration(message),
        _ => ProviderError::server_unavailable(message),
    }
}
