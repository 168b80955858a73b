use std::fmt::Debug;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::Stream;
use tracing::{debug, error, info, warn};

use crate::domain::{
    ChatProvider, ChatRequest, ChatResponse, ChatStream, ProviderConfig, ProviderError,
    ProviderMetrics, ProviderType, StreamChunk,
};

/// Wire-format-specific steps a concrete provider supplies.
///
/// A backend performs exactly one attempt per call; validation, retries and
/// metrics live in [`ManagedProvider`].
#[async_trait]
pub trait ProviderBackend: Send + Sync + Debug {
    fn provider_type(&self) -> ProviderType;

    /// One non-streaming call attempt against the native wire API.
    async fn call_api(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// One streaming call attempt; the returned stream carries normalized
    /// chunks in transport order.
    async fn call_stream_api(&self, request: &ChatRequest) -> Result<ChatStream, ProviderError>;
}

/// The call lifecycle shared by every provider: request validation, latency
/// measurement, retry on retryable failures, metrics accounting.
#[derive(Debug)]
pub struct ManagedProvider<B> {
    backend: B,
    default_model: String,
    max_retries: u32,
    retry_delay: Duration,
    metrics: Arc<Mutex<ProviderMetrics>>,
}

impl<B: ProviderBackend> ManagedProvider<B> {
    pub fn new(backend: B, config: &ProviderConfig) -> Self {
        let metrics = ProviderMetrics::new(backend.provider_type(), config.default_model.clone());

        Self {
            backend,
            default_model: config.default_model.clone(),
            max_retries: config.max_retries,
            retry_delay: config.retry_delay_duration(),
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    fn prepare(&self, request: &mut ChatRequest) -> Result<(), ProviderError> {
        if let Err(e) = request.validate() {
            // Rejected before any attempt: only the error counter moves.
            self.metrics.lock().unwrap().record_error();
            return Err(e);
        }

        if request.model.is_empty() {
            request.model = self.default_model.clone();
        }

        Ok(())
    }

    fn backoff(&self, error: &ProviderError) -> Duration {
        match error.retry_after() {
            Some(seconds) => self.retry_delay.max(Duration::from_secs(seconds)),
            None => self.retry_delay,
        }
    }
}

#[async_trait]
impl<B: ProviderBackend> ChatProvider for ManagedProvider<B> {
    async fn chat(&self, mut request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        self.prepare(&mut request)?;

        let provider = self.backend.provider_type();
        let mut attempt: u32 = 0;

        loop {
            self.metrics.lock().unwrap().record_attempt();
            let started = Instant::now();
            debug!(%provider, attempt, model = %request.model, "chat attempt");

            match self.backend.call_api(&request).await {
                Ok(mut response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    response.latency_ms = Some(latency_ms);

                    self.metrics
                        .lock()
                        .unwrap()
                        .record_success(latency_ms, response.usage.total_tokens as u64);

                    info!(%provider, latency_ms, "chat request successful");
                    return Ok(response);
                }
                Err(e) => {
                    if e.is_retryable() && attempt < self.max_retries {
                        let wait = self.backoff(&e);
                        warn!(
                            %provider,
                            attempt,
                            error = %e,
                            wait_ms = wait.as_millis() as u64,
                            "chat attempt failed, retrying"
                        );
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    } else {
                        self.metrics.lock().unwrap().record_error();
                        error!(%provider, attempts = attempt + 1, error = %e, "chat request failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn chat_stream(&self, mut request: ChatRequest) -> Result<ChatStream, ProviderError> {
        self.prepare(&mut request)?;
        request.stream = true;

        let provider = self.backend.provider_type();
        let mut attempt: u32 = 0;

        loop {
            self.metrics.lock().unwrap().record_attempt();
            let started = Instant::now();
            debug!(%provider, attempt, model = %request.model, "stream chat attempt");

            match self.backend.call_stream_api(&request).await {
                Ok(stream) => {
                    return Ok(Box::pin(MeteredStream {
                        inner: stream,
                        metrics: self.metrics.clone(),
                        started,
                        settled: false,
                    }));
                }
                Err(e) => {
                    if e.is_retryable() && attempt < self.max_retries {
                        let wait = self.backoff(&e);
                        warn!(%provider, attempt, error = %e, "stream attempt failed, retrying");
                        tokio::time::sleep(wait).await;
                        attempt += 1;
                    } else {
                        self.metrics.lock().unwrap().record_error();
                        error!(%provider, attempts = attempt + 1, error = %e, "stream request failed");
                        return Err(e);
                    }
                }
            }
        }
    }

    fn provider_type(&self) -> ProviderType {
        self.backend.provider_type()
    }

    fn metrics(&self) -> ProviderMetrics {
        self.metrics.lock().unwrap().clone()
    }

    fn reset_metrics(&self) {
        self.metrics.lock().unwrap().reset();
    }
}

/// Wraps an established stream to settle metrics exactly once: success on the
/// terminal chunk or natural exhaustion, error on the first error item. A
/// stream dropped early by the consumer settles neither way; dropping it
/// still releases the transport.
struct MeteredStream {
    inner: ChatStream,
    metrics: Arc<Mutex<ProviderMetrics>>,
    started: Instant,
    settled: bool,
}

impl MeteredStream {
    fn settle_success(&mut self) {
        if !self.settled {
            self.settled = true;
            let latency_ms = self.started.elapsed().as_millis() as u64;
            self.metrics.lock().unwrap().record_success(latency_ms, 0);
        }
    }

    fn settle_error(&mut self) {
        if !self.settled {
            self.settled = true;
            self.metrics.lock().unwrap().record_error();
        }
    }
}

impl Stream for MeteredStream {
    type Item = Result<StreamChunk, ProviderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if chunk.finish_reason.is_some() {
                    this.settle_success();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.settle_error();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.settle_success();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{stream, StreamExt};
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::domain::{FinishReason, TokenUsage};

    /// Scripted backend: answers with a fixed response after an optional
    /// number of failures.
    #[derive(Debug)]
    struct ScriptedBackend {
        attempts: AtomicU32,
        failures_before_success: u32,
        error: ProviderError,
        content: String,
    }

    impl ScriptedBackend {
        fn succeeding(content: &str) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures_before_success: 0,
                error: ProviderError::server_unavailable("unused"),
                content: content.to_string(),
            }
        }

        fn failing(error: ProviderError) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures_before_success: u32::MAX,
                error,
                content: String::new(),
            }
        }

        fn flaky(failures: u32, error: ProviderError, content: &str) -> Self {
            Self {
                attempts: AtomicU32::new(0),
                failures_before_success: failures,
                error,
                content: content.to_string(),
            }
        }

        fn attempts(&self) -> u32 {
            self.attempts.load(Ordering::SeqCst)
        }

        fn response(&self, request: &ChatRequest) -> ChatResponse {
            ChatResponse::new(
                "resp-1",
                self.content.clone(),
                request.model.clone(),
                ProviderType::OpenAi,
                TokenUsage::new(7, 5),
            )
            .with_finish_reason(FinishReason::Stop)
        }
    }

    #[async_trait]
    impl ProviderBackend for ScriptedBackend {
        fn provider_type(&self) -> ProviderType {
            ProviderType::OpenAi
        }

        async fn call_api(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                return Err(self.error.clone());
            }
            Ok(self.response(request))
        }

        async fn call_stream_api(
            &self,
            request: &ChatRequest,
        ) -> Result<ChatStream, ProviderError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures_before_success {
                return Err(self.error.clone());
            }

            let model = request.model.clone();
            let chunks: Vec<Result<StreamChunk, ProviderError>> = self
                .content
                .chars()
                .map(|c| {
                    Ok(StreamChunk::new("resp-1", model.clone(), ProviderType::OpenAi)
                        .with_delta(c.to_string()))
                })
                .chain(std::iter::once(Ok(StreamChunk::new(
                    "resp-1",
                    model.clone(),
                    ProviderType::OpenAi,
                )
                .with_finish_reason(FinishReason::Stop))))
                .collect();

            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    fn fast_config() -> ProviderConfig {
        let mut config = ProviderConfig::new("test-api-key-123").with_default_model("test-model");
        config.max_retries = 2;
        config.retry_delay = 0.01;
        config
    }

    fn request() -> ChatRequest {
        ChatRequest::builder().user("Hello!").build()
    }

    #[tokio::test]
    async fn test_successful_chat_records_metrics() {
        let provider = ManagedProvider::new(ScriptedBackend::succeeding("Hi!"), &fast_config());

        let response = provider.chat(request()).await.unwrap();

        assert_eq!(response.content, "Hi!");
        assert_eq!(response.model, "test-model");
        assert_eq!(
            response.usage.total_tokens,
            response.usage.prompt_tokens + response.usage.completion_tokens
        );
        assert!(response.latency_ms.is_some());

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 1);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.error_count, 0);
        assert_eq!(metrics.total_tokens, 12);
    }

    #[tokio::test]
    async fn test_retry_exhaustion() {
        let backend = ScriptedBackend::failing(ProviderError::server_unavailable("HTTP 503"));
        let provider = ManagedProvider::new(backend, &fast_config());

        let error = provider.chat(request()).await.unwrap_err();
        assert!(matches!(error, ProviderError::ServerUnavailable { .. }));

        // max_retries = 2: one initial attempt plus two retries.
        assert_eq!(provider.backend.attempts(), 3);

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 3);
        assert_eq!(metrics.error_count, 1);
        assert_eq!(metrics.success_count, 0);
    }

    #[tokio::test]
    async fn test_non_retryable_short_circuits() {
        let backend = ScriptedBackend::failing(ProviderError::authorization("HTTP 401"));
        let provider = ManagedProvider::new(backend, &fast_config());

        let error = provider.chat(request()).await.unwrap_err();
        assert!(matches!(error, ProviderError::Authorization { .. }));
        assert_eq!(provider.backend.attempts(), 1);
        assert_eq!(provider.metrics().error_count, 1);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let backend = ScriptedBackend::flaky(
            1,
            ProviderError::connection("reset by peer"),
            "recovered",
        );
        let provider = ManagedProvider::new(backend, &fast_config());

        let response = provider.chat(request()).await.unwrap();
        assert_eq!(response.content, "recovered");
        assert_eq!(provider.backend.attempts(), 2);

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.error_count, 0);
    }

    #[tokio::test]
    async fn test_validation_failure_skips_backend() {
        let backend = ScriptedBackend::succeeding("unused");
        let provider = ManagedProvider::new(backend, &fast_config());

        let empty = ChatRequest::builder().build();
        let error = provider.chat(empty).await.unwrap_err();
        assert!(matches!(error, ProviderError::Validation { .. }));
        assert_eq!(provider.backend.attempts(), 0);

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 0);
        assert_eq!(metrics.error_count, 1);
    }

    #[tokio::test]
    async fn test_stream_matches_non_streaming_content() {
        let config = fast_config();
        let provider =
            ManagedProvider::new(ScriptedBackend::succeeding("Hello, world!"), &config);
        let response = provider.chat(request()).await.unwrap();

        let provider =
            ManagedProvider::new(ScriptedBackend::succeeding("Hello, world!"), &config);
        let mut stream = provider.chat_stream(request()).await.unwrap();

        let mut collected = String::new();
        let mut finish = None;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.unwrap();
            collected.push_str(&chunk.delta);
            if chunk.finish_reason.is_some() {
                finish = chunk.finish_reason;
            }
        }

        assert_eq!(collected, response.content);
        assert_eq!(finish, Some(FinishReason::Stop));

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 1);
        assert_eq!(metrics.success_count, 1);
    }

    #[tokio::test]
    async fn test_stream_establishment_retries() {
        let backend = ScriptedBackend::flaky(2, ProviderError::server_unavailable("503"), "ok");
        let provider = ManagedProvider::new(backend, &fast_config());

        let mut stream = provider.chat_stream(request()).await.unwrap();
        while stream.next().await.is_some() {}

        assert_eq!(provider.backend.attempts(), 3);

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 3);
        assert_eq!(metrics.success_count, 1);
        assert_eq!(metrics.error_count, 0);
    }

    #[tokio::test]
    async fn test_reset_metrics() {
        let provider = ManagedProvider::new(ScriptedBackend::succeeding("Hi!"), &fast_config());
        provider.chat(request()).await.unwrap();

        provider.reset_metrics();

        let metrics = provider.metrics();
        assert_eq!(metrics.request_count, 0);
        assert_eq!(metrics.success_count, 0);
        assert_eq!(metrics.error_count, 0);
        assert_eq!(metrics.total_tokens, 0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
    }
}
