use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ProviderType;

/// Per-instance call counters.
///
/// Owned exclusively by the provider instance that mutates it; callers only
/// ever see snapshots. Counters are monotonic until `reset`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub provider: ProviderType,
    pub model: String,
    /// Every attempt counts, including retries.
    pub request_count: u64,
    /// Terminal successes only.
    pub success_count: u64,
    /// Terminal failures only, one per logical call.
    pub error_count: u64,
    pub total_tokens: u64,
    /// Running average over successful calls, last-attempt latency only.
    pub avg_latency_ms: f64,
    pub last_updated: DateTime<Utc>,
}

impl ProviderMetrics {
    pub fn new(provider: ProviderType, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            request_count: 0,
            success_count: 0,
            error_count: 0,
            total_tokens: 0,
            avg_latency_ms: 0.0,
            last_updated: Utc::now(),
        }
    }

    pub fn record_attempt(&mut self) {
        self.request_count += 1;
        self.last_updated = Utc::now();
    }

    pub fn record_success(&mut self, latency_ms: u64, tokens: u64) {
        self.success_count += 1;
        self.avg_latency_ms = (self.avg_latency_ms * (self.success_count - 1) as f64
            + latency_ms as f64)
            / self.success_count as f64;
        self.total_tokens += tokens;
        self.last_updated = Utc::now();
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
        self.last_updated = Utc::now();
    }

    pub fn reset(&mut self) {
        let model = std::mem::take(&mut self.model);
        *self = Self::new(self.provider, model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let mut metrics = ProviderMetrics::new(ProviderType::OpenAi, "gpt-4o");
        metrics.record_attempt();
        metrics.record_success(100, 10);
        metrics.record_attempt();
        metrics.record_success(300, 20);

        assert_eq!(metrics.request_count, 2);
        assert_eq!(metrics.success_count, 2);
        assert_eq!(metrics.total_tokens, 30);
        assert!((metrics.avg_latency_ms - 200.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_reset_zeroes_counters() {
        let mut metrics = ProviderMetrics::new(ProviderType::Dify, "gpt-4o");
        metrics.record_attempt();
        metrics.record_success(50, 5);
        metrics.record_attempt();
        metrics.record_error();

        metrics.reset();

        assert_eq!(metrics.request_count, 0);
        assert_eq!(metrics.success_count, 0);
        assert_eq!(metrics.error_count, 0);
        assert_eq!(metrics.total_tokens, 0);
        assert_eq!(metrics.avg_latency_ms, 0.0);
        assert_eq!(metrics.model, "gpt-4o");
    }
}
