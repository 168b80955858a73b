use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::ProviderError;

fn default_timeout() -> f64 {
    30.0
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> f64 {
    1.0
}

/// Configuration fields shared by every provider.
///
/// Validated eagerly at construction; an invalid config never reaches the
/// network. Provider-specific config structs flatten this one and add their
/// own fields.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProviderConfig {
    #[validate(length(min = 10, message = "api_key is missing or too short"))]
    pub api_key: String,

    /// Base URL of the wire API; each provider supplies its own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Model used when a request leaves `model` empty.
    #[serde(default)]
    pub default_model: String,

    /// Per-attempt timeout in seconds. Bounds each individual attempt, not
    /// the whole retry sequence.
    #[serde(default = "default_timeout")]
    #[validate(range(min = 1.0, max = 300.0))]
    pub timeout: f64,

    #[serde(default = "default_max_retries")]
    #[validate(range(max = 10))]
    pub max_retries: u32,

    /// Base wait between retries in seconds; a larger provider-supplied
    /// `retry_after` hint wins.
    #[serde(default = "default_retry_delay")]
    #[validate(range(min = 0.1, max = 10.0))]
    pub retry_delay: f64,
}

impl ProviderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            default_model: String::new(),
            timeout: default_timeout(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn timeout_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.timeout)
    }

    pub fn retry_delay_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.retry_delay)
    }
}

/// Run the schema rules of a config struct, normalizing failures to a
/// configuration error.
pub fn validate_config<T: Validate>(config: &T) -> Result<(), ProviderError> {
    config
        .validate()
        .map_err(|e| ProviderError::configuration(format!("invalid provider config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::new("test-api-key-123");
        assert_eq!(config.timeout, 30.0);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, 1.0);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_short_api_key_rejected() {
        let config = ProviderConfig::new("short");
        let error = validate_config(&config).unwrap_err();
        assert!(matches!(error, ProviderError::Configuration { .. }));

        let config = ProviderConfig::new("");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = ProviderConfig::new("test-api-key-123");
        config.timeout = 0.0;
        assert!(validate_config(&config).is_err());

        config.timeout = 301.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_deserialization_fills_defaults() {
        let config: ProviderConfig =
            serde_json::from_value(serde_json::json!({ "api_key": "test-api-key-123" })).unwrap();
        assert_eq!(config.max_retries, 3);
        assert!(config.base_url.is_none());
    }
}
