use std::collections::BTreeMap;

use serde::Deserialize;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider sections keyed by registry id, passed through to the
    /// registry as raw values so custom providers can carry custom fields.
    #[serde(default)]
    pub providers: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl AppConfig {
    /// Load from `config/default` and `config/local` files (both optional)
    /// with `GATEWAY__`-prefixed environment overrides on top, e.g.
    /// `GATEWAY__PROVIDERS__QWEN__API_KEY`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("GATEWAY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Configured provider sections in stable id order.
    pub fn provider_configs(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.providers.iter().map(|(id, value)| (id.as_str(), value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.logging.level, "info");
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_provider_sections_deserialize() {
        let json = serde_json::json!({
            "logging": { "level": "debug", "format": "json" },
            "providers": {
                "qwen": { "api_key": "test-api-key-123", "default_model": "qwen3-32b" },
                "openai": { "api_key": "test-api-key-456" }
            }
        });

        let config: AppConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.logging.level, "debug");

        let ids: Vec<&str> = config.provider_configs().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["openai", "qwen"]);

        let (_, qwen) = config
            .provider_configs()
            .find(|(id, _)| *id == "qwen")
            .unwrap();
        assert_eq!(qwen["default_model"], "qwen3-32b");
    }
}
