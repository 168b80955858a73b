use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use super::dify::{DifyConfig, DifyProvider};
use super::http_client::HttpClient;
use super::managed::ManagedProvider;
use super::openai::{OpenAiConfig, OpenAiProvider};
use super::qwen::{QwenConfig, QwenProvider};
use crate::domain::{ChatProvider, ProviderError};

type BuilderFn =
    dyn Fn(serde_json::Value) -> Result<Arc<dyn ChatProvider>, ProviderError> + Send + Sync;

/// Maps provider identifiers to constructor closures.
///
/// Registration is last-write-wins so callers can override a built-in with
/// their own implementation under the same id. Construction is synchronous;
/// no network traffic happens until the first chat call.
pub struct ProviderRegistry {
    builders: RwLock<HashMap<String, Box<BuilderFn>>>,
}

impl ProviderRegistry {
    /// An empty registry with no providers.
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }

    /// A registry preloaded with the built-in providers: `openai`, `dify`
    /// and `qwen`.
    pub fn with_builtins() -> Self {
        let registry = Self::new();

        registry.register("openai", |value| {
            let config: OpenAiConfig = parse_config(value)?;
            let client = HttpClient::with_timeout(config.base.timeout_duration())?;
            let backend = OpenAiProvider::new(client, config)?;
            let resolved = backend.config().clone();
            Ok(Arc::new(ManagedProvider::new(backend, &resolved)))
        });

        registry.register("dify", |value| {
            let config: DifyConfig = parse_config(value)?;
            let client = HttpClient::with_timeout(config.base.timeout_duration())?;
            let backend = DifyProvider::new(client, config)?;
            let resolved = backend.config().clone();
            Ok(Arc::new(ManagedProvider::new(backend, &resolved)))
        });

        registry.register("qwen", |value| {
            let config: QwenConfig = parse_config(value)?;
            let client = HttpClient::with_timeout(config.base.timeout_duration())?;
            let backend = QwenProvider::new(client, config)?;
            let resolved = backend.config().clone();
            Ok(Arc::new(ManagedProvider::new(backend, &resolved)))
        });

        registry
    }

    /// Register a builder under an identifier, replacing any existing one.
    pub fn register<F>(&self, id: impl Into<String>, builder: F)
    where
        F: Fn(serde_json::Value) -> Result<Arc<dyn ChatProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        let id = id.into();
        debug!(provider = %id, "registering provider builder");
        self.builders.write().unwrap().insert(id, Box::new(builder));
    }

    /// Build a provider from its identifier and a raw configuration value.
    pub fn create_provider(
        &self,
        id: &str,
        config: serde_json::Value,
    ) -> Result<Arc<dyn ChatProvider>, ProviderError> {
        let builders = self.builders.read().unwrap();
        let builder = builders
            .get(id)
            .ok_or_else(|| ProviderError::unknown_provider(id))?;

        let provider = builder(config)?;
        info!(provider = %id, "provider created");
        Ok(provider)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.builders.read().unwrap().contains_key(id)
    }

    /// Identifiers of all registered providers, sorted for stable output.
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.builders.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(
    value: serde_json::Value,
) -> Result<T, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::configuration(format!("invalid provider config: {}", e)))
}
