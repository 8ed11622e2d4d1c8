use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use switchyard_core::errors::ProviderError;
use switchyard_core::provider::{Completion, CompletionOptions, CompletionProvider};

use crate::models::{split_model, DEFAULT_COMPLETION_MODEL};

/// Routes `provider:model` ids to the backend registered under `provider`.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn CompletionProvider>>,
    default_model: String,
}

impl ProviderRegistry {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_model: default_model.into(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn CompletionProvider>) -> Self {
        self.register(provider);
        self
    }

    /// Adds a backend under its `name()`. A later registration replaces an earlier one.
    pub fn register(&mut self, provider: Arc<dyn CompletionProvider>) {
        let name = provider.name().to_string();
        if self.providers.insert(name.clone(), provider).is_some() {
            warn!(provider = %name, "replaced completion provider");
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn provider_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_MODEL)
    }
}

#[async_trait]
impl CompletionProvider for ProviderRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let id = model.unwrap_or(&self.default_model);
        let parsed = split_model(id)?;
        let backend = self
            .providers
            .get(parsed.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(parsed.provider.to_string()))?;
        debug!(provider = parsed.provider, model = parsed.model, "routing completion");
        backend
            .generate_completion(prompt, Some(parsed.model), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockProvider, MockResponse};

    #[tokio::test]
    async fn routes_by_prefix() {
        let ollama = Arc::new(MockProvider::named("ollama", vec![MockResponse::text("from ollama")]));
        let openai = Arc::new(MockProvider::named("openai", vec![MockResponse::text("from openai")]));
        let reg = ProviderRegistry::default()
            .with_provider(ollama.clone())
            .with_provider(openai.clone());

        let out = reg
            .generate_completion("hi", Some("openai:gpt-4o"), &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(out.text, "from openai");
        assert_eq!(openai.last_model().as_deref(), Some("gpt-4o"));
        assert_eq!(ollama.call_count(), 0);
    }

    #[tokio::test]
    async fn uses_default_model() {
        let ollama = Arc::new(MockProvider::named("ollama", vec![MockResponse::text("ok")]));
        let reg = ProviderRegistry::default().with_provider(ollama.clone());
        reg.generate_completion("hi", None, &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(ollama.last_model().as_deref(), Some("mistral:latest"));
    }

    #[tokio::test]
    async fn unknown_provider() {
        let reg = ProviderRegistry::default();
        let err = reg
            .generate_completion("hi", Some("acme:x"), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(ref p) if p == "acme"));
    }

    #[tokio::test]
    async fn malformed_model_id() {
        let reg = ProviderRegistry::default();
        let err = reg
            .generate_completion("hi", Some("mistral"), &CompletionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidModelId(_)));
    }

    #[test]
    fn provider_names_sorted() {
        let reg = ProviderRegistry::new("openai:gpt-4o")
            .with_provider(Arc::new(MockProvider::named("openai", vec![])))
            .with_provider(Arc::new(MockProvider::named("ollama", vec![])));
        assert_eq!(reg.provider_names(), vec!["ollama", "openai"]);
        assert_eq!(reg.default_model(), "openai:gpt-4o");
    }
}
