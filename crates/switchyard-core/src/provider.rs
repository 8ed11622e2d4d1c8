use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

/// Options controlling completion generation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Provider-specific output format hint (`"json"` or a JSON schema).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_format: Option<serde_json::Value>,
}

/// Parameters accepted by the `ai/completion` method.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub options: CompletionOptions,
}

/// A finished (non-streamed) completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub model: String,
    pub text: String,
    /// Untouched provider response body.
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Text completion collaborator used by `ai/completion`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// `model` is whatever the implementation routes on (a `provider:model`
    /// id for a registry, a bare model name for a backend). `None` selects
    /// the default.
    async fn generate_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError>;
}
