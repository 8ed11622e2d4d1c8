use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument};

use switchyard_core::errors::ProviderError;
use switchyard_core::provider::{Completion, CompletionOptions, CompletionProvider};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "mistral:latest";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Ollama `/api/generate` backend (non-streaming).
pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    response: String,
}

impl OllamaProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Request body for `/api/generate`.
pub(crate) fn build_body(prompt: &str, model: &str, options: &CompletionOptions) -> Value {
    let mut opts = Map::new();
    if let Some(t) = options.temperature {
        opts.insert("temperature".into(), json!(t));
    }
    if let Some(p) = options.top_p {
        opts.insert("top_p".into(), json!(p));
    }
    if let Some(n) = options.max_tokens {
        opts.insert("num_predict".into(), json!(n));
    }

    let mut body = json!({
        "model": model,
        "prompt": prompt,
        "stream": false,
    });
    if !opts.is_empty() {
        body["options"] = Value::Object(opts);
    }
    if let Some(format) = &options.output_format {
        body["format"] = format.clone();
    }
    body
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    #[instrument(skip(self, prompt, options), fields(provider = "ollama"))]
    async fn generate_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let body = build_body(prompt, model, options);
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model, "ollama generate");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(REQUEST_TIMEOUT)
                } else {
                    ProviderError::NetworkError(e.to_string())
                }
            })?;

        let status = resp.status();
        let raw: Value = if status.is_success() {
            resp.json()
                .await
                .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
        } else {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        };

        let parsed: GenerateResponse = serde_json::from_value(raw.clone())
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(Completion {
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            text: parsed.response,
            raw,
        })
    }
}
