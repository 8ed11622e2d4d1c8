use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use switchyard_core::errors::ProviderError;
use switchyard_core::provider::{Completion, CompletionOptions, CompletionProvider};

pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl OpenAiProvider {
    pub fn new(base_url: impl Into<String>, api_key: Option<SecretString>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }
}

pub(crate) fn build_body(prompt: &str, model: &str, options: &CompletionOptions) -> Value {
    let mut body = json!({
        "model": model,
        "messages": [{"role": "user", "content": prompt}],
    });
    if let Some(t) = options.temperature {
        body["temperature"] = json!(t);
    }
    if let Some(p) = options.top_p {
        body["top_p"] = json!(p);
    }
    if let Some(n) = options.max_tokens {
        body["max_tokens"] = json!(n);
    }
    match &options.output_format {
        Some(Value::String(s)) if s == "json" => {
            body["response_format"] = json!({"type": "json_object"});
        }
        Some(schema @ Value::Object(_)) => {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {"name": "output", "schema": schema},
            });
        }
        _ => {}
    }
    body
}

fn extract_text(raw: &Value) -> Result<String, ProviderError> {
    raw.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ProviderError::InvalidResponse("missing choices[0].message.content".into()))
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, prompt, options), fields(provider = "openai"))]
    async fn generate_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::AuthenticationFailed("OPENAI_API_KEY not set".into()))?;
        let model = model.unwrap_or(DEFAULT_MODEL);
        let url = format!("{}/chat/completions", self.base_url);
        debug!(%url, model, "openai chat completion");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(key.expose_secret())
            .json(&build_body(prompt, model, options))
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }
        let raw: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let text = extract_text(&raw)?;

        Ok(Completion {
            model: raw
                .get("model")
                .and_then(Value::as_str)
                .unwrap_or(model)
                .to_string(),
            text,
            raw,
        })
    }
}
