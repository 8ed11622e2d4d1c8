use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use switchyard_core::errors::ProviderError;
use switchyard_core::provider::{Completion, CompletionOptions, CompletionProvider};

/// Pre-programmed responses for deterministic testing without API calls.
pub enum MockResponse {
    Text(String),
    Error(ProviderError),
    /// Wait a duration, then yield the inner response.
    Delay(Duration, Box<MockResponse>),
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self::Text(text.to_string())
    }

    pub fn delayed(delay: Duration, inner: MockResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

/// Mock provider that returns pre-programmed responses in sequence.
///
/// Once the script is exhausted it either echoes the prompt (see
/// [`MockProvider::echo`]) or fails with `InvalidRequest`.
pub struct MockProvider {
    name: String,
    responses: Mutex<VecDeque<MockResponse>>,
    echo_when_empty: bool,
    call_count: AtomicUsize,
    last_model: Mutex<Option<String>>,
}

impl MockProvider {
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self::named("mock", responses)
    }

    pub fn named(name: &str, responses: Vec<MockResponse>) -> Self {
        Self {
            name: name.to_string(),
            responses: Mutex::new(responses.into()),
            echo_when_empty: false,
            call_count: AtomicUsize::new(0),
            last_model: Mutex::new(None),
        }
    }

    /// Answers every prompt with `echo: <prompt>`.
    pub fn echo() -> Self {
        Self {
            echo_when_empty: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_completion(
        &self,
        prompt: &str,
        model: Option<&str>,
        _options: &CompletionOptions,
    ) -> Result<Completion, ProviderError> {
        let idx = self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_model.lock() = model.map(str::to_string);
        let model = model.unwrap_or("mock-model").to_string();

        let next = self.responses.lock().pop_front();
        let mut current = match next {
            Some(r) => r,
            None if self.echo_when_empty => MockResponse::Text(format!("echo: {prompt}")),
            None => {
                return Err(ProviderError::InvalidRequest(format!(
                    "MockProvider: no response configured for call {idx}"
                )))
            }
        };

        loop {
            match current {
                MockResponse::Text(text) => {
                    return Ok(Completion {
                        model,
                        raw: serde_json::json!({"response": text}),
                        text,
                    })
                }
                MockResponse::Error(e) => return Err(e),
                MockResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
