pub mod models;
pub mod ollama;
pub mod openai;
pub mod registry;

pub mod mock;

pub use mock::{MockProvider, MockResponse};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
