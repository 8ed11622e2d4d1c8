use switchyard_core::errors::ProviderError;

pub const DEFAULT_COMPLETION_MODEL: &str = "ollama:mistral:latest";

/// A `provider:model` id split at its first colon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelId<'a> {
    pub provider: &'a str,
    pub model: &'a str,
}

/// Split a `provider:model` id. Everything after the first colon is the
/// model name, so `ollama:mistral:latest` keeps its tag.
pub fn split_model(id: &str) -> Result<ModelId<'_>, ProviderError> {
    match id.split_once(':') {
        Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
            Ok(ModelId { provider, model })
        }
        _ => Err(ProviderError::InvalidModelId(id.to_string())),
    }
}
