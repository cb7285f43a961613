use tracing::info;

use doi2bib_core::LlmConfig;

use crate::error::{AiError, Result};
use crate::groq::GroqProvider;
use crate::ollama::OllamaProvider;
use crate::provider::CompletionProvider;

/// Build the provider for a named model, or the configured default.
pub fn build_provider(
    config: &LlmConfig,
    model: Option<&str>,
) -> Result<Box<dyn CompletionProvider>> {
    let (name, model_config) = config.model(model)?;
    info!(model = name, provider = %model_config.provider, "using reasoning model");

    match model_config.provider.to_ascii_lowercase().as_str() {
        "ollama" => Ok(Box::new(OllamaProvider::from_config(model_config)?)),
        "groq" => Ok(Box::new(GroqProvider::from_config(model_config)?)),
        other => Err(AiError::UnknownProvider(other.to_string())),
    }
}
