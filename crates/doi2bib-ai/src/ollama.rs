use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use doi2bib_core::ModelConfig;

use crate::error::{AiError, Result};
use crate::provider::CompletionProvider;

/// Ollama `/api/generate` endpoint, non-streaming.
pub struct OllamaProvider {
    client: Client,
    url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
        })
    }

    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        Self::new(
            &config.url,
            &config.model_name,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl CompletionProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn try_complete(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        debug!(url = %self.url, model = %self.model, "ollama request");

        let response = self.client.post(&self.url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::ApiError(self.url.clone(), status.as_u16()));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|_| AiError::MalformedResponse(self.url.clone()))?;
        Ok(body.response)
    }
}
