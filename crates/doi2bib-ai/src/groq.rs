use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use doi2bib_core::ModelConfig;

use crate::error::{AiError, Result};
use crate::provider::CompletionProvider;

pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Groq's OpenAI-compatible chat completion API.
pub struct GroqProvider {
    client: Client,
    url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl GroqProvider {
    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key: api_key.into(),
            temperature: 0.7,
            max_tokens: 1024,
        })
    }

    /// Build from a model config, reading the key from `api_key_env`
    /// (`GROQ_API_KEY` when unset). An empty `url` means the public endpoint.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let env = config.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
        let api_key = std::env::var(env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AiError::MissingApiKey(env.to_string()))?;
        let url = if config.url.is_empty() {
            GROQ_CHAT_URL
        } else {
            config.url.as_str()
        };

        let mut provider = Self::new(
            url,
            &config.model_name,
            api_key,
            Duration::from_secs(config.timeout_secs),
        )?;
        if let Some(temperature) = config.temperature {
            provider.temperature = temperature;
        }
        if let Some(max_tokens) = config.max_tokens {
            provider.max_tokens = max_tokens;
        }
        Ok(provider)
    }
}

#[async_trait]
impl CompletionProvider for GroqProvider {
    fn name(&self) -> &str {
        "groq"
    }

    async fn try_complete(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };
        debug!(model = %self.model, "groq request");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AiError::ApiError("groq".to_string(), status.as_u16()));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|_| AiError::MalformedResponse("groq".to_string()))?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AiError::MalformedResponse("groq".to_string()))
    }
}
