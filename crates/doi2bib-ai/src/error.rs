use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("unknown provider '{0}' (expected 'ollama' or 'groq')")]
    UnknownProvider(String),

    #[error("model error: {0}")]
    Model(#[from] doi2bib_core::CoreError),

    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: status {1}")]
    ApiError(String, u16),

    #[error("malformed response from {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, AiError>;
