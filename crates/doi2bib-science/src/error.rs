use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScienceError {
    #[error("invalid DOI: {0}")]
    InvalidDoi(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error from {0}: {1}")]
    ApiError(String, String),

    #[error("rate limit from {0}, retry after {1}s")]
    RateLimit(String, u64),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] doi2bib_core::CoreError),
}

pub type Result<T> = std::result::Result<T, ScienceError>;
