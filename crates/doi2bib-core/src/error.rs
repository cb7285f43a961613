use thiserror::Error;

/// All errors that can occur in doi2bib-core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Duplicate citation key: {0}")]
    DuplicateKey(String),

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("BibTeX syntax error at byte {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Exit codes used by the CLI.
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    AiError = 5,
    NetworkError = 6,
}

pub type Result<T> = std::result::Result<T, CoreError>;
