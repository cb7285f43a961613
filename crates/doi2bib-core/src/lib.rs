pub mod bibtex;
pub mod config;
pub mod error;
pub mod models;
pub mod storage;

pub use config::{AppConfig, CleanConfig, DedupeConfig, FetchConfig, LlmConfig, ModelConfig};
pub use error::{CoreError, ExitCode, Result};
pub use models::*;
