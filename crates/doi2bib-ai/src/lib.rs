//! Reasoning-service providers used by the duplicate oracle.

pub mod error;
pub mod groq;
pub mod ollama;
pub mod provider;
pub mod registry;

pub use error::{AiError, Result};
pub use groq::GroqProvider;
pub use ollama::OllamaProvider;
pub use provider::CompletionProvider;
pub use registry::build_provider;
