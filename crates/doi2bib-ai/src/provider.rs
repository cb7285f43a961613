use async_trait::async_trait;
use tracing::warn;

use crate::error::Result;

/// A text-completion backend.
///
/// Implementors provide [`try_complete`](CompletionProvider::try_complete);
/// callers normally use [`complete`](CompletionProvider::complete), which
/// never fails: every error is logged and turned into `None`.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Provider name for logs, e.g. `ollama`.
    fn name(&self) -> &str;

    async fn try_complete(&self, prompt: &str) -> Result<String>;

    async fn complete(&self, prompt: &str) -> Option<String> {
        match self.try_complete(prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(provider = self.name(), error = %e, "completion failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AiError;

    struct Failing;

    #[async_trait]
    impl CompletionProvider for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn try_complete(&self, _prompt: &str) -> Result<String> {
            Err(AiError::MalformedResponse("failing".to_string()))
        }
    }

    #[tokio::test]
    async fn test_complete_maps_errors_to_none() {
        assert_eq!(Failing.complete("hi").await, None);
    }
}
