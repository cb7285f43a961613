use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use doi2bib_ai::CompletionProvider;
use doi2bib_core::Entry;

use crate::dedup::semantic::SimilarityOracle;
use crate::http::Throttle;

const PROBE_PROMPT: &str = "Reply with the single word OK.";

/// A [`SimilarityOracle`] backed by a reasoning model.
pub struct LlmOracle {
    provider: Box<dyn CompletionProvider>,
    throttle: Arc<Throttle>,
}

impl LlmOracle {
    pub fn new(provider: Box<dyn CompletionProvider>, throttle: Arc<Throttle>) -> Self {
        Self { provider, throttle }
    }

    async fn ask(&self, prompt: &str) -> Option<String> {
        self.throttle.wait().await;
        self.provider.complete(prompt).await
    }
}

#[async_trait]
impl SimilarityOracle for LlmOracle {
    async fn is_available(&self) -> bool {
        match self.ask(PROBE_PROMPT).await {
            Some(reply) if !reply.trim().is_empty() => true,
            _ => {
                warn!(provider = self.provider.name(), "reasoning service did not answer the availability check");
                false
            }
        }
    }

    async fn verdict(&self, a: &Entry, b: &Entry) -> bool {
        let prompt = duplicate_prompt(a, b);
        let reply = self.ask(&prompt).await;
        debug!(a = %a.key, b = %b.key, reply = ?reply, "oracle reply");
        reply.as_deref().is_some_and(parse_verdict)
    }
}

/// Plain-text rendering: type and key, then one `name = value` line per field.
pub fn render_entry(entry: &Entry) -> String {
    let mut out = format!("type: {}\nkey: {}\n", entry.entry_type, entry.key);
    for field in &entry.fields {
        out.push_str(&format!("{} = {}\n", field.name, field.value));
    }
    out
}

pub fn duplicate_prompt(a: &Entry, b: &Entry) -> String {
    format!(
        "Do the following two bibliography entries describe the same publication? \
         Answer with a single word, YES or NO.\n\n\
         Entry 1:\n{}\nEntry 2:\n{}",
        render_entry(a),
        render_entry(b)
    )
}

/// Fail closed: only a reply whose first word is "yes" counts.
pub fn parse_verdict(reply: &str) -> bool {
    reply
        .split_whitespace()
        .next()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()))
        .is_some_and(|word| word.eq_ignore_ascii_case("yes"))
}
