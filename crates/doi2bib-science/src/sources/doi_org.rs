use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use doi2bib_core::Entry;
use doi2bib_core::bibtex::parse_single;

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, Throttle};
use crate::identifiers::Doi;
use crate::sources::failures::FailureLog;

const BASE_URL: &str = "https://doi.org";
const ACCEPT_BIBTEX: &str = "application/x-bibtex";
const ACCEPT_CSL_JSON: &str = "application/vnd.citationstyles.csl+json";

/// Page numbers hidden in DOI suffixes, tried in order.
static PAGE_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"^\d+\.\d+/\D+\.20(\d+)$").unwrap(),
        Regex::new(r"^\d+\.\d+/\D+(\d+)$").unwrap(),
        Regex::new(r"^\d+\.\d+/\D+\.\d+\.(\d+)$").unwrap(),
    ]
});

/// Resolves DOIs to BibTeX through doi.org content negotiation.
pub struct DoiOrgClient {
    client: RateLimitedClient,
    base_url: String,
    failures: Arc<FailureLog>,
    cache: Option<DiskCache>,
}

impl DoiOrgClient {
    pub fn new(
        throttle: Arc<Throttle>,
        max_retries: u32,
        user_agent: &str,
        failures: Arc<FailureLog>,
    ) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(throttle, max_retries, user_agent)?,
            base_url: BASE_URL.to_string(),
            failures,
            cache: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.client = self.client.with_backoff_base(base);
        self
    }

    fn url(&self, doi: &Doi) -> String {
        format!("{}/{}", self.base_url, doi.as_str())
    }

    /// Raw BibTeX for a DOI. Permanent failures are recorded and yield `None`.
    pub async fn fetch_bibtex(&self, doi: &Doi) -> Option<String> {
        let cache_key = format!("bibtex:{doi}");
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<String>(&cache_key).await
        {
            return Some(cached);
        }

        let url = self.url(doi);
        match self.client.get_accepting(&url, ACCEPT_BIBTEX).await {
            Ok(body) if body.trim_start().starts_with('@') => {
                if let Some(cache) = &self.cache {
                    cache.set(&cache_key, &body).await;
                }
                Some(body)
            }
            Ok(_) => {
                self.failures.record(&url, "response is not BibTeX");
                None
            }
            Err(ScienceError::NotFound(_)) => {
                self.failures.record(&url, format!("could not resolve {doi}"));
                None
            }
            Err(e) => {
                self.failures.record(&url, e.to_string());
                None
            }
        }
    }

    /// CSL-JSON record for a DOI. Failures here are not fatal and not recorded.
    pub async fn fetch_csl(&self, doi: &Doi) -> Option<Value> {
        let url = self.url(doi);
        match self.client.get_accepting(&url, ACCEPT_CSL_JSON).await {
            Ok(body) => serde_json::from_str(&body)
                .inspect_err(|e| debug!(%url, error = %e, "CSL-JSON did not parse"))
                .ok(),
            Err(e) => {
                debug!(%url, error = %e, "no CSL-JSON record");
                None
            }
        }
    }

    /// Fetch and parse the entry for a DOI, filling in `pages` when the
    /// registry record lacks it.
    pub async fn resolve(&self, doi: &Doi) -> Option<Entry> {
        let bibtex = self.fetch_bibtex(doi).await?;
        let mut entry = match parse_single(&bibtex) {
            Ok(entry) => entry,
            Err(e) => {
                self.failures
                    .record(self.url(doi), format!("unparseable BibTeX: {e}"));
                return None;
            }
        };

        if entry.non_empty("doi").is_none() {
            entry.set("doi", doi.as_str());
        }

        if entry.non_empty("pages").is_none()
            && let Some(page) = self.find_pages(doi).await
        {
            entry.set("pages", &page);
        }

        Some(entry)
    }

    /// Page number or article number from the CSL-JSON record, falling back
    /// to a guess from the DOI suffix.
    pub async fn find_pages(&self, doi: &Doi) -> Option<String> {
        info!(%doi, "looking up page number");
        let page = match self.fetch_csl(doi).await {
            Some(csl) => page_from_csl(&csl),
            None => None,
        }
        .or_else(|| guess_pages(doi.as_str()));
        if page.is_none() {
            warn!(%doi, "no page number found");
        }
        page
    }
}

/// `article-number`, then `page`, from a CSL-JSON record.
pub fn page_from_csl(csl: &Value) -> Option<String> {
    ["article-number", "page"].iter().find_map(|key| {
        let value = csl.get(*key)?;
        let text = match value {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        (!text.is_empty()).then_some(text)
    })
}

/// Best-effort page number from the DOI suffix, e.g. `10.1103/PhysRevB.2020123`.
pub fn guess_pages(doi: &str) -> Option<String> {
    let page = PAGE_PATTERNS
        .iter()
        .find_map(|re| re.captures(doi)?.get(1).map(|m| m.as_str().to_string()))?;
    info!(doi, page = %page, "guessed page number from DOI");
    Some(page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use serde_json::json;

    fn client(server: &Server, failures: Arc<FailureLog>) -> DoiOrgClient {
        DoiOrgClient::new(Arc::new(Throttle::unlimited()), 0, "doi2bib-test", failures)
            .unwrap()
            .with_base_url(server.url())
    }

    #[test]
    fn guesses_pages_from_doi_suffix() {
        assert_eq!(guess_pages("10.1021/acs.jpcc.2012345").as_deref(), Some("12345"));
        assert_eq!(guess_pages("10.1103/physrevb.95").as_deref(), Some("95"));
        assert_eq!(guess_pages("10.1038/s41586-021-03819-2"), None);
    }

    #[test]
    fn page_from_csl_prefers_article_number() {
        assert_eq!(
            page_from_csl(&json!({"article-number": "e123", "page": "1-5"})).as_deref(),
            Some("e123")
        );
        assert_eq!(page_from_csl(&json!({"page": "1-5"})).as_deref(), Some("1-5"));
        assert_eq!(page_from_csl(&json!({"page": ""})), None);
    }

    #[tokio::test]
    async fn resolve_fetches_bibtex_and_keeps_pages() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1/x")
            .match_header("accept", ACCEPT_BIBTEX)
            .with_status(200)
            .with_body(" @article{Smith_2020, title={T}, journal={Nature}, volume={1}, pages={1--10}, doi={10.1/x}}")
            .create_async()
            .await;

        let failures = Arc::new(FailureLog::new());
        let doi = Doi::parse("10.1/x").unwrap();
        let entry = client(&server, failures.clone()).resolve(&doi).await.unwrap();
        assert_eq!(entry.key, "Smith_2020");
        assert_eq!(entry.value("pages"), Some("1--10"));
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn resolve_fills_missing_pages_from_csl() {
        let mut server = Server::new_async().await;
        let _bib = server
            .mock("GET", "/10.1/y")
            .match_header("accept", ACCEPT_BIBTEX)
            .with_status(200)
            .with_body("@article{k, title={T}}")
            .create_async()
            .await;
        let _csl = server
            .mock("GET", "/10.1/y")
            .match_header("accept", ACCEPT_CSL_JSON)
            .with_status(200)
            .with_body(r#"{"article-number": "042"}"#)
            .create_async()
            .await;

        let doi = Doi::parse("10.1/y").unwrap();
        let entry = client(&server, Arc::new(FailureLog::new()))
            .resolve(&doi)
            .await
            .unwrap();
        assert_eq!(entry.value("pages"), Some("042"));
        assert_eq!(entry.value("doi"), Some("10.1/y"));
    }

    #[tokio::test]
    async fn find_pages_falls_back_to_doi_suffix() {
        let mut server = Server::new_async().await;
        let _csl = server
            .mock("GET", "/10.1021/acs.jpcc.2012345")
            .with_status(404)
            .create_async()
            .await;

        let doi = Doi::parse("10.1021/acs.jpcc.2012345").unwrap();
        let failures = Arc::new(FailureLog::new());
        let page = client(&server, failures.clone()).find_pages(&doi).await;
        assert_eq!(page.as_deref(), Some("12345"));
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn unresolvable_doi_is_recorded() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1/missing")
            .with_status(404)
            .create_async()
            .await;

        let failures = Arc::new(FailureLog::new());
        let doi = Doi::parse("10.1/missing").unwrap();
        assert!(client(&server, failures.clone()).resolve(&doi).await.is_none());
        let entries = failures.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("could not resolve"));
    }

    #[tokio::test]
    async fn html_response_is_not_bibtex() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/10.1/html")
            .with_status(200)
            .with_body("<html>landing page</html>")
            .create_async()
            .await;

        let failures = Arc::new(FailureLog::new());
        let doi = Doi::parse("10.1/html").unwrap();
        assert!(client(&server, failures.clone()).fetch_bibtex(&doi).await.is_none());
        assert_eq!(failures.len(), 1);
    }
}
