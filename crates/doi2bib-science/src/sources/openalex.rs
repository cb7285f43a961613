use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ScienceError};
use crate::http::{DiskCache, RateLimitedClient, Throttle};
use crate::identifiers::Doi;
use crate::sources::failures::FailureLog;

const BASE_URL: &str = "https://api.openalex.org";
const OPENALEX_PREFIX: &str = "https://openalex.org/";
const PER_PAGE: u32 = 200;
const ID_BATCH: usize = 50;

/// A failed request and the URL it was sent to.
type Failed = (String, ScienceError);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OpenAlexBiblio {
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub first_page: Option<String>,
    pub last_page: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OpenAlexWork {
    pub id: String,
    pub doi: Option<String>,
    pub title: Option<String>,
    pub publication_year: Option<i32>,
    pub biblio: OpenAlexBiblio,
    pub referenced_works: Vec<String>,
    pub cited_by_count: u32,
}

impl OpenAlexWork {
    /// `W123` from `https://openalex.org/W123`.
    pub fn short_id(&self) -> &str {
        self.id.strip_prefix(OPENALEX_PREFIX).unwrap_or(&self.id)
    }

    /// The work's DOI without the `https://doi.org/` prefix.
    pub fn doi(&self) -> Option<Doi> {
        self.doi.as_deref().and_then(|d| Doi::parse(d).ok())
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ListPage {
    meta: ListMeta,
    results: Vec<OpenAlexWork>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ListMeta {
    next_cursor: Option<String>,
}

/// Citation-graph client for the OpenAlex works API.
pub struct OpenAlexClient {
    client: RateLimitedClient,
    base_url: String,
    failures: Arc<FailureLog>,
    cache: Option<DiskCache>,
}

impl OpenAlexClient {
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
        self.base_url = base_url.into();
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

    /// Work record for a DOI, or `None` (recorded) on permanent failure.
    pub async fn fetch_metadata(&self, doi: &Doi) -> Option<OpenAlexWork> {
        match self.fetch_work(doi).await {
            Ok(work) => Some(work),
            Err((url, e)) => {
                self.record(&url, &e);
                None
            }
        }
    }

    /// DOIs of the works `doi` references.
    pub async fn fetch_referenced(&self, doi: &Doi) -> Vec<Doi> {
        let work = match self.fetch_work(doi).await {
            Ok(work) => work,
            Err((url, e)) => {
                self.record(&url, &e);
                return Vec::new();
            }
        };

        let ids = work
            .referenced_works
            .iter()
            .map(|id| id.strip_prefix(OPENALEX_PREFIX).unwrap_or(id))
            .collect::<Vec<_>>();
        debug!(%doi, references = ids.len(), "resolving referenced works");

        let mut dois = Vec::new();
        for batch in ids.chunks(ID_BATCH) {
            let filter = format!("openalex:{}", batch.join("|"));
            match self.list_all(&filter).await {
                Ok(works) => dois.extend(works.iter().filter_map(OpenAlexWork::doi)),
                Err((url, e)) => self.record(&url, &e),
            }
        }
        dois
    }

    /// DOIs of the works citing `doi`, following cursor pagination.
    pub async fn fetch_citing(&self, doi: &Doi) -> Vec<Doi> {
        let work = match self.fetch_work(doi).await {
            Ok(work) => work,
            Err((url, e)) => {
                self.record(&url, &e);
                return Vec::new();
            }
        };

        let filter = format!("cites:{}", work.short_id());
        match self.list_all(&filter).await {
            Ok(works) => works.iter().filter_map(OpenAlexWork::doi).collect(),
            Err((url, e)) => {
                self.record(&url, &e);
                Vec::new()
            }
        }
    }

    /// `dois` followed by every DOI they reference, without repeats.
    pub async fn expand_cited(&self, dois: &[Doi]) -> Vec<Doi> {
        let mut found = Vec::new();
        for doi in dois {
            found.extend(self.fetch_referenced(doi).await);
        }
        info!(inputs = dois.len(), discovered = found.len(), "expanded cited works");
        merge_unique(dois, found)
    }

    /// `dois` followed by every DOI citing them, without repeats.
    pub async fn expand_citing(&self, dois: &[Doi]) -> Vec<Doi> {
        let mut found = Vec::new();
        for doi in dois {
            found.extend(self.fetch_citing(doi).await);
        }
        info!(inputs = dois.len(), discovered = found.len(), "expanded citing works");
        merge_unique(dois, found)
    }

    // ─── Requests ─────────────────────────────────────────────────────────────

    async fn fetch_work(&self, doi: &Doi) -> std::result::Result<OpenAlexWork, Failed> {
        let cache_key = format!("work:{doi}");
        if let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<OpenAlexWork>(&cache_key).await
        {
            return Ok(cached);
        }

        let url = format!("{}/works/doi:{}", self.base_url.trim_end_matches('/'), doi.as_str());
        let work: OpenAlexWork = self
            .client
            .get_json(&url)
            .await
            .map_err(|e| (url.clone(), e))?;

        if let Some(cache) = &self.cache {
            cache.set(&cache_key, &work).await;
        }
        Ok(work)
    }

    async fn list_all(&self, filter: &str) -> std::result::Result<Vec<OpenAlexWork>, Failed> {
        let mut works = Vec::new();
        let mut cursor = "*".to_string();
        loop {
            let url = self
                .list_url(filter, &cursor)
                .map_err(|e| (self.base_url.clone(), e))?;
            let page: ListPage = self
                .client
                .get_json(url.as_str())
                .await
                .map_err(|e| (url.to_string(), e))?;

            let empty = page.results.is_empty();
            works.extend(page.results);
            match page.meta.next_cursor {
                Some(next) if !empty => cursor = next,
                _ => break,
            }
        }
        Ok(works)
    }

    fn list_url(&self, filter: &str, cursor: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ScienceError::Parse(format!("invalid URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ScienceError::Parse("invalid OpenAlex base URL".to_string()))?
            .pop_if_empty()
            .push("works");
        url.query_pairs_mut()
            .append_pair("filter", filter)
            .append_pair("select", "id,doi")
            .append_pair("per-page", &PER_PAGE.to_string())
            .append_pair("cursor", cursor);
        Ok(url)
    }

    fn record(&self, url: &str, error: &ScienceError) {
        let message = match error {
            ScienceError::NotFound(_) => "could not resolve with OpenAlex".to_string(),
            other => other.to_string(),
        };
        self.failures.record(url, message);
    }
}

fn merge_unique(inputs: &[Doi], found: Vec<Doi>) -> Vec<Doi> {
    let mut seen = HashSet::new();
    inputs
        .iter()
        .cloned()
        .chain(found)
        .filter(|doi| seen.insert(doi.clone()))
        .collect()
}
