use std::sync::Arc;

use tracing::{info, warn};

use crate::clean::JournalAbbreviations;
use crate::error::Result;
use crate::http::{DiskCache, RateLimitedClient, Throttle};

/// Downloads a journal abbreviation list (JabRef CSV) and keeps the parsed
/// list in the disk cache.
pub struct JournalListClient {
    client: RateLimitedClient,
    cache: Option<DiskCache>,
}

impl JournalListClient {
    pub fn new(throttle: Arc<Throttle>, max_retries: u32, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(throttle, max_retries, user_agent)?,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: DiskCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The list at `url`, from the cache unless `refresh` is set. An empty
    /// download is returned but not cached.
    pub async fn load(&self, url: &str, refresh: bool) -> Result<JournalAbbreviations> {
        let cache_key = format!("journals:{url}");
        if !refresh
            && let Some(cache) = &self.cache
            && let Some(cached) = cache.get::<JournalAbbreviations>(&cache_key).await
        {
            info!(url, journals = cached.len(), "journal list from cache");
            return Ok(cached);
        }

        let body = self.client.get(url).await?;
        let journals = JournalAbbreviations::from_csv(&body)?;
        if journals.is_empty() {
            warn!(url, "journal list is empty");
        } else if let Some(cache) = &self.cache {
            cache.set(&cache_key, &journals).await;
        }
        info!(url, journals = journals.len(), "journal list downloaded");
        Ok(journals)
    }
}
