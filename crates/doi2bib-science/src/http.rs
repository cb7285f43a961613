use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use doi2bib_core::AppConfig;

use crate::error::{Result, ScienceError};

const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// ─── Throttle ─────────────────────────────────────────────────────────────────

/// Minimum-interval gate shared by every caller of one remote service.
///
/// Built once per run and handed out as `Arc<Throttle>`; concurrent callers
/// queue on the inner lock, so calls are spaced at least `min_interval` apart.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// At most `calls` calls per second. Zero disables throttling.
    pub fn per_second(calls: u32) -> Self {
        if calls == 0 {
            return Self::unlimited();
        }
        Self::new(Duration::from_secs(1) / calls)
    }

    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

// ─── RateLimitedClient ────────────────────────────────────────────────────────

pub struct RateLimitedClient {
    client: reqwest::Client,
    throttle: Arc<Throttle>,
    max_retries: u32,
    backoff_base: Duration,
}

impl RateLimitedClient {
    pub fn new(throttle: Arc<Throttle>, max_retries: u32, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            throttle,
            max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// First retry delay; doubles on every further attempt.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    /// GET with a single `Accept` header, used for DOI content negotiation.
    pub async fn get_accepting(&self, url: &str, accept: &'static str) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        self.get_with_headers(url, headers).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let response = self
            .execute(url, || self.client.get(url).headers(headers.clone()))
            .await?;
        response.text().await.map_err(ScienceError::Http)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let text = self.get(url).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    pub async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R> {
        self.post_json_with_headers(url, body, HeaderMap::new())
            .await
    }

    pub async fn post_json_with_headers<B: Serialize, R: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
        headers: HeaderMap,
    ) -> Result<R> {
        let response = self
            .execute(url, || {
                self.client.post(url).headers(headers.clone()).json(body)
            })
            .await?;
        let text = response.text().await.map_err(ScienceError::Http)?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    /// Send with throttling and retries.
    ///
    /// 429 waits for `Retry-After`; 5xx and transport errors back off
    /// exponentially. 404 and other 4xx are permanent and returned at once.
    async fn execute<F>(&self, url: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            self.throttle.wait().await;
            debug!(url, attempt, "sending request");

            match build().send().await {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    let wait = r
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.trim().parse::<u64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    if attempt >= self.max_retries {
                        return Err(ScienceError::RateLimit(url.to_string(), wait));
                    }
                    warn!(url, wait, "rate limited");
                    sleep(Duration::from_secs(wait)).await;
                }
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(ScienceError::NotFound(url.to_string()));
                }
                Ok(r) if r.status().is_server_error() && attempt < self.max_retries => {
                    let backoff = self.backoff(attempt);
                    warn!(url, status = r.status().as_u16(), ?backoff, "server error, retrying");
                    sleep(backoff).await;
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => return Ok(r),
                Err(e) if e.is_builder() || attempt >= self.max_retries => {
                    return Err(ScienceError::Http(e));
                }
                Err(e) => {
                    let backoff = self.backoff(attempt);
                    warn!(url, error = %e, ?backoff, "transport error, retrying");
                    sleep(backoff).await;
                }
            }
            attempt += 1;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(attempt)
    }
}

// ─── DiskCache ────────────────────────────────────────────────────────────────

pub struct DiskCache {
    dir: PathBuf,
    ttl: Duration,
}

fn cache_key_to_path(dir: &Path, key: &str) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let hash = hasher.finish();
    dir.join(format!("{hash:016x}.json"))
}

#[derive(Serialize, serde::Deserialize)]
struct CacheEntry<T> {
    stored_at: u64, // Unix timestamp secs
    value: T,
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl DiskCache {
    /// Cache under `<cache_dir>/doi2bib/<namespace>`.
    pub fn new(namespace: &str, ttl: Duration) -> Self {
        Self::in_dir(AppConfig::cache_dir().join(namespace), ttl)
    }

    pub fn in_dir(dir: PathBuf, ttl: Duration) -> Self {
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create cache directory");
        }
        Self { dir, ttl }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = cache_key_to_path(&self.dir, key);
        let data = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry<T> = serde_json::from_slice(&data).ok()?;
        if now_secs().saturating_sub(entry.stored_at) > self.ttl.as_secs() {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        debug!(key, "cache hit");
        Some(entry.value)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T) {
        let path = cache_key_to_path(&self.dir, key);
        let entry = CacheEntry {
            stored_at: now_secs(),
            value,
        };
        if let Ok(data) = serde_json::to_vec(&entry) {
            let _ = tokio::fs::write(&path, data).await;
        }
    }
}
