use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Anything that can hand back the raw bytes of a feed document.
pub trait FeedSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>>> + Send;
}

pub struct FeedFetcher {
    client: Client,
    timeout: Duration,
    cache: Option<FeedCache>,
}

impl FeedFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let cache = (config.cache_ttl_secs > 0)
            .then(|| FeedCache::new(PathBuf::from(&config.cache_dir), config.cache_ttl()));

        Ok(Self {
            client,
            timeout: config.fetch_timeout(),
            cache,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let request = async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| AppError::fetch(url, e))?;

            if !response.status().is_success() {
                return Err(AppError::fetch(url, format!("HTTP {}", response.status())));
            }

            let bytes = response.bytes().await.map_err(|e| AppError::fetch(url, e))?;
            Ok(bytes.to_vec())
        };

        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AppError::fetch(url, format!("timed out after {:?}", self.timeout)))?
    }
}

impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        if let Some(cache) = &self.cache {
            if let Some(bytes) = cache.get(url, Utc::now()).await {
                tracing::debug!("Serving {} from feed cache", url);
                return Ok(bytes);
            }
        }

        let bytes = self.download(url).await?;
        tracing::debug!("Fetched {} bytes from {}", bytes.len(), url);

        if let Some(cache) = &self.cache {
            if let Err(e) = cache.put(url, &bytes, Utc::now()).await {
                tracing::warn!("Failed to cache feed {}: {}", url, e);
            }
        }

        Ok(bytes)
    }
}

/// Stable file stem for a feed URL.
fn cache_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    fetched_at: DateTime<Utc>,
}

/// Feed documents on disk, keyed by URL, valid for `ttl` after download.
pub struct FeedCache {
    dir: PathBuf,
    ttl: Duration,
}

impl FeedCache {
    pub fn new(dir: PathBuf, ttl: Duration) -> Self {
        Self { dir, ttl }
    }

    fn paths(&self, url: &str) -> (PathBuf, PathBuf) {
        let key = cache_key(url);
        (
            self.dir.join(format!("{key}.json")),
            self.dir.join(format!("{key}.xml")),
        )
    }

    pub async fn get(&self, url: &str, now: DateTime<Utc>) -> Option<Vec<u8>> {
        let (meta_path, body_path) = self.paths(url);

        let meta = tokio::fs::read(&meta_path).await.ok()?;
        let entry: CacheEntry = serde_json::from_slice(&meta).ok()?;
        if entry.url != url {
            return None;
        }

        let age = now.signed_duration_since(entry.fetched_at).to_std().ok()?;
        if age >= self.ttl {
            return None;
        }

        tokio::fs::read(&body_path).await.ok()
    }

    pub async fn put(&self, url: &str, bytes: &[u8], now: DateTime<Utc>) -> Result<()> {
        let (meta_path, body_path) = self.paths(url);
        tokio::fs::create_dir_all(&self.dir).await?;

        let entry = CacheEntry {
            url: url.to_string(),
            fetched_at: now,
        };
        tokio::fs::write(&body_path, bytes).await?;
        tokio::fs::write(&meta_path, serde_json::to_vec(&entry)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://feeds.example.com/show.xml";

    #[tokio::test]
    async fn fresh_entries_are_served() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let now = Utc::now();

        cache.put(URL, b"<rss/>", now).await.unwrap();

        let later = now + chrono::Duration::minutes(59);
        assert_eq!(cache.get(URL, later).await.as_deref(), Some(&b"<rss/>"[..]));
    }

    #[tokio::test]
    async fn stale_entries_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let now = Utc::now();

        cache.put(URL, b"<rss/>", now).await.unwrap();

        let later = now + chrono::Duration::minutes(61);
        assert_eq!(cache.get(URL, later).await, None);
    }

    #[test]
    fn cache_keys_are_stable_sha256_digests() {
        assert_eq!(
            cache_key(URL),
            "42affc5fdf78beb1ff86b53012c30d588d1329537358e972f717eceb65b4eeb2"
        );
        assert_ne!(cache_key(URL), cache_key("https://feeds.example.com/other.xml"));
    }

    // Nothing listens on the discard port, so any download attempt fails.
    const OFFLINE_URL: &str = "http://127.0.0.1:9/show.xml";

    fn offline_fetcher(cache_dir: &std::path::Path) -> FeedFetcher {
        let config = Config {
            cache_dir: cache_dir.to_string_lossy().to_string(),
            connect_timeout_secs: 2,
            fetch_timeout_secs: 2,
            ..Config::default()
        };
        FeedFetcher::new(&config).unwrap()
    }

    #[tokio::test]
    async fn fetcher_serves_fresh_cache_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        cache.put(OFFLINE_URL, b"<rss/>", Utc::now()).await.unwrap();

        let fetcher = offline_fetcher(dir.path());
        assert_eq!(fetcher.fetch(OFFLINE_URL).await.unwrap(), b"<rss/>".to_vec());
    }

    #[tokio::test]
    async fn fetcher_downloads_when_cache_is_stale() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf(), Duration::from_secs(3600));
        let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
        cache.put(OFFLINE_URL, b"<rss/>", two_hours_ago).await.unwrap();

        let fetcher = offline_fetcher(dir.path());
        let err = fetcher.fetch(OFFLINE_URL).await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
    }

    #[tokio::test]
    async fn unknown_urls_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().to_path_buf(), Duration::from_secs(3600));

        cache.put(URL, b"<rss/>", Utc::now()).await.unwrap();
        assert_eq!(cache.get("https://other.example.com/feed", Utc::now()).await, None);
    }
}
