//! Content-addressed on-disk response cache
//!
//! Entries live at `<root>/<key[0..2]>/<key>` where `key` is the SHA-256 hex
//! digest of the request URL. Each file is a small JSON document holding the
//! raw response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Suffix counter that keeps concurrent writes of one entry apart
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Cache I/O failures. Corrupt entries are not errors; they read as misses.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A cached raw response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResponse {
    /// HTTP status the response was stored with
    pub status: u16,

    /// URL after redirects
    pub final_url: String,

    /// When the response was fetched
    pub fetched_at: DateTime<Utc>,

    /// Response body
    pub body: String,
}

impl CachedResponse {
    pub fn new(status: u16, final_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            final_url: final_url.into(),
            fetched_at: Utc::now(),
            body: body.into(),
        }
    }

    /// Only responses below 500 are worth keeping
    pub fn is_cacheable(&self) -> bool {
        self.status < 500
    }
}

/// Handle on the cache directory, shared by every fetcher of a run
#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: PathBuf,
}

impl ResponseCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// SHA-256 hex digest of the URL
    pub fn key(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Path of the entry for `url`
    pub fn entry_path(&self, url: &str) -> PathBuf {
        let key = Self::key(url);
        self.root.join(&key[..2]).join(key)
    }

    /// Returns the cached response for `url`, if any
    pub async fn get(&self, url: &str) -> Result<Option<CachedResponse>, CacheError> {
        let path = self.entry_path(url);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("Cache miss: {}", url);
                return Ok(None);
            }
            Err(e) => return Err(io_error(&path, e)),
        };

        match serde_json::from_str::<CachedResponse>(&content) {
            Ok(entry) => {
                tracing::debug!("Cache hit: {} ({})", url, entry.status);
                Ok(Some(entry))
            }
            Err(e) => {
                tracing::warn!("Discarding corrupt cache entry for {}: {}", url, e);
                self.invalidate(url).await?;
                Ok(None)
            }
        }
    }

    /// Stores a response. Responses with status >= 500 are ignored.
    pub async fn put(&self, url: &str, response: &CachedResponse) -> Result<(), CacheError> {
        if !response.is_cacheable() {
            tracing::debug!("Not caching {} ({})", url, response.status);
            return Ok(());
        }

        let path = self.entry_path(url);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_error(dir, e))?;
        }

        let encoded = serde_json::to_vec(response)?;

        // Write then rename, so a concurrent reader never sees half an entry
        let tmp = tmp_path(&path);
        tokio::fs::write(&tmp, encoded)
            .await
            .map_err(|e| io_error(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;

        Ok(())
    }

    /// Removes exactly the entry for `url`. A missing entry is not an error.
    pub async fn invalidate(&self, url: &str) -> Result<(), CacheError> {
        let path = self.entry_path(url);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("Invalidated cache entry for {}", url);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("No cache entry to invalidate for {}", url);
                Ok(())
            }
            Err(e) => Err(io_error(&path, e)),
        }
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entry_path(url).is_file()
    }
}

fn io_error(path: &Path, source: std::io::Error) -> CacheError {
    CacheError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// A temp file next to `path`, unique per write
fn tmp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!("{}.{}-{}.tmp", name, std::process::id(), n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_entry_path_layout() {
        let cache = ResponseCache::new("/tmp/cache");
        let key = ResponseCache::key("https://example.com/a");
        let path = cache.entry_path("https://example.com/a");

        assert_eq!(key.len(), 64);
        assert_eq!(path, PathBuf::from("/tmp/cache").join(&key[..2]).join(&key));
    }

    #[test]
    fn test_key_is_deterministic() {
        assert_eq!(
            ResponseCache::key("https://example.com/a"),
            ResponseCache::key("https://example.com/a")
        );
        assert_ne!(
            ResponseCache::key("https://example.com/a"),
            ResponseCache::key("https://example.com/b")
        );
    }

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/scene/1";

        assert!(cache.get(url).await.unwrap().is_none());

        let response = CachedResponse::new(200, url, "<html></html>");
        cache.put(url, &response).await.unwrap();
        assert!(cache.contains(url));
        assert_eq!(cache.get(url).await.unwrap(), Some(response));

        cache.invalidate(url).await.unwrap();
        assert!(!cache.contains(url));
        assert!(cache.get(url).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_puts_of_one_entry() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/scene/1";

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..16 {
            let cache = cache.clone();
            tasks.spawn(async move {
                let body = format!("<html>{}</html>", i);
                cache.put(url, &CachedResponse::new(200, url, body)).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap().unwrap();
        }

        assert!(cache.get(url).await.unwrap().is_some());
        let shard = cache.entry_path(url).parent().unwrap().to_path_buf();
        let leftovers: Vec<_> = std::fs::read_dir(shard)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_invalidate_missing_entry() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        assert!(cache.invalidate("https://example.com/none").await.is_ok());
    }

    #[tokio::test]
    async fn test_invalidate_only_touches_one_entry() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());

        for url in ["https://example.com/a", "https://example.com/b"] {
            cache
                .put(url, &CachedResponse::new(200, url, "x"))
                .await
                .unwrap();
        }

        cache.invalidate("https://example.com/a").await.unwrap();
        assert!(!cache.contains("https://example.com/a"));
        assert!(cache.contains("https://example.com/b"));
    }

    #[tokio::test]
    async fn test_rate_limited_response_is_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/busy";

        cache
            .put(url, &CachedResponse::new(429, url, "slow down"))
            .await
            .unwrap();
        assert_eq!(cache.get(url).await.unwrap().map(|r| r.status), Some(429));
    }

    #[tokio::test]
    async fn test_server_errors_are_not_cached() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/broken";

        cache
            .put(url, &CachedResponse::new(503, url, "oops"))
            .await
            .unwrap();
        assert!(!cache.contains(url));
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = ResponseCache::new(dir.path());
        let url = "https://example.com/corrupt";
        let path = cache.entry_path(url);

        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not json").unwrap();

        assert!(cache.get(url).await.unwrap().is_none());
        assert!(!path.exists());
    }
}
