//! Cache-aside layer for rate lookups.
//!
//! [`CacheStore`] is the seam to the backing key-value store (anything with
//! per-entry TTL qualifies); [`InMemoryCacheStore`] is the in-process
//! implementation. [`CacheAside`] wraps a store with typed read-through /
//! write-through semantics.
//!
//! There is no stampede protection: concurrent misses for the same key each
//! reach the upstream, and the last writer wins.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Failure reported by a backing cache store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheError {
    message: String,
}

impl CacheError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for CacheError {}

pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Key-value store with per-entry TTL.
///
/// Each `set` fully replaces the entry; entries expire passively.
pub trait CacheStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>>;

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Thread-safe in-memory cache store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCacheStore {
    inner: Arc<tokio::sync::RwLock<HashMap<String, CacheEntry>>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn clear_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.inner.write().await;
        let before = store.len();
        store.retain(|_, entry| entry.expires_at > now);
        before - store.len()
    }

    /// Number of entries held (including expired entries not yet cleared).
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl CacheStore for InMemoryCacheStore {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let store = self.inner.read().await;
            Ok(store.get(key).and_then(|entry| {
                if Instant::now() < entry.expires_at {
                    Some(entry.value.clone())
                } else {
                    None
                }
            }))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move {
            if ttl.is_zero() {
                return Ok(());
            }
            let expires_at = Instant::now() + ttl;
            self.inner
                .write()
                .await
                .insert(key.to_owned(), CacheEntry { value, expires_at });
            Ok(())
        })
    }
}

/// Typed read-through / write-through facade over a [`CacheStore`].
///
/// Store failures and undecodable entries degrade to a miss: the lookup falls
/// through to the source of truth rather than failing the request.
#[derive(Clone)]
pub struct CacheAside {
    store: Arc<dyn CacheStore>,
}

impl CacheAside {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn lookup<T>(&self, key: &str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key, "cache miss");
                return None;
            }
            Err(error) => {
                warn!(key, error = %error, "cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(error) => {
                warn!(key, error = %error, "cached entry could not be decoded, treating as miss");
                None
            }
        }
    }

    pub async fn store<T>(&self, key: &str, value: &T, ttl: Duration)
    where
        T: Serialize,
    {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(key, error = %error, "value could not be encoded for the cache");
                return;
            }
        };

        if let Err(error) = self.store.set(key, bytes, ttl).await {
            warn!(key, error = %error, "cache write failed");
        }
    }

    /// Return the cached value for `key`, or run `fetch`, cache its success
    /// for `ttl` and return it. Failures from `fetch` are never cached.
    pub async fn get_or_fetch<T, E, F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.lookup(key).await {
            return Ok(cached);
        }

        let value = fetch().await?;
        self.store(key, &value, ttl).await;
        Ok(value)
    }
}
