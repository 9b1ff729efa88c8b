//! Cache-aside storage for public read models.
//!
//! Entries live in the key-value store under a generation number. Writes bump
//! the generation, which orphans every older entry until its TTL runs out.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::application::kv::KvStore;

pub const METRIC_CACHE_HIT_TOTAL: &str = "quire_cache_hit_total";
pub const METRIC_CACHE_MISS_TOTAL: &str = "quire_cache_miss_total";
pub const METRIC_CACHE_ERROR_TOTAL: &str = "quire_cache_error_total";

const GENERATION_KEY: &str = "cache:posts:gen";

/// Read models that may be served from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    PostList,
    Popular,
    Search,
    Statistics,
    Categories,
}

impl CacheScope {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheScope::PostList => "list",
            CacheScope::Popular => "popular",
            CacheScope::Search => "search",
            CacheScope::Statistics => "stats",
            CacheScope::Categories => "categories",
        }
    }
}

#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    enabled: bool,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>, ttl: Duration, enabled: bool) -> Self {
        Self {
            store,
            ttl,
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Return the cached value for `(scope, params)` or run `loader` and store its result.
    ///
    /// Store failures and undecodable entries fall through to `loader`.
    pub async fn get_or_load<T, P, E, F, Fut>(
        &self,
        scope: CacheScope,
        params: &P,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.enabled {
            return loader().await;
        }
        let Some(key) = self.key(scope, params).await else {
            return loader().await;
        };

        match self.store.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    counter!(METRIC_CACHE_HIT_TOTAL, "scope" => scope.as_str()).increment(1);
                    return Ok(value);
                }
                Err(err) => {
                    counter!(METRIC_CACHE_ERROR_TOTAL, "scope" => scope.as_str()).increment(1);
                    warn!(target = "quire::cache", key = %key, error = %err, "discarding undecodable cache entry");
                }
            },
            Ok(None) => {
                counter!(METRIC_CACHE_MISS_TOTAL, "scope" => scope.as_str()).increment(1);
            }
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL, "scope" => scope.as_str()).increment(1);
                warn!(target = "quire::cache", key = %key, error = %err, "cache read failed");
                return loader().await;
            }
        }

        let value = loader().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(err) = self.store.set_ex(&key, &raw, self.ttl).await {
                    counter!(METRIC_CACHE_ERROR_TOTAL, "scope" => scope.as_str()).increment(1);
                    warn!(target = "quire::cache", key = %key, error = %err, "cache write failed");
                }
            }
            Err(err) => {
                warn!(target = "quire::cache", key = %key, error = %err, "cache value did not serialize");
            }
        }
        Ok(value)
    }

    /// Orphan every cached entry.
    pub async fn invalidate(&self) {
        if !self.enabled {
            return;
        }
        if let Err(err) = self.store.incr(GENERATION_KEY).await {
            counter!(METRIC_CACHE_ERROR_TOTAL, "scope" => "invalidate").increment(1);
            warn!(target = "quire::cache", error = %err, "cache invalidation failed");
        }
    }

    async fn key<P: Serialize + ?Sized>(&self, scope: CacheScope, params: &P) -> Option<String> {
        let generation = match self.store.get(GENERATION_KEY).await {
            Ok(value) => value.and_then(|raw| raw.parse::<u64>().ok()).unwrap_or(0),
            Err(err) => {
                counter!(METRIC_CACHE_ERROR_TOTAL, "scope" => scope.as_str()).increment(1);
                warn!(target = "quire::cache", error = %err, "cache generation unavailable");
                return None;
            }
        };
        let encoded = serde_json::to_vec(params).ok()?;
        let digest = Sha256::digest(&encoded);
        Some(format!(
            "cache:posts:{}:g{generation}:{}",
            scope.as_str(),
            hex::encode(&digest[..16])
        ))
    }
}
