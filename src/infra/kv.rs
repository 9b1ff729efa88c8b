//! Key-value store adapters: Redis for deployments, an in-process map otherwise.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::debug;

use crate::application::kv::{KvError, KvStore, WindowHit};

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self { manager })
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }
}

fn unavailable(err: redis::RedisError) -> KvError {
    KvError::Unavailable(err.to_string())
}

fn whole_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn();
        conn.get(key).await.map_err(unavailable)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.conn();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(whole_seconds(ttl))
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn();
        let _: () = conn.del(key).await.map_err(unavailable)?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn();
        conn.exists(key).await.map_err(unavailable)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(unavailable)
    }

    async fn incr(&self, key: &str) -> Result<u64, KvError> {
        let mut conn = self.conn();
        conn.incr(key, 1u64).await.map_err(unavailable)
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, KvError> {
        let mut conn = self.conn();
        let window_secs = whole_seconds(window);

        let count: u64 = conn.incr(key, 1u64).await.map_err(unavailable)?;
        if count == 1 {
            let _: () = conn
                .expire(key, window_secs as i64)
                .await
                .map_err(unavailable)?;
        }

        let ttl: i64 = conn.ttl(key).await.map_err(unavailable)?;
        let resets_in = if ttl >= 0 {
            Duration::from_secs(ttl as u64)
        } else {
            // A crash between INCR and EXPIRE leaves the counter without a TTL.
            let _: () = conn
                .expire(key, window_secs as i64)
                .await
                .map_err(unavailable)?;
            Duration::from_secs(window_secs)
        };

        Ok(WindowHit { count, resets_in })
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn();
        let reply: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(unavailable)?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(KvError::Malformed(format!("unexpected PING reply `{reply}`")))
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Writes between two sweeps of expired entries.
const SWEEP_EVERY: u64 = 1024;

/// In-process store for single-node runs and tests.
///
/// Expired keys are dropped when read and by a sweep that runs every
/// [`SWEEP_EVERY`] writes, so keys nobody reads again do not pile up.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        before.saturating_sub(self.entries.len())
    }

    // Must not be called while holding a guard into `entries`.
    fn note_write(&self) {
        let written = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if written % SWEEP_EVERY == 0 {
            let purged = self.purge_expired();
            if purged > 0 {
                debug!(target = "quire::kv", purged, "swept expired entries");
            }
        }
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bump(&self, key: &str) -> Result<u64, KvError> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(Entry {
            value: "0".to_string(),
            expires_at: None,
        });
        if !entry.is_live(now) {
            *entry = Entry {
                value: "0".to_string(),
                expires_at: None,
            };
        }
        let next = entry
            .value
            .parse::<u64>()
            .map_err(|err| KvError::Malformed(format!("`{key}` is not a counter: {err}")))?
            + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    fn count_hit(&self, key: &str, window: Duration) -> Result<WindowHit, KvError> {
        let now = Instant::now();
        let fresh = || Entry {
            value: "0".to_string(),
            expires_at: Some(now + window),
        };
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(fresh);
        if !entry.is_live(now) {
            *entry = fresh();
        }
        let count = entry
            .value
            .parse::<u64>()
            .map_err(|err| KvError::Malformed(format!("`{key}` is not a counter: {err}")))?
            + 1;
        entry.value = count.to_string();
        let expires_at = *entry.expires_at.get_or_insert(now + window);

        Ok(WindowHit {
            count,
            resets_in: expires_at.saturating_duration_since(now),
        })
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        }
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        self.note_write();
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(_, entry)| entry.value))
    }

    async fn incr(&self, key: &str) -> Result<u64, KvError> {
        let next = self.bump(key)?;
        self.note_write();
        Ok(next)
    }

    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, KvError> {
        let hit = self.count_hit(key, window)?;
        self.note_write();
        Ok(hit)
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn entries_expire() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_millis(20))
            .await
            .expect("set");
        assert_eq!(store.get("k").await.expect("get").as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!store.exists("k").await.expect("exists"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn window_counts_until_reset() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(50);

        let first = store.hit("rl", window).await.expect("hit");
        let second = store.hit("rl", window).await.expect("hit");
        assert_eq!((first.count, second.count), (1, 2));
        assert!(second.resets_in <= window);

        tokio::time::sleep(Duration::from_millis(70)).await;
        let after = store.hit("rl", window).await.expect("hit");
        assert_eq!(after.count, 1);
    }

    #[tokio::test]
    async fn incr_starts_at_one_and_rejects_text() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("gen").await.expect("incr"), 1);
        assert_eq!(store.incr("gen").await.expect("incr"), 2);

        store
            .set_ex("text", "hello", Duration::from_secs(5))
            .await
            .expect("set");
        assert!(matches!(
            store.incr("text").await,
            Err(KvError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn expired_entries_are_swept_without_reads() {
        let store = MemoryStore::new();
        let short = Duration::from_millis(1);
        for i in 0..SWEEP_EVERY {
            store.hit(&format!("rl:{i}"), short).await.expect("hit");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        for i in 0..SWEEP_EVERY {
            store
                .hit(&format!("live:{i}"), Duration::from_secs(60))
                .await
                .expect("hit");
        }
        assert_eq!(store.len(), SWEEP_EVERY as usize);
        assert!(
            store.entries.len() <= SWEEP_EVERY as usize,
            "expired entries retained: {}",
            store.entries.len()
        );
    }

    #[tokio::test]
    async fn purge_reports_removed_entries() {
        let store = MemoryStore::new();
        store
            .set_ex("old", "v", Duration::from_millis(1))
            .await
            .expect("set");
        store
            .set_ex("new", "v", Duration::from_secs(60))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.entries.len(), 1);
    }

    #[tokio::test]
    async fn take_returns_value_once() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(5))
            .await
            .expect("set");
        assert_eq!(store.take("k").await.expect("take").as_deref(), Some("v"));
        assert_eq!(store.take("k").await.expect("take"), None);
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = MemoryStore::new();
        store
            .set_ex("k", "v", Duration::from_secs(5))
            .await
            .expect("set");
        store.delete("k").await.expect("delete");
        assert_eq!(store.get("k").await.expect("get"), None);
    }
}
