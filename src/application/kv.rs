//! Expiring key-value storage used for sessions, rate limits and cached reads.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("key-value store unavailable: {0}")]
    Unavailable(String),
    #[error("key-value store returned malformed data: {0}")]
    Malformed(String),
}

/// Counter state after one hit on a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowHit {
    pub count: u64,
    pub resets_in: Duration,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), KvError>;

    async fn delete(&self, key: &str) -> Result<(), KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Remove a key and return its value in one step. Concurrent callers see it at most once.
    async fn take(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Increment a counter that never expires, returning the new value.
    async fn incr(&self, key: &str) -> Result<u64, KvError>;

    /// Count a hit in the window starting at the key's first hit.
    async fn hit(&self, key: &str, window: Duration) -> Result<WindowHit, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}

pub fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{jti}")
}

pub fn refresh_token_key(user_id: i64) -> String {
    format!("refresh_token:{user_id}")
}

pub fn password_reset_key(user_id: i64) -> String {
    format!("password_reset:{user_id}")
}
