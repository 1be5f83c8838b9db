// src/services/nonce.rs
//! Anti-CSRF state nonce store for the OAuth redirect cycle
//!
//! Nonces are single-use: issued before redirecting to a provider, consumed
//! exactly once at the callback. Expired, reused and forged nonces all fail
//! consumption the same way.

use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Key namespace for OAuth state entries
const STATE_NAMESPACE: &str = "oauth_state";

/// Nonce lifetime: the redirect cycle must complete within this window
const STATE_TTL: Duration = Duration::from_secs(600);

/// Narrow interface over a TTL-capable key-value store
///
/// Values are presence-only. `take` must be atomic per key: of two
/// concurrent calls for the same key, at most one may return true.
#[async_trait]
pub trait TtlStore: Send + Sync {
    async fn put(&self, key: &str, ttl: Duration);

    /// Remove the key, returning whether it was present and unexpired
    async fn take(&self, key: &str) -> bool;
}

/// In-process TTL store backed by a lock-guarded map
#[derive(Debug, Default)]
pub struct MemoryTtlStore {
    entries: RwLock<HashMap<String, Instant>>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries; called periodically from the cleanup task
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, expires_at| *expires_at > now);
    }

    /// Spawn a background task that purges expired entries
    pub fn start_cleanup_task(store: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(60));
            loop {
                interval.tick().await;
                store.purge_expired().await;
            }
        });
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn put(&self, key: &str, ttl: Duration) {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Instant::now() + ttl);
    }

    async fn take(&self, key: &str) -> bool {
        // remove-under-write-lock makes consumption at-most-once
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(expires_at) => expires_at > Instant::now(),
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct NonceStore {
    store: Arc<dyn TtlStore>,
    ttl: Duration,
}

impl NonceStore {
    pub fn new(store: Arc<dyn TtlStore>) -> Self {
        Self {
            store,
            ttl: STATE_TTL,
        }
    }

    /// Construct with a custom TTL; test hook
    #[allow(dead_code)]
    pub fn with_ttl(store: Arc<dyn TtlStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh nonce: 16 random bytes, hex-encoded
    pub async fn issue(&self) -> String {
        let bytes: [u8; 16] = rand::thread_rng().gen();
        let nonce = bytes.iter().fold(String::with_capacity(32), |mut s, b| {
            let _ = write!(s, "{:02x}", b);
            s
        });

        self.store.put(&namespaced(&nonce), self.ttl).await;
        debug!(ttl_seconds = self.ttl.as_secs(), "Issued OAuth state nonce");
        nonce
    }

    /// Consume a nonce, returning true exactly once per issued value
    pub async fn consume(&self, nonce: &str) -> bool {
        self.store.take(&namespaced(nonce)).await
    }
}

fn namespaced(nonce: &str) -> String {
    format!("{}:{}", STATE_NAMESPACE, nonce)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> NonceStore {
        NonceStore::new(Arc::new(MemoryTtlStore::new()))
    }

    #[tokio::test]
    async fn test_nonce_format() {
        let store = test_store();
        let nonce = store.issue().await;

        assert_eq!(nonce.len(), 32);
        assert!(nonce.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_consume_succeeds_exactly_once() {
        let store = test_store();
        let nonce = store.issue().await;

        assert!(store.consume(&nonce).await);
        assert!(!store.consume(&nonce).await);
        assert!(!store.consume(&nonce).await);
    }

    #[tokio::test]
    async fn test_never_issued_nonce_fails() {
        let store = test_store();
        assert!(!store.consume("deadbeefdeadbeefdeadbeefdeadbeef").await);
    }

    #[tokio::test]
    async fn test_expired_nonce_fails() {
        let store = NonceStore::with_ttl(
            Arc::new(MemoryTtlStore::new()),
            Duration::from_millis(20),
        );
        let nonce = store.issue().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!store.consume(&nonce).await);
    }

    #[tokio::test]
    async fn test_nonces_are_unique() {
        let store = test_store();
        let a = store.issue().await;
        let b = store.issue().await;
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired() {
        let backing = Arc::new(MemoryTtlStore::new());
        let short = NonceStore::with_ttl(backing.clone(), Duration::from_millis(10));
        let long = NonceStore::with_ttl(backing.clone(), Duration::from_secs(60));

        let stale = short.issue().await;
        let fresh = long.issue().await;

        tokio::time::sleep(Duration::from_millis(30)).await;
        backing.purge_expired().await;

        assert!(!long.consume(&stale).await);
        assert!(long.consume(&fresh).await);
    }
}
