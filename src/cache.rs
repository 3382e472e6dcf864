//! Keyed lookup-cache gateway with an explicit evict-on-write contract.
//!
//! The cache is an optimization, never a source of truth: eviction runs
//! after the store mutation commits and is best-effort, so read paths
//! must tolerate a stale entry surviving a crash between commit and
//! eviction.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

/// Named caches kept coherent by the lifecycle engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheName {
    /// Account lookups by normalized login.
    ByLogin,
    /// Account lookups by normalized email.
    ByEmail,
    /// Pending email-change verification codes, keyed by caller login.
    EmailCaptcha,
}

impl std::fmt::Display for CacheName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            CacheName::ByLogin => write!(f, "accounts_by_login"),
            CacheName::ByEmail => write!(f, "accounts_by_email"),
            CacheName::EmailCaptcha => write!(f, "email_captcha"),
        }
    }
}

/// Out-of-process cache collaborator.
///
/// `put`/`get` exist for the [`CacheName::EmailCaptcha`] slot; the
/// by-login and by-email caches are populated by read paths outside this
/// core and only evicted here.
#[async_trait]
pub trait CacheGateway: Send + Sync {
    /// Remove one entry. Missing entries are not an error.
    async fn evict(&self, cache: CacheName, key: &str);
    /// Store one entry.
    async fn put(&self, cache: CacheName, key: &str, value: String);
    /// Fetch one entry.
    async fn get(&self, cache: CacheName, key: &str) -> Option<String>;
}

/// In-process [`CacheGateway`] for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<(CacheName, String), String>>,
}

impl MemoryCache {
    /// Create a new empty [`MemoryCache`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheGateway for MemoryCache {
    async fn evict(&self, cache: CacheName, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(&(cache, key.to_owned()));
        }
    }

    async fn put(&self, cache: CacheName, key: &str, value: String) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert((cache, key.to_owned()), value);
        }
    }

    async fn get(&self, cache: CacheName, key: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&(cache, key.to_owned())).cloned())
    }
}
