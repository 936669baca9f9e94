//! In-memory storage backend.
//!
//! Provides a fast, non-persistent key-value store using DashMap for
//! concurrent access. Ideal for testing, development, and embedded use cases.
//!
//! DashMap has no notion of expiry, so deadlines are tracked as monotonic
//! instants and checked defensively on every read; entries found expired are
//! removed inline.

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::expiry::ExpiryPolicy;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Configuration for [`MemoryBackend`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    /// Store-wide default TTL applied when `set` is called without one.
    /// `None` means entries without an explicit TTL never expire.
    pub default_ttl: Option<Duration>,
}

impl MemoryConfig {
    /// Sets the store-wide default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

/// Entry stored in the memory backend with optional expiration.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    /// The stored value bytes.
    pub value: Vec<u8>,
    /// Monotonic expiry instant. None = never expires.
    pub expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|d| Instant::now() + d),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory key-value storage backend using DashMap.
///
/// Provides fast, concurrent access without persistence. All data is lost
/// when the process exits.
///
/// # Thread Safety
///
/// `MemoryBackend` is `Clone` (clones share the same map) and uses `DashMap`
/// internally for lock-free concurrent access.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    data: Arc<DashMap<String, MemoryEntry>>,
    policy: ExpiryPolicy,
    closed: Arc<AtomicBool>,
}

impl MemoryBackend {
    /// Creates a new empty in-memory backend with no default TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory backend from a config.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            policy: ExpiryPolicy::new(config.default_ttl),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the number of entries in the store (including expired).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Removes all expired entries from the store.
    ///
    /// Call this periodically for proactive cleanup of expired entries.
    /// Otherwise, expired entries are cleaned up lazily on access.
    pub fn cleanup_expired(&self) {
        self.data.retain(|_, entry| !entry.is_expired());
    }

    /// Returns the underlying map for advanced use. Not part of the core
    /// contract; mutating it bypasses the TTL bookkeeping.
    pub fn conn(&self) -> Arc<DashMap<String, MemoryEntry>> {
        Arc::clone(&self.data)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(key);
                Ok(None)
            } else {
                Ok(Some(entry.value.clone()))
            }
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check_open()?;
        let entry = MemoryEntry::new(value, self.policy.effective_ttl(ttl));
        self.data.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.data.remove(key).is_some())
    }

    async fn reset(&self) -> Result<()> {
        self.check_open()?;
        self.data.clear();
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        self.check_open()?;
        let mut live = BTreeMap::new();
        let mut expired_keys = Vec::new();

        for entry in self.data.iter() {
            let key = entry.key();

            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                continue;
            }

            if entry.value().is_expired() {
                expired_keys.push(key.clone());
            } else {
                live.insert(key.clone(), entry.value().value.clone());
            }
        }

        for key in expired_keys {
            self.data.remove(&key);
        }

        Ok(live)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(key);
                Ok(false)
            } else {
                Ok(true)
            }
        } else {
            Ok(false)
        }
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.data.clear();
        Ok(())
    }
}
