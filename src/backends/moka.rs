//! Moka-backed storage backend with engine-enforced TTL.
//!
//! Unlike the other backends, moka enforces per-entry expiry natively: the
//! resolved TTL is handed to the engine as an expiry directive at write time
//! and the engine reaps expired entries automatically. Reads therefore skip
//! the defensive deadline check; `list` still filters on the stored deadline
//! so enumeration never leaks an entry the reaper hasn't visited yet.

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::expiry::{ExpiryPolicy, deadline_passed};
use async_trait::async_trait;
use moka::Expiry;
use moka::sync::Cache;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Configuration for [`MokaBackend`].
#[derive(Debug, Clone, Default)]
pub struct MokaConfig {
    /// Maximum number of entries the cache keeps before evicting.
    /// `None` means unbounded.
    pub max_capacity: Option<u64>,
    /// Store-wide default TTL applied when `set` is called without one.
    pub default_ttl: Option<Duration>,
}

impl MokaConfig {
    /// Caps the cache at `max` entries.
    #[must_use]
    pub fn with_max_capacity(mut self, max: u64) -> Self {
        self.max_capacity = Some(max);
        self
    }

    /// Sets the store-wide default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
}

/// Entry stored in the moka cache.
///
/// Carries the absolute deadline alongside the value so `list` can filter
/// without relying on the engine's reap timing.
#[derive(Debug, Clone)]
pub struct MokaEntry {
    /// The stored value bytes.
    pub value: Vec<u8>,
    /// Absolute expiry instant (Unix epoch milliseconds). None = never expires.
    pub expires_at: Option<u64>,
    ttl: Option<Duration>,
}

/// Expiry policy handing each entry's resolved TTL to the engine.
struct PerEntryExpiry;

impl Expiry<String, MokaEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &MokaEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &MokaEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Last-write-wins: an overwrite replaces the previous deadline.
        entry.ttl
    }
}

/// Moka-backed key-value storage backend.
///
/// Non-persistent, in-process, with native per-entry TTL and optional
/// capacity-based eviction.
///
/// # Thread Safety
///
/// `MokaBackend` is `Clone` (clones share the same cache); moka handles
/// concurrent access internally.
#[derive(Clone)]
pub struct MokaBackend {
    cache: Cache<String, MokaEntry>,
    policy: ExpiryPolicy,
    closed: Arc<AtomicBool>,
}

impl MokaBackend {
    /// Creates a new moka backend from a config.
    pub fn with_config(config: MokaConfig) -> Self {
        let mut builder = Cache::builder().expire_after(PerEntryExpiry);
        if let Some(max) = config.max_capacity {
            builder = builder.max_capacity(max);
        }
        Self {
            cache: builder.build(),
            policy: ExpiryPolicy::new(config.default_ttl),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the underlying cache for advanced use. Not part of the core
    /// contract.
    pub fn conn(&self) -> Cache<String, MokaEntry> {
        self.cache.clone()
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Default for MokaBackend {
    fn default() -> Self {
        Self::with_config(MokaConfig::default())
    }
}

#[async_trait]
impl StorageBackend for MokaBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        // The engine enforces the deadline; no defensive check needed.
        Ok(self.cache.get(key).map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check_open()?;
        let resolved = self.policy.resolve(ttl)?;
        self.cache.insert(
            key.to_string(),
            MokaEntry {
                value,
                expires_at: resolved.deadline,
                ttl: resolved.ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        Ok(self.cache.remove(key).is_some())
    }

    async fn reset(&self) -> Result<()> {
        self.check_open()?;
        self.cache.invalidate_all();
        Ok(())
    }

    async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        self.check_open()?;
        let mut live = BTreeMap::new();

        for (key, entry) in self.cache.iter() {
            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                continue;
            }

            // The reaper is not instantaneous; filter on the stored deadline.
            if deadline_passed(entry.expires_at)? {
                continue;
            }

            live.insert(key.as_ref().clone(), entry.value);
        }

        Ok(live)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.cache.invalidate_all();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set() {
        let backend = MokaBackend::default();

        backend.set("key1", b"value1".to_vec(), None).await.unwrap();
        assert_eq!(
            backend.get("key1").await.unwrap(),
            Some(b"value1".to_vec())
        );
    }

    #[tokio::test]
    async fn test_native_ttl_reaps() {
        let backend = MokaBackend::default();

        backend
            .set("gone", b"v".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();

        assert!(backend.get("gone").await.unwrap().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let backend = MokaBackend::with_config(
            MokaConfig::default().with_default_ttl(Duration::from_millis(10)),
        );

        backend.set("key", b"v".to_vec(), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(backend.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_overwrite_extends_life() {
        let backend = MokaBackend::default();

        backend
            .set("key", b"v1".to_vec(), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        backend.set("key", b"v2".to_vec(), None).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(backend.get("key").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_list_filters_expired() {
        let backend = MokaBackend::default();

        backend.set("keep", b"v".to_vec(), None).await.unwrap();
        backend
            .set("gone", b"v".to_vec(), Some(Duration::from_secs(1)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;

        let live = backend.list(None).await.unwrap();
        assert_eq!(live.len(), 1);
        assert!(live.contains_key("keep"));
    }

    #[tokio::test]
    async fn test_delete_and_reset() {
        let backend = MokaBackend::default();

        backend.set("a", b"x".to_vec(), None).await.unwrap();
        assert!(backend.delete("a").await.unwrap());
        assert!(!backend.delete("a").await.unwrap());

        backend.set("b", b"y".to_vec(), None).await.unwrap();
        backend.reset().await.unwrap();
        assert!(backend.get("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let backend = MokaBackend::default();
        backend.close().await.unwrap();
        assert!(matches!(
            backend.get("key").await.unwrap_err(),
            Error::Closed
        ));
    }
}
