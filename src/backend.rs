//! Backend trait for the expiring KV store.
//!
//! Defines the interface that all storage backends must implement, enabling
//! pluggable storage (memory, moka, SQLite, redb, filesystem, or external
//! engines such as Redis).

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Backend trait for expiring key-value storage.
///
/// All backends must be thread-safe (`Send + Sync`) for use with tokio.
/// Implementations handle their own concurrency and provide whatever
/// durability the underlying engine offers.
///
/// Every backend enforces the same TTL contract: an entry whose deadline has
/// passed behaves as if it was never set, whether or not the engine has
/// physically removed it yet.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired. Backends
    /// without engine-enforced expiry check the stored deadline on every read
    /// and lazily remove entries found expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails or the
    /// store is closed. Absence is never an error.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores a key-value pair with an optional TTL.
    ///
    /// A positive `ttl` overrides the store's default TTL; `None` (or a zero
    /// duration) falls back to the default; with no default the entry never
    /// expires. Overwrites an existing value for the same key
    /// (last-write-wins).
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Deletes a key-value pair.
    ///
    /// Returns `Ok(true)` if the key existed and was removed, `Ok(false)` if
    /// it didn't exist. Idempotent - safe to call multiple times.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Removes every entry while keeping the schema (table, bucket) intact.
    ///
    /// Idempotent - resetting an empty store succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn reset(&self) -> Result<()>;

    /// Lists all live entries matching an optional key prefix.
    ///
    /// Entries whose deadline has passed are excluded even if the engine has
    /// not yet reaped them. Backends may additionally delete the expired
    /// entries they skip, but exclusion from the result is the contract.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>>;

    /// Checks if a key exists and has not expired.
    ///
    /// Default implementation uses `get()`, but backends may override
    /// for efficiency.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Releases the engine handle.
    ///
    /// Subsequent operations return [`crate::Error::Closed`]; they never
    /// silently succeed against a released handle. Close is expected at most
    /// once per store and is not required to be safe against in-flight
    /// operations.
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the handle fails.
    async fn close(&self) -> Result<()>;
}
