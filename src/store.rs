//! High-level `Store` wrapper over backend implementations.
//!
//! Provides a convenient API that wraps any `StorageBackend` implementation.

use crate::backend::StorageBackend;
use crate::backends::{MemoryBackend, MemoryConfig};
use crate::error::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "fs")]
use crate::backends::{FilesystemBackend, FilesystemConfig};
#[cfg(feature = "moka")]
use crate::backends::{MokaBackend, MokaConfig};
#[cfg(feature = "redb")]
use crate::backends::{RedbBackend, RedbConfig};
#[cfg(feature = "sqlite")]
use crate::backends::{SqliteBackend, SqliteConfig};

/// High-level expiring key-value store.
///
/// Wraps a `StorageBackend` implementation and provides a consistent API
/// regardless of the underlying storage engine.
///
/// # Thread Safety
///
/// `Store` is `Clone` and can be shared across threads. The underlying
/// backend handles concurrent access safely.
///
/// # Example
///
/// ```no_run
/// use kvstash::Store;
/// use std::time::Duration;
///
/// # async fn run() -> kvstash::Result<()> {
/// let store = Store::memory();
///
/// store.set("session:123", b"user_data", Some(Duration::from_secs(3600))).await?;
///
/// if let Some(data) = store.get("session:123").await? {
///     println!("found: {} bytes", data.len());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    backend: Arc<dyn StorageBackend>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

impl Store {
    /// Creates a store backed by an in-memory map with no default TTL.
    ///
    /// Ideal for testing, development, and embedded applications. All data
    /// is lost when the process exits.
    pub fn memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
        }
    }

    /// Creates an in-memory store from a config.
    pub fn memory_with(config: MemoryConfig) -> Self {
        Self {
            backend: Arc::new(MemoryBackend::with_config(config)),
        }
    }

    /// Creates a store backed by a moka cache with engine-enforced TTL.
    #[cfg(feature = "moka")]
    pub fn moka(config: MokaConfig) -> Self {
        Self {
            backend: Arc::new(MokaBackend::with_config(config)),
        }
    }

    /// Creates a store backed by a SQLite table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or the database cannot
    /// be opened or bootstrapped.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(config: SqliteConfig) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(SqliteBackend::open(config)?),
        })
    }

    /// Creates a store backed by an embedded redb database.
    ///
    /// # Errors
    ///
    /// Returns an error if the table name is invalid or the database cannot
    /// be opened or bootstrapped.
    #[cfg(feature = "redb")]
    pub fn redb(config: RedbConfig) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(RedbBackend::open(config)?),
        })
    }

    /// Creates a store backed by a filesystem bucket directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket name is invalid or the bucket
    /// directory cannot be created.
    #[cfg(feature = "fs")]
    pub fn filesystem(config: FilesystemConfig) -> Result<Self> {
        Ok(Self {
            backend: Arc::new(FilesystemBackend::open(config)?),
        })
    }

    /// Creates a store with a custom backend.
    ///
    /// Use this to integrate external storage engines like Redis,
    /// PostgreSQL, or an object store.
    ///
    /// # Example
    ///
    /// ```ignore
    /// struct RedisBackend { /* ... */ }
    /// impl StorageBackend for RedisBackend { /* ... */ }
    ///
    /// let store = Store::custom(RedisBackend::new());
    /// ```
    pub fn custom<B: StorageBackend>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    /// Creates a store from a boxed backend.
    ///
    /// Useful when working with trait objects directly.
    pub fn from_boxed(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Arc::from(backend),
        }
    }

    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist or has expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get(key).await
    }

    /// Stores a key-value pair with an optional TTL.
    ///
    /// A positive `ttl` overrides the store's default TTL; `None` falls back
    /// to the default; with no default the entry never expires.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()> {
        self.backend.set(key, value.to_vec(), ttl).await
    }

    /// Deletes a key-value pair.
    ///
    /// Returns `Ok(true)` if the key existed, `Ok(false)` otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }

    /// Removes every entry while keeping the schema intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn reset(&self) -> Result<()> {
        self.backend.reset().await
    }

    /// Lists all live entries matching an optional key prefix.
    ///
    /// Expired entries are excluded even if the engine has not yet reaped
    /// them.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        self.backend.list(prefix).await
    }

    /// Checks if a key exists and has not expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage operation fails.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.backend.exists(key).await
    }

    /// Releases the backend's engine handle.
    ///
    /// Subsequent operations on this store (or its clones) return
    /// [`crate::Error::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if releasing the handle fails.
    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }
}
