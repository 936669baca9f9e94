//! Redb-backed storage backend.
//!
//! Persists entries in a named redb table with ACID guarantees. Redb has no
//! native expiry, so each value is wrapped in a JSON envelope carrying its
//! absolute deadline; reads check the deadline defensively and reap expired
//! entries lazily.

use crate::backend::StorageBackend;
use crate::entry::StoredEntry;
use crate::error::{Error, Result};
use crate::expiry::ExpiryPolicy;
use crate::ident::validate_identifier;
use async_trait::async_trait;
use parking_lot::RwLock;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`RedbBackend`].
#[derive(Debug, Clone)]
pub struct RedbConfig {
    /// Database file path. Parent directories are created if needed.
    pub path: PathBuf,
    /// Table name. Must contain only ASCII letters, digits, and underscore.
    pub table: String,
    /// Store-wide default TTL applied when `set` is called without one.
    pub default_ttl: Option<Duration>,
    /// Delete and recreate the table at construction.
    pub reset: bool,
}

impl Default for RedbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kvstash.redb"),
            table: "kvstash".to_string(),
            default_ttl: None,
            reset: false,
        }
    }
}

impl RedbConfig {
    /// Sets the database file path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the store-wide default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Requests a schema wipe at construction.
    #[must_use]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// Redb-backed key-value storage backend.
///
/// Provides persistent storage with ACID guarantees. Suitable for
/// production use where durability is required.
///
/// # Thread Safety
///
/// `RedbBackend` is `Clone` and can be shared across threads. The underlying
/// database handles concurrent transactions safely.
#[derive(Clone, Debug)]
pub struct RedbBackend {
    db: Arc<RwLock<Option<Arc<Database>>>>,
    table: String,
    policy: ExpiryPolicy,
}

impl RedbBackend {
    /// Opens or creates the database and ensures the data table exists.
    ///
    /// Bootstrap is idempotent: reopening an existing store succeeds without
    /// duplicating anything. With `reset` set, the table is deleted and
    /// recreated.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The table name fails identifier validation
    /// - The parent directory cannot be created
    /// - The database cannot be opened or the initialization transaction fails
    pub fn open(config: RedbConfig) -> Result<Self> {
        let table = validate_identifier(&config.table, "table")?.to_string();

        // Ensure parent directory exists before opening the database
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::bootstrap("create database directory", parent.display().to_string(), e)
            })?;
        }

        let db = Database::create(&config.path).map_err(|e| {
            Error::bootstrap("open database", config.path.display().to_string(), e)
        })?;

        let def: TableDefinition<'_, &str, &[u8]> = TableDefinition::new(&table);

        // Initialize (and optionally reset) the table in one committed
        // write transaction so no partially bootstrapped handle escapes.
        let write_txn = db
            .begin_write()
            .map_err(|e| Error::bootstrap("begin initialization transaction", table.clone(), e))?;
        if config.reset {
            write_txn
                .delete_table(def)
                .map_err(|e| Error::bootstrap("delete table", table.clone(), e))?;
        }
        {
            let _table = write_txn
                .open_table(def)
                .map_err(|e| Error::bootstrap("create table", table.clone(), e))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::bootstrap("commit initialization transaction", table.clone(), e))?;

        tracing::debug!(
            table = %table,
            path = %config.path.display(),
            reset = config.reset,
            "redb store ready"
        );

        Ok(Self {
            db: Arc::new(RwLock::new(Some(Arc::new(db)))),
            table,
            policy: ExpiryPolicy::new(config.default_ttl),
        })
    }

    /// Returns the underlying database handle for advanced use. Not part of
    /// the core contract.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the store has been closed.
    pub fn conn(&self) -> Result<Arc<Database>> {
        self.db.read().clone().ok_or(Error::Closed)
    }

    fn table_def(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    fn get_sync(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.conn()?;

        let entry = {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::backend("begin read transaction", e))?;
            let table = read_txn
                .open_table(self.table_def())
                .map_err(|e| Error::backend("open table", e))?;
            let result = table
                .get(key)
                .map_err(|e| Error::backend(format!("get key '{key}'"), e))?;

            match result {
                Some(guard) => serde_json::from_slice::<StoredEntry>(guard.value())
                    .map(Some)
                    .map_err(|e| Error::backend(format!("decode entry for key '{key}'"), e))?,
                None => None,
            }
        };

        match entry {
            None => Ok(None),
            Some(entry) => {
                if entry.is_expired()? {
                    // Best-effort lazy reap; the read already reports absent.
                    if let Err(err) = self.delete_sync(key) {
                        tracing::warn!(key = %key, error = %err, "failed to reap expired key");
                    }
                    Ok(None)
                } else {
                    Ok(Some(entry.value))
                }
            },
        }
    }

    fn set_sync(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let resolved = self.policy.resolve(ttl)?;
        let entry = StoredEntry::new(value, resolved.deadline);
        let json =
            serde_json::to_vec(&entry).map_err(|e| Error::backend("encode entry", e))?;

        let db = self.conn()?;
        let write_txn = db
            .begin_write()
            .map_err(|e| Error::backend("begin write transaction", e))?;
        {
            let mut table = write_txn
                .open_table(self.table_def())
                .map_err(|e| Error::backend("open table", e))?;
            table
                .insert(key, json.as_slice())
                .map_err(|e| Error::backend(format!("set key '{key}'"), e))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend("commit set transaction", e))?;
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let db = self.conn()?;
        let write_txn = db
            .begin_write()
            .map_err(|e| Error::backend("begin write transaction", e))?;
        let removed = {
            let mut table = write_txn
                .open_table(self.table_def())
                .map_err(|e| Error::backend("open table", e))?;
            table
                .remove(key)
                .map_err(|e| Error::backend(format!("delete key '{key}'"), e))?
                .is_some()
        };
        write_txn
            .commit()
            .map_err(|e| Error::backend("commit delete transaction", e))?;
        Ok(removed)
    }

    fn reset_sync(&self) -> Result<()> {
        let db = self.conn()?;
        let write_txn = db
            .begin_write()
            .map_err(|e| Error::backend("begin write transaction", e))?;
        // Delete-and-recreate clears every entry while leaving the schema
        // in place for subsequent operations.
        write_txn
            .delete_table(self.table_def())
            .map_err(|e| Error::backend("clear table", e))?;
        {
            let _table = write_txn
                .open_table(self.table_def())
                .map_err(|e| Error::backend("recreate table", e))?;
        }
        write_txn
            .commit()
            .map_err(|e| Error::backend("commit reset transaction", e))?;
        Ok(())
    }

    fn list_sync(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        let db = self.conn()?;

        let mut live = BTreeMap::new();
        let mut expired_keys = Vec::new();

        {
            let read_txn = db
                .begin_read()
                .map_err(|e| Error::backend("begin read transaction", e))?;
            let table = read_txn
                .open_table(self.table_def())
                .map_err(|e| Error::backend("open table", e))?;

            for item in table
                .iter()
                .map_err(|e| Error::backend("iterate table", e))?
            {
                let (key, value) = item.map_err(|e| Error::backend("read entry", e))?;
                let key_str = key.value();

                if let Some(prefix) = prefix
                    && !key_str.starts_with(prefix)
                {
                    continue;
                }

                let entry = serde_json::from_slice::<StoredEntry>(value.value())
                    .map_err(|e| {
                        Error::backend(format!("decode entry for key '{key_str}'"), e)
                    })?;
                if entry.is_expired()? {
                    expired_keys.push(key_str.to_string());
                } else {
                    live.insert(key_str.to_string(), entry.value);
                }
            }
        }

        for key in expired_keys {
            if let Err(err) = self.delete_sync(&key) {
                tracing::warn!(key = %key, error = %err, "failed to reap expired key");
            }
        }

        Ok(live)
    }

    fn close_sync(&self) -> Result<()> {
        self.db.write().take();
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for RedbBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.get_sync(&key))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.set_sync(&key, value, ttl))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.delete_sync(&key))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn reset(&self) -> Result<()> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.reset_sync())
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        let backend = self.clone();
        let prefix = prefix.map(ToString::to_string);
        tokio::task::spawn_blocking(move || backend.list_sync(prefix.as_deref()))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn close(&self) -> Result<()> {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.close_sync())
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_in(tmp: &TempDir) -> RedbBackend {
        RedbBackend::open(RedbConfig::default().with_path(tmp.path().join("kv.redb"))).unwrap()
    }

    #[tokio::test]
    async fn test_get_set() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);

        backend.set("key1", b"value1".to_vec(), None).await.unwrap();
        assert_eq!(
            backend.get("key1").await.unwrap(),
            Some(b"value1".to_vec())
        );
    }

    #[tokio::test]
    async fn test_invalid_table_name_rejected() {
        let tmp = TempDir::new().unwrap();
        let err = RedbBackend::open(
            RedbConfig::default()
                .with_path(tmp.path().join("kv.redb"))
                .with_table("my-table"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidIdentifier { role: "table", .. }));
        assert!(!tmp.path().join("kv.redb").exists());
    }

    #[tokio::test]
    async fn test_ttl_expiration() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);

        backend
            .set("gone", b"v".to_vec(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        assert!(backend.get("gone").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(2100)).await;
        assert!(backend.get("gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kv.redb");

        let backend = RedbBackend::open(RedbConfig::default().with_path(&path)).unwrap();
        backend.set("key", b"value".to_vec(), None).await.unwrap();
        backend.close().await.unwrap();

        let reopened = RedbBackend::open(RedbConfig::default().with_path(&path)).unwrap();
        assert_eq!(
            reopened.get("key").await.unwrap(),
            Some(b"value".to_vec())
        );
    }

    #[tokio::test]
    async fn test_reset_flag_wipes_table() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kv.redb");

        let backend = RedbBackend::open(RedbConfig::default().with_path(&path)).unwrap();
        backend.set("key", b"value".to_vec(), None).await.unwrap();
        backend.close().await.unwrap();

        let wiped =
            RedbBackend::open(RedbConfig::default().with_path(&path).with_reset(true)).unwrap();
        assert!(wiped.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_then_usable() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);

        backend.set("a", b"x".to_vec(), None).await.unwrap();
        backend.reset().await.unwrap();
        assert!(backend.get("a").await.unwrap().is_none());

        // Schema survives a reset.
        backend.set("b", b"y".to_vec(), None).await.unwrap();
        assert_eq!(backend.get("b").await.unwrap(), Some(b"y".to_vec()));
    }

    #[tokio::test]
    async fn test_list_skips_expired() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);

        backend.set("keep", b"v".to_vec(), None).await.unwrap();
        backend
            .set("gone", b"v".to_vec(), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;

        let live = backend.list(None).await.unwrap();
        assert_eq!(live.keys().collect::<Vec<_>>(), vec!["keep"]);
    }

    #[tokio::test]
    async fn test_malformed_entry_surfaces_error() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);

        backend.set("good", b"v".to_vec(), None).await.unwrap();

        // Corrupt one entry directly through the engine handle.
        let db = backend.conn().unwrap();
        let def: TableDefinition<'_, &str, &[u8]> = TableDefinition::new("kvstash");
        let write_txn = db.begin_write().unwrap();
        {
            let mut table = write_txn.open_table(def).unwrap();
            table.insert("broken", b"not json".as_slice()).unwrap();
        }
        write_txn.commit().unwrap();

        assert!(matches!(
            backend.get("broken").await.unwrap_err(),
            Error::Backend { .. }
        ));
        assert!(matches!(
            backend.list(None).await.unwrap_err(),
            Error::Backend { .. }
        ));
    }

    #[tokio::test]
    async fn test_closed_store_errors() {
        let tmp = TempDir::new().unwrap();
        let backend = open_in(&tmp);
        backend.close().await.unwrap();

        assert!(matches!(
            backend.get("key").await.unwrap_err(),
            Error::Closed
        ));
        assert!(matches!(
            backend.set("key", b"v".to_vec(), None).await.unwrap_err(),
            Error::Closed
        ));
    }
}
