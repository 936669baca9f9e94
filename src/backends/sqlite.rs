//! SQLite-backed storage backend.
//!
//! Persists entries in a single SQL table
//! (`key TEXT PRIMARY KEY, value BLOB, expires_at INTEGER`). SQLite has no
//! native row expiry, so the absolute deadline is stored with each row and
//! checked defensively on every read; rows found expired are reaped lazily.
//!
//! The table name is interpolated into statements and therefore validated at
//! construction; keys and values always travel as bound parameters.

use crate::backend::StorageBackend;
use crate::error::{Error, Result};
use crate::expiry::{ExpiryPolicy, deadline_passed};
use crate::ident::validate_identifier;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for [`SqliteBackend`].
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file path. Parent directories are created if needed.
    pub path: PathBuf,
    /// Table name. Must contain only ASCII letters, digits, and underscore.
    pub table: String,
    /// Store-wide default TTL applied when `set` is called without one.
    pub default_ttl: Option<Duration>,
    /// Drop the table before recreating it at construction.
    pub reset: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./kvstash.sqlite3"),
            table: "kvstash".to_string(),
            default_ttl: None,
            reset: false,
        }
    }
}

impl SqliteConfig {
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

/// SQLite-backed key-value storage backend.
///
/// Provides persistent storage with ACID guarantees. Suitable for
/// production use where durability is required.
///
/// # Thread Safety
///
/// `SqliteBackend` is `Clone` and can be shared across threads. The
/// underlying connection is protected by a Mutex.
#[derive(Clone, Debug)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Option<Connection>>>,
    table: String,
    policy: ExpiryPolicy,
}

impl SqliteBackend {
    /// Opens or creates the database and ensures the data table exists.
    ///
    /// Bootstrap is idempotent: reopening an existing store succeeds without
    /// duplicating anything. With `reset` set, the table is dropped before
    /// recreation.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The table name fails identifier validation
    /// - The parent directory cannot be created
    /// - The database cannot be opened or the table cannot be created
    pub fn open(config: SqliteConfig) -> Result<Self> {
        let table = validate_identifier(&config.table, "table")?.to_string();

        // Ensure parent directory exists before opening the database
        if let Some(parent) = config.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::bootstrap("create database directory", parent.display().to_string(), e)
            })?;
        }

        let conn = Connection::open(&config.path).map_err(|e| {
            Error::bootstrap("open database", config.path.display().to_string(), e)
        })?;

        if config.reset {
            conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))
                .map_err(|e| Error::bootstrap("drop table", table.clone(), e))?;
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key TEXT PRIMARY KEY,
                value BLOB NOT NULL,
                expires_at INTEGER
            )"
        ))
        .map_err(|e| Error::bootstrap("create table", table.clone(), e))?;

        tracing::debug!(
            table = %table,
            path = %config.path.display(),
            reset = config.reset,
            "sqlite store ready"
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            table,
            policy: ExpiryPolicy::new(config.default_ttl),
        })
    }

    /// Returns the shared connection slot for advanced use. Not part of the
    /// core contract; `None` inside means the store has been closed.
    pub fn conn(&self) -> Arc<Mutex<Option<Connection>>> {
        Arc::clone(&self.conn)
    }

    fn get_sync(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let fetched = {
            let guard = self.conn.lock();
            let conn = guard.as_ref().ok_or(Error::Closed)?;
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT value, expires_at FROM {} WHERE key = ?1",
                    self.table
                ))
                .map_err(|e| Error::backend("prepare get", e))?;
            stmt.query_row(params![key], |row| {
                Ok((
                    row.get::<_, Vec<u8>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                ))
            })
            .optional()
            .map_err(|e| Error::backend(format!("get key '{key}'"), e))?
        };

        match fetched {
            None => Ok(None),
            Some((value, expires_at)) => {
                let deadline = expires_at.map(|d| d.max(0) as u64);
                if deadline_passed(deadline)? {
                    // Lazy reap: report absent either way; cleanup is
                    // best-effort. The mutex is released above, so the
                    // delete can re-acquire it.
                    if let Err(err) = self.delete_sync(key) {
                        tracing::warn!(key = %key, error = %err, "failed to reap expired key");
                    }
                    Ok(None)
                } else {
                    Ok(Some(value))
                }
            },
        }
    }

    fn set_sync(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let resolved = self.policy.resolve(ttl)?;
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (key, value, expires_at) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![key, value, resolved.deadline.map(|d| d as i64)],
        )
        .map_err(|e| Error::backend(format!("set key '{key}'"), e))?;
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        let affected = conn
            .execute(
                &format!("DELETE FROM {} WHERE key = ?1", self.table),
                params![key],
            )
            .map_err(|e| Error::backend(format!("delete key '{key}'"), e))?;
        Ok(affected > 0)
    }

    fn reset_sync(&self) -> Result<()> {
        let guard = self.conn.lock();
        let conn = guard.as_ref().ok_or(Error::Closed)?;
        conn.execute(&format!("DELETE FROM {}", self.table), [])
            .map_err(|e| Error::backend("reset store", e))?;
        Ok(())
    }

    fn list_sync(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut live = BTreeMap::new();
        let mut expired_keys = Vec::new();

        {
            let guard = self.conn.lock();
            let conn = guard.as_ref().ok_or(Error::Closed)?;
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT key, value, expires_at FROM {}",
                    self.table
                ))
                .map_err(|e| Error::backend("prepare list", e))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                    ))
                })
                .map_err(|e| Error::backend("list entries", e))?;

            for row in rows {
                let (key, value, expires_at) =
                    row.map_err(|e| Error::backend("read list row", e))?;

                if let Some(prefix) = prefix
                    && !key.starts_with(prefix)
                {
                    continue;
                }

                let deadline = expires_at.map(|d| d.max(0) as u64);
                if deadline_passed(deadline)? {
                    expired_keys.push(key);
                } else {
                    live.insert(key, value);
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
        let mut guard = self.conn.lock();
        guard.take();
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for SqliteBackend {
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
