//! Filesystem-backed storage backend.
//!
//! Object-store layout: a bucket directory under a configured root, one file
//! per key. Keys are percent-encoded into file names so arbitrary key strings
//! (slashes, dots, unicode) map to flat, reversible names that cannot escape
//! the bucket. Each file holds the JSON entry envelope with the absolute
//! deadline; reads check it defensively, and the lazy reap of an expired
//! entry is fired off as a background task so the read never waits on it.
//! Writes land in a temp file and rename into place, so an interrupted write
//! never corrupts the previous value.

use crate::backend::StorageBackend;
use crate::entry::StoredEntry;
use crate::error::{Error, Result};
use crate::expiry::ExpiryPolicy;
use crate::ident::validate_identifier;
use async_trait::async_trait;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, percent_encode};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Everything outside `[A-Za-z0-9_-]` is encoded, including `.`, so an
/// encoded name can never form `..` or a path separator. Because `.` never
/// appears in an encoded name, the `.tmp` suffix of in-flight writes is
/// unambiguous.
const OBJECT_NAME: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_');

/// Uniquifies temp file names for concurrent writers of the same key.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Configuration for [`FilesystemBackend`].
#[derive(Debug, Clone)]
pub struct FilesystemConfig {
    /// Root directory holding bucket directories.
    pub root: PathBuf,
    /// Bucket name. Must contain only ASCII letters, digits, and underscore.
    pub bucket: String,
    /// Store-wide default TTL applied when `set` is called without one.
    pub default_ttl: Option<Duration>,
    /// Wipe the bucket directory at construction.
    pub reset: bool,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./kvstash"),
            bucket: "kvstash".to_string(),
            default_ttl: None,
            reset: false,
        }
    }
}

impl FilesystemConfig {
    /// Sets the root directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the bucket name.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Sets the store-wide default TTL.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Requests a bucket wipe at construction.
    #[must_use]
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }
}

/// Filesystem-backed key-value storage backend.
///
/// Persistent, dependency-free storage for small data sets. Every operation
/// is a filesystem round-trip; `list` scans the whole bucket.
///
/// # Thread Safety
///
/// `FilesystemBackend` is `Clone` and can be shared across threads. Writes to
/// the same key race at the filesystem level (last-write-wins).
#[derive(Clone, Debug)]
pub struct FilesystemBackend {
    bucket_dir: PathBuf,
    policy: ExpiryPolicy,
    closed: Arc<AtomicBool>,
}

impl FilesystemBackend {
    /// Creates or opens the bucket directory.
    ///
    /// Bootstrap is idempotent: opening an existing bucket succeeds without
    /// touching its contents. With `reset` set, the bucket directory is
    /// removed and recreated empty.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The bucket name fails identifier validation
    /// - The bucket directory cannot be created (or wiped, on reset)
    pub fn open(config: FilesystemConfig) -> Result<Self> {
        let bucket = validate_identifier(&config.bucket, "bucket")?;
        let bucket_dir = config.root.join(bucket);

        if config.reset && bucket_dir.exists() {
            std::fs::remove_dir_all(&bucket_dir).map_err(|e| {
                Error::bootstrap("wipe bucket", bucket_dir.display().to_string(), e)
            })?;
        }

        std::fs::create_dir_all(&bucket_dir).map_err(|e| {
            Error::bootstrap("create bucket", bucket_dir.display().to_string(), e)
        })?;

        tracing::debug!(
            bucket = %bucket,
            dir = %bucket_dir.display(),
            reset = config.reset,
            "filesystem store ready"
        );

        Ok(Self {
            bucket_dir,
            policy: ExpiryPolicy::new(config.default_ttl),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Returns the bucket directory for advanced use. Not part of the core
    /// contract.
    pub fn bucket_dir(&self) -> &Path {
        &self.bucket_dir
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.bucket_dir
            .join(percent_encode(key.as_bytes(), OBJECT_NAME).to_string())
    }

    fn read_sync(path: &Path, key: &str) -> Result<Option<StoredEntry>> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::backend(format!("read object for key '{key}'"), e)),
        };
        let entry = serde_json::from_slice::<StoredEntry>(&data)
            .map_err(|e| Error::backend(format!("decode entry for key '{key}'"), e))?;
        Ok(Some(entry))
    }

    fn set_sync(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let resolved = self.policy.resolve(ttl)?;
        let entry = StoredEntry::new(value, resolved.deadline);
        let json =
            serde_json::to_vec(&entry).map_err(|e| Error::backend("encode entry", e))?;

        // Write to a temp file in the bucket and rename over the target so
        // a crash mid-write never leaves a truncated envelope behind.
        let encoded = percent_encode(key.as_bytes(), OBJECT_NAME).to_string();
        let tmp_path = self.bucket_dir.join(format!(
            "{encoded}.tmp-{}-{}",
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed)
        ));
        std::fs::write(&tmp_path, json)
            .map_err(|e| Error::backend(format!("write object for key '{key}'"), e))?;
        if let Err(e) = std::fs::rename(&tmp_path, self.bucket_dir.join(encoded)) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(Error::backend(format!("write object for key '{key}'"), e));
        }
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.object_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::backend(format!("delete object for key '{key}'"), e)),
        }
    }

    fn reset_sync(&self) -> Result<()> {
        let entries = std::fs::read_dir(&self.bucket_dir)
            .map_err(|e| Error::backend("read bucket directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::backend("read bucket directory", e))?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                std::fs::remove_file(entry.path())
                    .map_err(|e| Error::backend("remove object", e))?;
            }
        }
        Ok(())
    }

    fn list_sync(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        let mut live = BTreeMap::new();

        let entries = std::fs::read_dir(&self.bucket_dir)
            .map_err(|e| Error::backend("read bucket directory", e))?;
        for dir_entry in entries {
            let dir_entry = dir_entry.map_err(|e| Error::backend("read bucket directory", e))?;
            if !dir_entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let file_name = dir_entry.file_name();
            let Some(encoded) = file_name.to_str() else {
                continue;
            };
            // Encoded object names never contain '.'; anything with one is
            // an in-flight temp file.
            if encoded.contains('.') {
                continue;
            }
            let Ok(key) = percent_decode_str(encoded).decode_utf8() else {
                tracing::warn!(file = %encoded, "skipping undecodable object name in list");
                continue;
            };
            let key = key.into_owned();

            if let Some(prefix) = prefix
                && !key.starts_with(prefix)
            {
                continue;
            }

            let Some(entry) = Self::read_sync(&dir_entry.path(), &key)? else {
                // Deleted between the scan and the read.
                continue;
            };
            if !entry.is_expired()? {
                live.insert(key, entry.value);
            }
        }

        Ok(live)
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_open()?;
        let path = self.object_path(key);
        let owned_key = key.to_string();
        let entry = tokio::task::spawn_blocking(move || Self::read_sync(&path, &owned_key))
            .await
            .map_err(|e| Error::backend("join blocking task", e))??;

        match entry {
            None => Ok(None),
            Some(entry) => {
                if entry.is_expired()? {
                    // Fire-and-forget reap; the read already reports absent.
                    let backend = self.clone();
                    let key = key.to_string();
                    tokio::spawn(async move {
                        let reap =
                            tokio::task::spawn_blocking(move || backend.delete_sync(&key)).await;
                        if let Ok(Err(err)) = reap {
                            tracing::warn!(error = %err, "failed to reap expired key");
                        }
                    });
                    Ok(None)
                } else {
                    Ok(Some(entry.value))
                }
            },
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.check_open()?;
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.set_sync(&key, value, ttl))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check_open()?;
        let backend = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || backend.delete_sync(&key))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn reset(&self) -> Result<()> {
        self.check_open()?;
        let backend = self.clone();
        tokio::task::spawn_blocking(move || backend.reset_sync())
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn list(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Vec<u8>>> {
        self.check_open()?;
        let backend = self.clone();
        let prefix = prefix.map(ToString::to_string);
        tokio::task::spawn_blocking(move || backend.list_sync(prefix.as_deref()))
            .await
            .map_err(|e| Error::backend("join blocking task", e))?
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
