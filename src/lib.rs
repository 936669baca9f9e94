//! Expiring key-value storage adapters with a uniform TTL contract.
//!
//! One logical contract - a key-value pair with an optional time-to-live,
//! after which `get` behaves as if the key never existed - implemented
//! consistently across backends with very different native expiry
//! capabilities:
//!
//! - **MemoryBackend**: in-process `DashMap`, non-persistent, defensive
//!   expiry checks (always available)
//! - **MokaBackend**: in-process cache with engine-enforced per-entry TTL
//!   (`moka` feature)
//! - **SqliteBackend**: SQL table with a stored deadline column and lazy
//!   reaping (`sqlite` feature)
//! - **RedbBackend**: embedded ACID database, JSON entry envelope, lazy
//!   reaping (`redb` feature)
//! - **FilesystemBackend**: bucket directory with one object file per key
//!   (`fs` feature)
//!
//! # Example
//!
//! ```no_run
//! use kvstash::{Store, backends::SqliteConfig};
//! use std::time::Duration;
//!
//! # async fn run() -> kvstash::Result<()> {
//! // In-memory (testing/embedding)
//! let store = Store::memory();
//! store.set("key", b"value", None).await?;
//!
//! // Persistent (production)
//! let store = Store::sqlite(SqliteConfig::default().with_path("./data/kv.sqlite3"))?;
//! store.set("key", b"value", Some(Duration::from_secs(60))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Custom Backends
//!
//! Implement the [`StorageBackend`] trait to plug in external engines
//! (Redis, S3, Cassandra, ...):
//!
//! ```ignore
//! use kvstash::{Store, StorageBackend};
//!
//! struct RedisBackend { /* ... */ }
//! impl StorageBackend for RedisBackend { /* ... */ }
//!
//! let store = Store::custom(RedisBackend::new());
//! ```

mod backend;
pub mod backends;
mod entry;
mod error;
mod expiry;
mod ident;
mod store;

pub use backend::StorageBackend;
pub use error::{BoxError, Error, Result};
pub use expiry::{ExpiryPolicy, ResolvedExpiry};
pub use store::Store;
