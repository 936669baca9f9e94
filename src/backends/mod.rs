//! Per-backend adapters.
//!
//! Each submodule binds the uniform [`crate::StorageBackend`] contract onto
//! one storage engine. The memory backend is always available; the rest are
//! feature-gated with their engine crates.

mod memory;

#[cfg(feature = "fs")]
mod filesystem;
#[cfg(feature = "moka")]
mod moka;
#[cfg(feature = "redb")]
mod redb;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::{MemoryBackend, MemoryConfig, MemoryEntry};

#[cfg(feature = "fs")]
pub use filesystem::{FilesystemBackend, FilesystemConfig};
#[cfg(feature = "moka")]
pub use moka::{MokaBackend, MokaConfig, MokaEntry};
#[cfg(feature = "redb")]
pub use redb::{RedbBackend, RedbConfig};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteBackend, SqliteConfig};
