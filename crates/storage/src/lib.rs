//! Durable object storage behind a capability interface.
//!
//! The ingestion pipeline only ever talks to [`ObjectStore`]: put a blob
//! under a key, read it back, delete it, and compose several keys into one
//! object in order. Implementations are selected at construction time:
//! [`MemoryStore`] for tests and single-process setups, [`DiskStore`] for a
//! local data directory.

mod disk;
mod memory;
mod retry;

pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use retry::{RetryPolicy, with_retry};

use async_trait::async_trait;

/// Errors produced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    /// `true` for failures worth retrying (transient I/O).
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}

/// Byte storage keyed by slash-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Reads the object at `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Removes the object at `key`. Removing a missing key is a no-op.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Concatenates `sources` in order into a single object at `dest`
    /// and returns its total size. Sources are left in place.
    async fn compose(&self, sources: &[String], dest: &str) -> Result<u64, StorageError>;
}

/// Rejects keys that could escape the backing directory.
///
/// Keys are relative slash-separated paths; empty segments, `.`/`..`
/// and leading slashes are refused.
pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty() || key.starts_with('/') {
        return Err(StorageError::InvalidKey(key.into()));
    }
    for segment in key.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." {
            return Err(StorageError::InvalidKey(key.into()));
        }
    }
    Ok(())
}
