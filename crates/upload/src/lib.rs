//! Chunked, resumable upload engine.
//!
//! A client declares a file, receives a chunk plan, pushes chunks in any
//! order (idempotently, with per-chunk checksums), and finalizes; the
//! engine assembles the chunks into one durable object, records the
//! resulting file, and reports progress over the event bus.

mod checksum;
mod manager;
mod planner;
mod records;
mod session;
mod store;
mod validation;

pub use checksum::checksum_bytes;
pub use manager::UploadManager;
pub use planner::{ChunkPlan, plan_chunks};
pub use records::{InMemoryRecordStore, RecordStore};
pub use session::{ReceivedBitmap, UploadSession};
pub use store::SessionStore;
pub use validation::validate_file_name;

use dropgate_protocol::SessionStatus;
use dropgate_storage::StorageError;

/// Errors produced by the upload engine.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("invalid declared size: {0}")]
    InvalidSize(u64),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("workspace quota exceeded: requested {requested}, remaining {remaining}")]
    QuotaExceeded { requested: u64, remaining: u64 },

    #[error("actor is not allowed to perform this operation")]
    Unauthorized,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session expired: {0}")]
    SessionExpired(String),

    #[error("session is {status:?} and no longer accepts this operation")]
    SessionClosed { status: SessionStatus },

    #[error("chunk index {index} out of range for {chunk_count} chunks")]
    ChunkIndex { index: u32, chunk_count: u32 },

    #[error("chunk {index} has {actual} bytes, expected {expected}")]
    ChunkLength {
        index: u32,
        expected: u64,
        actual: u64,
    },

    #[error("checksum mismatch on chunk {index}")]
    ChecksumMismatch { index: u32 },

    #[error("chunk {index} already received with different content")]
    ChunkConflict { index: u32 },

    #[error("upload incomplete: {received} of {total} chunks received")]
    IncompleteUpload { received: u32, total: u32 },

    #[error("assembled file does not match the declared content hash")]
    HashMismatch,

    #[error("assembly failed: {0}")]
    AssemblyIo(StorageError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
