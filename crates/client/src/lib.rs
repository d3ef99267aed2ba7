//! Consumer-side components of the ingestion pipeline.
//!
//! [`StreamClient`] maintains one logical event stream over a sequence of
//! physical connections, reconnecting with jittered exponential backoff
//! and de-duplicating replayed events. [`ChunkUploader`] pushes a file's
//! chunks through a sink with a bounded number of simultaneous in-flight
//! chunks. Both are driven through injected traits so they are testable
//! without a network.

mod backoff;
mod stream;
mod uploader;

pub use backoff::{Backoff, JitterSource, NoJitter, RandomJitter, ReconnectConfig};
pub use stream::{StreamClient, StreamEvent, StreamState, StreamTransport};
pub use uploader::{ChunkSink, ChunkUploader, UploaderConfig};

/// Errors produced by consumer-side components.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The physical connection or request failed; always retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// A per-call deadline elapsed; retryable.
    #[error("request timed out")]
    Timeout,

    /// The server rejected the request; not retryable.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The component was closed explicitly.
    #[error("closed")]
    Closed,
}

impl ClientError {
    /// `true` for failures the caller should retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout)
    }
}
