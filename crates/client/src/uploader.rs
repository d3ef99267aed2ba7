//! Bounded-concurrency chunk submission.
//!
//! Splits a file's bytes along the session's chunk plan and pushes each
//! chunk through an injected [`ChunkSink`], keeping at most a fixed
//! number of chunks in flight, with a per-chunk deadline and bounded
//! retries for transient failures.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use tokio::time::timeout;

use dropgate_upload::checksum_bytes;

use crate::ClientError;

/// Destination of chunk submissions (normally the HTTP PUT endpoint).
#[async_trait]
pub trait ChunkSink: Send + Sync {
    async fn submit(&self, index: u32, bytes: Vec<u8>, checksum: &str) -> Result<(), ClientError>;
}

/// Tuning for the chunk uploader.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Maximum simultaneous in-flight chunks.
    pub max_in_flight: usize,
    /// Deadline per submission attempt.
    pub chunk_timeout: Duration,
    /// Attempts per chunk before giving up.
    pub max_attempts: u32,
    /// Delay between attempts (doubled each time).
    pub retry_delay: Duration,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            chunk_timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_millis(250),
        }
    }
}

/// Pushes a session's chunks through a sink.
pub struct ChunkUploader {
    config: UploaderConfig,
}

impl ChunkUploader {
    pub fn new(config: UploaderConfig) -> Self {
        Self { config }
    }

    /// Submits every chunk of `data`, split at `chunk_size`.
    ///
    /// Submission order across chunks is not guaranteed (the server
    /// accepts chunks in any order); at most
    /// [`max_in_flight`](UploaderConfig::max_in_flight) are outstanding
    /// at once. The first non-transient failure aborts the upload.
    pub async fn upload(
        &self,
        data: &[u8],
        chunk_size: u64,
        sink: &dyn ChunkSink,
    ) -> Result<(), ClientError> {
        if chunk_size == 0 {
            return Err(ClientError::Rejected("chunk size must be positive".into()));
        }

        let chunks: Vec<(u32, Vec<u8>)> = data
            .chunks(chunk_size as usize)
            .enumerate()
            .map(|(index, chunk)| (index as u32, chunk.to_vec()))
            .collect();

        let mut submissions = stream::iter(chunks)
            .map(|(index, bytes)| self.submit_with_retry(index, bytes, sink))
            .buffer_unordered(self.config.max_in_flight);

        while let Some(result) = submissions.next().await {
            result?;
        }
        Ok(())
    }

    async fn submit_with_retry(
        &self,
        index: u32,
        bytes: Vec<u8>,
        sink: &dyn ChunkSink,
    ) -> Result<(), ClientError> {
        let checksum = checksum_bytes(&bytes);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = match timeout(
                self.config.chunk_timeout,
                sink.submit(index, bytes.clone(), &checksum),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < self.config.max_attempts => {
                    let delay = self.config.retry_delay * 2u32.saturating_pow(attempt - 1);
                    tracing::debug!(index, attempt, error = %e, "retrying chunk submission");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    tracing::warn!(index, attempt, error = %e, "chunk submission failed");
                    return Err(e);
                }
            }
        }
    }
}
