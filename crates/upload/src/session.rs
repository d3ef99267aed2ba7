//! Server-side bookkeeping for one file transfer in progress.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::time::Duration;

use dropgate_protocol::SessionStatus;

use crate::planner::ChunkPlan;

/// Set of chunk indices received and verified, fixed-capacity.
#[derive(Debug, Clone)]
pub struct ReceivedBitmap {
    words: Vec<u64>,
    capacity: u32,
    count: u32,
}

impl ReceivedBitmap {
    pub fn new(capacity: u32) -> Self {
        let words = vec![0u64; capacity.div_ceil(64) as usize];
        Self {
            words,
            capacity,
            count: 0,
        }
    }

    /// Marks `index` received. Returns `true` if it was newly set.
    pub fn mark(&mut self, index: u32) -> bool {
        debug_assert!(index < self.capacity);
        let word = (index / 64) as usize;
        let bit = 1u64 << (index % 64);
        if self.words[word] & bit != 0 {
            return false;
        }
        self.words[word] |= bit;
        self.count += 1;
        true
    }

    pub fn contains(&self, index: u32) -> bool {
        if index >= self.capacity {
            return false;
        }
        self.words[(index / 64) as usize] & (1u64 << (index % 64)) != 0
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_complete(&self) -> bool {
        self.count == self.capacity
    }

    /// Received indices, ascending.
    pub fn indices(&self) -> Vec<u32> {
        (0..self.capacity).filter(|i| self.contains(*i)).collect()
    }
}

/// One in-flight upload.
///
/// Mutated only by the session manager under the per-session lock held by
/// the session store entry.
#[derive(Debug)]
pub struct UploadSession {
    pub id: String,
    pub owner_id: String,
    pub workspace_id: String,
    pub file_name: String,
    pub declared_total_size: u64,
    pub content_hash: Option<String>,
    pub chunk_size: u64,
    pub chunk_count: u32,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub assembly_attempts: u32,
    received: ReceivedBitmap,
    /// Hex checksum of each received chunk, for idempotent resubmits.
    chunk_checksums: Vec<Option<String>>,
    /// Indices whose bytes are being written right now (reserved, not yet
    /// marked received). Keeps concurrent same-index submits from racing
    /// the object store.
    in_flight: HashSet<u32>,
}

impl UploadSession {
    pub fn new(
        id: String,
        owner_id: String,
        workspace_id: String,
        file_name: String,
        content_hash: Option<String>,
        plan: ChunkPlan,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX);
        let expires_at = created_at
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            id,
            owner_id,
            workspace_id,
            file_name,
            declared_total_size: plan.total_size,
            content_hash,
            chunk_size: plan.chunk_size,
            chunk_count: plan.chunk_count,
            status: SessionStatus::Pending,
            created_at,
            expires_at,
            assembly_attempts: 0,
            received: ReceivedBitmap::new(plan.chunk_count),
            chunk_checksums: vec![None; plan.chunk_count as usize],
            in_flight: HashSet::new(),
        }
    }

    pub fn plan(&self) -> ChunkPlan {
        ChunkPlan {
            total_size: self.declared_total_size,
            chunk_size: self.chunk_size,
            chunk_count: self.chunk_count,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// `true` while the session accepts chunk submissions.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self.status, SessionStatus::Pending | SessionStatus::Active)
    }

    pub fn received(&self) -> &ReceivedBitmap {
        &self.received
    }

    pub fn chunk_checksum(&self, index: u32) -> Option<&str> {
        self.chunk_checksums
            .get(index as usize)
            .and_then(|c| c.as_deref())
    }

    /// Reserves `index` for writing. Returns `false` if another writer
    /// already holds the reservation.
    pub fn reserve_chunk(&mut self, index: u32) -> bool {
        self.in_flight.insert(index)
    }

    pub fn release_chunk(&mut self, index: u32) {
        self.in_flight.remove(&index);
    }

    /// Records a verified chunk: marks the bitmap, stores its checksum and
    /// moves `pending -> active` on the first chunk.
    pub fn record_chunk(&mut self, index: u32, checksum: String) {
        self.in_flight.remove(&index);
        if self.received.mark(index) {
            self.chunk_checksums[index as usize] = Some(checksum);
        }
        if self.status == SessionStatus::Pending {
            self.status = SessionStatus::Active;
        }
    }

    /// Percentage of chunks received, 0–100.
    pub fn percentage(&self) -> f64 {
        if self.chunk_count == 0 {
            return 0.0;
        }
        f64::from(self.received.count()) / f64::from(self.chunk_count) * 100.0
    }
}
