//! Protocol limits and defaults.

use std::time::Duration;

/// Default maximum size of a single uploaded file: 500 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 524_288_000;

/// Default maximum chunk size: 5 MiB.
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 5_242_880;

/// Default minimum chunk size: 1 MiB.
///
/// Anything smaller inflates per-chunk overhead (checksum, HTTP round
/// trip, storage key) without a throughput win.
pub const DEFAULT_MIN_CHUNK_SIZE: u64 = 1_048_576;

/// Hard ceiling on chunks per session.
///
/// Prevents a pathological session from declaring millions of tiny
/// chunks; the planner grows the chunk size instead of crossing this.
pub const MAX_CHUNK_COUNT: u32 = 10_000;

/// Default time-to-live for an upload session with no activity.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Default interval between expiry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Default keep-alive interval on the event stream.
///
/// Must stay below the idle-connection timeout of common reverse
/// proxies (usually 60 s).
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(20);

/// Default cap on the client's reconnect backoff.
pub const DEFAULT_MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(15);

/// Default number of events retained per workspace for replay.
pub const DEFAULT_REPLAY_BUFFER_DEPTH: usize = 256;

/// Default capacity of one subscriber's delivery queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_DEPTH: usize = 64;

/// Attempts at assembling a finalized file before the session goes
/// terminally failed.
pub const ASSEMBLY_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between assembly retries (doubled per attempt).
pub const ASSEMBLY_RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Request header carrying the hex SHA-256 checksum of a chunk body.
pub const CHECKSUM_HEADER: &str = "x-chunk-checksum";

/// Request header carrying the authenticated actor id.
pub const ACTOR_HEADER: &str = "x-actor-id";
