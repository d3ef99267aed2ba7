//! Wire types for the Dropgate ingestion pipeline.
//!
//! Shared by the server and the client crates: the event envelope pushed
//! over the live stream, the HTTP request/response payloads for the upload
//! endpoints, protocol limits, and the runtime configuration surface.

pub mod config;
pub mod constants;
pub mod events;
pub mod messages;

pub use config::{Config, ConfigError};
pub use events::{Event, EventKind, FailureReason, GapPayload, UploadProgressPayload};
pub use messages::{FileRecord, SessionStatus};
