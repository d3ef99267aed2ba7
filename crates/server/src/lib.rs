//! HTTP surface for the Dropgate ingestion pipeline.
//!
//! Exposes the upload session endpoints and the server-push event stream,
//! maps engine errors onto HTTP statuses, and owns the process lifecycle:
//! the background expiry sweep, graceful shutdown, and teardown of live
//! stream connections.

mod error;
mod server;
mod state;
mod stream;
mod uploads;

pub use error::ApiError;
pub use server::{Server, sweep_task};
pub use state::AppState;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};

/// Slack over the configured chunk size for HTTP framing overhead.
const BODY_LIMIT_SLACK: usize = 1024;

/// Errors produced by the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(#[from] dropgate_protocol::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] dropgate_storage::StorageError),

    #[error("invalid bind address: {0}")]
    BindAddr(#[from] std::net::AddrParseError),
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let chunk_body_limit = state.config.max_chunk_size as usize + BODY_LIMIT_SLACK;
    Router::new()
        .route("/uploads", post(uploads::create_upload))
        .route(
            "/uploads/{session_id}",
            get(uploads::get_upload).delete(uploads::abort_upload),
        )
        .route(
            "/uploads/{session_id}/chunks/{index}",
            put(uploads::submit_chunk),
        )
        .route("/uploads/{session_id}/finalize", post(uploads::finalize_upload))
        .route("/events/stream", get(stream::events_stream))
        .with_state(state)
}
