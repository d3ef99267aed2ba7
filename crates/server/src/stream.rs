//! The server-push event stream.
//!
//! One SSE response owns exactly one bus subscription. The subscription
//! queue is drained in order onto the response; dropping the response
//! (client disconnect, server shutdown) drops the subscription, which the
//! bus prunes on its next publish.

use std::convert::Infallible;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures_util::stream;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use dropgate_events::Subscription;
use dropgate_protocol::events::Event;

use crate::error::{ApiError, require_actor};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Workspace ids of interest, comma-separated.
    pub workspace: String,
    /// Resume point: last sequence number the client has seen.
    pub from: Option<u64>,
}

/// `GET /events/stream?workspace={ids}&from={seq?}`
pub async fn events_stream(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StreamQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let actor = require_actor(&headers)?;

    let workspaces: Vec<String> = query
        .workspace
        .split(',')
        .map(str::trim)
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();
    if workspaces.is_empty() {
        return Err(ApiError::bad_request("at least one workspace is required"));
    }

    for workspace in &workspaces {
        if !state.records.is_member(&actor, workspace).await {
            return Err(ApiError::unauthorized(format!(
                "actor may not subscribe to workspace {workspace}"
            )));
        }
    }

    let subscription = state.bus.subscribe(&actor, workspaces, query.from);
    tracing::info!(actor = %actor, from = ?query.from, "event stream opened");

    let opening = stream::iter(vec![Ok(start_frame(&subscription))]);
    let live = stream::unfold(subscription, |subscription| async move {
        loop {
            match subscription.recv().await {
                Some(event) => match to_sse(&event) {
                    Some(frame) => return Some((Ok(frame), subscription)),
                    None => continue,
                },
                None => return None,
            }
        }
    });

    Ok(Sse::new(opening.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(state.config.keep_alive)
            .text("keep-alive"),
    ))
}

/// First frame on every stream: where delivery effectively starts, so a
/// resuming client knows whether its `from` was honored.
fn start_frame(subscription: &Subscription) -> SseEvent {
    let starts: Vec<serde_json::Value> = subscription
        .start_points()
        .iter()
        .map(|p| {
            serde_json::json!({
                "workspaceId": p.workspace_id,
                "lastSequence": p.last_sequence,
                "resumed": p.resumed,
            })
        })
        .collect();
    SseEvent::default()
        .event("stream.start")
        .data(serde_json::json!(starts).to_string())
}

fn to_sse(event: &Event) -> Option<SseEvent> {
    let data = match serde_json::to_string(event) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!(error = %e, "skipping unserializable event");
            return None;
        }
    };
    Some(
        SseEvent::default()
            .event(event.kind.as_str())
            .id(event.sequence_number.to_string())
            .data(data),
    )
}
