//! One logical event stream over a sequence of physical connections.
//!
//! The state machine is explicit and the transport injectable, so
//! reconnection behavior is testable without a real network. All
//! physical-connection failures are treated as transient: the client
//! retries with jittered exponential backoff until [`StreamClient::close`]
//! is called.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dropgate_protocol::events::{Event, EventKind, GapPayload};

use crate::ClientError;
use crate::backoff::Backoff;

/// Lifecycle of the logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// First physical connection being established.
    Connecting,
    /// A physical connection is live and delivering events.
    Open,
    /// Connection lost; next attempt scheduled with backoff.
    Reconnecting { attempt: u32 },
    /// Explicitly closed; no further reconnects.
    Closed,
}

/// What the consumer receives from the logical stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    State(StreamState),
    Event(Event),
}

/// One physical connection attempt.
///
/// A successful connect yields a channel of events that ends when the
/// physical connection drops. `from` carries the resume point (last seen
/// sequence number), when one exists.
#[async_trait]
pub trait StreamTransport: Send + Sync + 'static {
    async fn connect(&self, from: Option<u64>) -> Result<mpsc::Receiver<Event>, ClientError>;
}

/// Maintains one logical stream over reconnecting physical connections,
/// de-duplicating events by `(workspace, sequenceNumber)`.
pub struct StreamClient {
    state: Arc<Mutex<StreamState>>,
    events: mpsc::Receiver<StreamEvent>,
    cancel: CancellationToken,
}

impl StreamClient {
    /// Starts the logical stream. The driver task lives until
    /// [`close`](Self::close) or until the consumer drops the client.
    pub fn connect(transport: Arc<dyn StreamTransport>, backoff: Backoff) -> Self {
        let (events_tx, events) = mpsc::channel(256);
        let state = Arc::new(Mutex::new(StreamState::Connecting));
        let cancel = CancellationToken::new();

        tokio::spawn(run(
            transport,
            backoff,
            Arc::clone(&state),
            events_tx,
            cancel.clone(),
        ));

        Self {
            state,
            events,
            cancel,
        }
    }

    /// Next state change or event. `None` after the stream has closed.
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Current state of the logical stream.
    pub fn state(&self) -> StreamState {
        *self.state.lock().unwrap()
    }

    /// Explicit close: transitions to `Closed` and performs no further
    /// reconnects.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    transport: Arc<dyn StreamTransport>,
    backoff: Backoff,
    state: Arc<Mutex<StreamState>>,
    events_tx: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
) {
    let mut last_seen: HashMap<String, u64> = HashMap::new();
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        let from = resume_point(&last_seen);
        let connect = tokio::select! {
            _ = cancel.cancelled() => break,
            result = transport.connect(from) => result,
        };

        match connect {
            Ok(mut rx) => {
                attempt = 0;
                set_state(&state, &events_tx, StreamState::Open).await;
                if !pump(&mut rx, &mut last_seen, &events_tx, &cancel).await {
                    break;
                }
                tracing::debug!("stream connection lost");
            }
            Err(e) => {
                tracing::debug!(error = %e, "stream connect failed");
            }
        }

        if cancel.is_cancelled() {
            break;
        }
        attempt = attempt.saturating_add(1);
        set_state(&state, &events_tx, StreamState::Reconnecting { attempt }).await;

        let delay = backoff.delay_for_attempt(attempt);
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    set_state(&state, &events_tx, StreamState::Closed).await;
}

/// Drains one physical connection. Returns `true` when the connection
/// dropped (reconnect), `false` when the logical stream should end.
async fn pump(
    rx: &mut mpsc::Receiver<Event>,
    last_seen: &mut HashMap<String, u64>,
    events_tx: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            item = rx.recv() => match item {
                Some(event) => {
                    if let Some(event) = dedup(last_seen, event)
                        && events_tx.send(StreamEvent::Event(event)).await.is_err()
                    {
                        // Consumer went away; stop driving the stream.
                        cancel.cancel();
                        return false;
                    }
                }
                None => return true,
            }
        }
    }
}

/// Drops already-delivered events; advances the per-workspace watermark.
/// A gap marker advances it to the end of the dropped range.
fn dedup(last_seen: &mut HashMap<String, u64>, event: Event) -> Option<Event> {
    let watermark = last_seen.entry(event.workspace_id.clone()).or_insert(0);
    let advance_to = if event.kind == EventKind::Gap {
        event
            .parse_payload::<GapPayload>()
            .map(|gap| gap.to)
            .unwrap_or(event.sequence_number)
    } else {
        event.sequence_number
    };
    if advance_to <= *watermark {
        return None;
    }
    *watermark = advance_to;
    Some(event)
}

/// Resume point across all workspaces seen so far: the smallest
/// watermark, so a shared `from` can never skip events (overlap is
/// handled by [`dedup`]).
fn resume_point(last_seen: &HashMap<String, u64>) -> Option<u64> {
    last_seen.values().copied().min()
}

async fn set_state(
    state: &Arc<Mutex<StreamState>>,
    events_tx: &mpsc::Sender<StreamEvent>,
    next: StreamState,
) {
    {
        let mut current = state.lock().unwrap();
        if *current == next {
            return;
        }
        *current = next;
    }
    let _ = events_tx.send(StreamEvent::State(next)).await;
}
