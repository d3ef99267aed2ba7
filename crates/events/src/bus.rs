//! The event bus: per-workspace sequence numbers, a bounded replay
//! buffer, and non-blocking fan-out to live subscriptions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;

use dropgate_protocol::Config;
use dropgate_protocol::events::{Event, EventKind};

use crate::subscription::{StartPoint, Subscription, SubscriptionInner};

/// Workspace-scoped publish/subscribe fan-out.
///
/// Construct one per process and share it by reference; the process
/// lifecycle owns creation and [`close`](Self::close).
pub struct EventBus {
    replay_depth: usize,
    queue_depth: usize,
    workspaces: Mutex<HashMap<String, WorkspaceChannel>>,
}

struct WorkspaceChannel {
    /// Sequence assigned to the next published event (starts at 1).
    next_sequence: u64,
    /// Most recent events, for resume replay.
    replay: VecDeque<Event>,
    subscribers: Vec<Arc<SubscriptionInner>>,
}

impl WorkspaceChannel {
    fn new() -> Self {
        Self {
            next_sequence: 1,
            replay: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    fn latest_sequence(&self) -> u64 {
        self.next_sequence - 1
    }
}

impl EventBus {
    pub fn new(replay_depth: usize, queue_depth: usize) -> Self {
        Self {
            replay_depth: replay_depth.max(1),
            queue_depth: queue_depth.max(1),
            workspaces: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_config(config: &Config) -> Self {
        Self::new(config.replay_buffer_depth, config.subscriber_queue_depth)
    }

    /// Publishes an event to every live subscription of `workspace_id` and
    /// returns its assigned sequence number.
    ///
    /// Never blocks and never raises toward the publisher: queue overflow
    /// on a slow subscriber is resolved by that subscriber's gap marker,
    /// and a payload that fails to serialize is logged and skipped
    /// (sequence numbers stay gapless).
    pub fn publish<T: Serialize>(&self, kind: EventKind, workspace_id: &str, payload: &T) -> u64 {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(kind = kind.as_str(), workspace = workspace_id, error = %e, "dropping unserializable event payload");
                let workspaces = self.workspaces.lock().unwrap();
                return workspaces
                    .get(workspace_id)
                    .map(WorkspaceChannel::latest_sequence)
                    .unwrap_or(0);
            }
        };

        let mut workspaces = self.workspaces.lock().unwrap();
        let channel = workspaces
            .entry(workspace_id.to_string())
            .or_insert_with(WorkspaceChannel::new);

        let sequence = channel.next_sequence;
        channel.next_sequence += 1;

        let event = Event {
            kind,
            workspace_id: workspace_id.to_string(),
            sequence_number: sequence,
            payload,
            emitted_at: Utc::now(),
        };

        channel.replay.push_back(event.clone());
        while channel.replay.len() > self.replay_depth {
            channel.replay.pop_front();
        }

        // Offer to each subscriber; prune the ones that have closed.
        channel
            .subscribers
            .retain(|subscriber| subscriber.offer(event.clone()));

        tracing::trace!(
            kind = kind.as_str(),
            workspace = workspace_id,
            sequence,
            subscribers = channel.subscribers.len(),
            "published event"
        );
        sequence
    }

    /// Registers a subscription for `workspace_ids`.
    ///
    /// With `from_sequence`, events still retained in the replay buffer
    /// are queued first; each [`StartPoint`] reports whether the resume
    /// point was honored or delivery starts from "now".
    pub fn subscribe(
        &self,
        actor_id: impl Into<String>,
        workspace_ids: Vec<String>,
        from_sequence: Option<u64>,
    ) -> Subscription {
        let inner = Arc::new(SubscriptionInner::new(self.queue_depth));
        let mut start_points = Vec::with_capacity(workspace_ids.len());

        let mut workspaces = self.workspaces.lock().unwrap();
        for workspace_id in &workspace_ids {
            let channel = workspaces
                .entry(workspace_id.clone())
                .or_insert_with(WorkspaceChannel::new);
            let latest = channel.latest_sequence();

            let start = match from_sequence {
                Some(from) if from >= latest => StartPoint {
                    workspace_id: workspace_id.clone(),
                    last_sequence: from.min(latest),
                    resumed: true,
                },
                Some(from) => {
                    let oldest_retained = channel
                        .replay
                        .front()
                        .map(|e| e.sequence_number)
                        .unwrap_or(u64::MAX);
                    if oldest_retained <= from + 1 {
                        for event in channel.replay.iter().filter(|e| e.sequence_number > from) {
                            inner.offer(event.clone());
                        }
                        StartPoint {
                            workspace_id: workspace_id.clone(),
                            last_sequence: from,
                            resumed: true,
                        }
                    } else {
                        // Resume point fell out of the buffer; start fresh
                        // and say so.
                        StartPoint {
                            workspace_id: workspace_id.clone(),
                            last_sequence: latest,
                            resumed: false,
                        }
                    }
                }
                None => StartPoint {
                    workspace_id: workspace_id.clone(),
                    last_sequence: latest,
                    resumed: false,
                },
            };

            start_points.push(start);
            channel.subscribers.push(Arc::clone(&inner));
        }
        drop(workspaces);

        let actor_id = actor_id.into();
        tracing::debug!(
            subscription = %inner.id,
            actor = %actor_id,
            workspaces = workspace_ids.len(),
            "subscription created"
        );
        Subscription::new(inner, actor_id, workspace_ids, start_points)
    }

    /// Highest sequence number assigned for `workspace_id` (0 if none).
    pub fn latest_sequence(&self, workspace_id: &str) -> u64 {
        let workspaces = self.workspaces.lock().unwrap();
        workspaces
            .get(workspace_id)
            .map(WorkspaceChannel::latest_sequence)
            .unwrap_or(0)
    }

    /// Live subscription count for `workspace_id`, after pruning.
    pub fn subscriber_count(&self, workspace_id: &str) -> usize {
        let workspaces = self.workspaces.lock().unwrap();
        workspaces
            .get(workspace_id)
            .map(|c| c.subscribers.len())
            .unwrap_or(0)
    }

    /// Closes every live subscription. Part of process teardown.
    pub fn close(&self) {
        let mut workspaces = self.workspaces.lock().unwrap();
        for channel in workspaces.values_mut() {
            for subscriber in channel.subscribers.drain(..) {
                subscriber.close();
            }
        }
    }
}
