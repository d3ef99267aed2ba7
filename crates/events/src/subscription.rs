//! Per-subscriber delivery queues.
//!
//! Each subscription owns a bounded queue filled by [`crate::EventBus`]
//! and drained by exactly one consumer (the connection task). Overflow
//! drops the oldest queued event and folds its sequence number into a
//! pending gap marker, delivered ahead of everything newer.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Notify;
use uuid::Uuid;

use dropgate_protocol::events::{Event, EventKind, GapPayload};

/// Effective starting point for one workspace of a subscription.
///
/// Events with sequence numbers greater than `last_sequence` will be
/// delivered. `resumed` is `false` when the requested resume point was no
/// longer retained and delivery starts from "now" instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartPoint {
    pub workspace_id: String,
    pub last_sequence: u64,
    pub resumed: bool,
}

pub(crate) struct SubscriptionInner {
    pub(crate) id: Uuid,
    capacity: usize,
    state: Mutex<QueueState>,
    notify: Notify,
}

struct QueueState {
    events: VecDeque<Event>,
    /// Pending dropped range per workspace, emitted before newer events.
    gaps: HashMap<String, GapPayload>,
    closed: bool,
}

impl SubscriptionInner {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            capacity,
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                gaps: HashMap::new(),
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Enqueues an event, dropping the oldest entry into a gap marker if
    /// the queue is full. Returns `false` once the subscription is closed
    /// so the bus can prune it.
    pub(crate) fn offer(&self, event: Event) -> bool {
        {
            let mut state = self.state.lock().unwrap();
            if state.closed {
                return false;
            }
            if state.events.len() >= self.capacity
                && let Some(dropped) = state.events.pop_front()
            {
                fold_into_gap(&mut state.gaps, &dropped);
            }
            state.events.push_back(event);
        }
        self.notify.notify_one();
        true
    }

    pub(crate) fn close(&self) {
        {
            let mut state = self.state.lock().unwrap();
            state.closed = true;
        }
        self.notify.notify_waiters();
    }

    fn pop(&self) -> Pop {
        let mut state = self.state.lock().unwrap();
        // A pending gap always predates everything still queued.
        let pending = state.gaps.keys().next().cloned();
        if let Some(workspace_id) = pending
            && let Some(gap) = state.gaps.remove(&workspace_id)
        {
            return Pop::Event(gap_event(workspace_id, gap));
        }
        if let Some(event) = state.events.pop_front() {
            return Pop::Event(event);
        }
        if state.closed { Pop::Closed } else { Pop::Empty }
    }
}

enum Pop {
    Event(Event),
    Empty,
    Closed,
}

/// Folds a dropped event into the pending gap for its workspace.
fn fold_into_gap(gaps: &mut HashMap<String, GapPayload>, dropped: &Event) {
    // A dropped gap marker re-contributes its original range.
    let (from, to) = if dropped.kind == EventKind::Gap {
        match dropped.parse_payload::<GapPayload>() {
            Ok(gap) => (gap.from, gap.to),
            Err(_) => (dropped.sequence_number, dropped.sequence_number),
        }
    } else {
        (dropped.sequence_number, dropped.sequence_number)
    };

    gaps.entry(dropped.workspace_id.clone())
        .and_modify(|gap| {
            gap.from = gap.from.min(from);
            gap.to = gap.to.max(to);
        })
        .or_insert(GapPayload { from, to });
}

fn gap_event(workspace_id: String, gap: GapPayload) -> Event {
    Event {
        kind: EventKind::Gap,
        workspace_id,
        sequence_number: gap.to,
        payload: serde_json::json!({ "from": gap.from, "to": gap.to }),
        emitted_at: Utc::now(),
    }
}

/// A live registration on the event bus.
///
/// Single-consumer: one connection task drains it via [`recv`](Self::recv).
/// Dropping the subscription closes it; the bus prunes closed entries on
/// the next publish.
pub struct Subscription {
    pub(crate) inner: Arc<SubscriptionInner>,
    actor_id: String,
    workspace_ids: Vec<String>,
    start_points: Vec<StartPoint>,
    last_delivered: Mutex<HashMap<String, u64>>,
}

impl Subscription {
    pub(crate) fn new(
        inner: Arc<SubscriptionInner>,
        actor_id: String,
        workspace_ids: Vec<String>,
        start_points: Vec<StartPoint>,
    ) -> Self {
        let last_delivered = start_points
            .iter()
            .map(|p| (p.workspace_id.clone(), p.last_sequence))
            .collect();
        Self {
            inner,
            actor_id,
            workspace_ids,
            start_points,
            last_delivered: Mutex::new(last_delivered),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn workspace_ids(&self) -> &[String] {
        &self.workspace_ids
    }

    /// Where delivery effectively starts, per workspace.
    pub fn start_points(&self) -> &[StartPoint] {
        &self.start_points
    }

    /// Last sequence number delivered for `workspace_id`.
    pub fn last_delivered(&self, workspace_id: &str) -> Option<u64> {
        self.last_delivered
            .lock()
            .unwrap()
            .get(workspace_id)
            .copied()
    }

    /// Waits for the next event. Returns `None` once the subscription is
    /// closed and its queue fully drained.
    pub async fn recv(&self) -> Option<Event> {
        loop {
            match self.inner.pop() {
                Pop::Event(event) => {
                    self.record_delivery(&event);
                    return Some(event);
                }
                Pop::Closed => return None,
                Pop::Empty => self.inner.notify.notified().await,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&self) -> Option<Event> {
        match self.inner.pop() {
            Pop::Event(event) => {
                self.record_delivery(&event);
                Some(event)
            }
            _ => None,
        }
    }

    /// Closes the subscription; queued events already delivered stay
    /// delivered, the rest are discarded by the bus.
    pub fn close(&self) {
        self.inner.close();
    }

    fn record_delivery(&self, event: &Event) {
        let mut last = self.last_delivered.lock().unwrap();
        let entry = last.entry(event.workspace_id.clone()).or_insert(0);
        *entry = (*entry).max(event.sequence_number);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(workspace: &str, seq: u64) -> Event {
        Event {
            kind: EventKind::WorkspaceActivity,
            workspace_id: workspace.into(),
            sequence_number: seq,
            payload: serde_json::json!({}),
            emitted_at: Utc::now(),
        }
    }

    fn subscription(capacity: usize) -> Subscription {
        Subscription::new(
            Arc::new(SubscriptionInner::new(capacity)),
            "actor".into(),
            vec!["ws".into()],
            vec![StartPoint {
                workspace_id: "ws".into(),
                last_sequence: 0,
                resumed: false,
            }],
        )
    }

    #[tokio::test]
    async fn delivers_in_order() {
        let sub = subscription(8);
        for seq in 1..=3 {
            assert!(sub.inner.offer(event("ws", seq)));
        }
        for seq in 1..=3 {
            assert_eq!(sub.recv().await.unwrap().sequence_number, seq);
        }
        assert_eq!(sub.last_delivered("ws"), Some(3));
    }

    #[tokio::test]
    async fn overflow_emits_exact_gap_range() {
        let sub = subscription(2);
        for seq in 1..=5 {
            sub.inner.offer(event("ws", seq));
        }

        // Events 1..=3 were dropped; the gap arrives first.
        let first = sub.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Gap);
        let gap: GapPayload = first.parse_payload().unwrap();
        assert_eq!(gap, GapPayload { from: 1, to: 3 });

        assert_eq!(sub.recv().await.unwrap().sequence_number, 4);
        assert_eq!(sub.recv().await.unwrap().sequence_number, 5);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn consecutive_drops_merge_into_one_gap() {
        let sub = subscription(1);
        sub.inner.offer(event("ws", 1));
        sub.inner.offer(event("ws", 2)); // drops 1 -> gap 1..=1
        sub.inner.offer(event("ws", 3)); // drops 2 -> gap 1..=2

        let first = sub.recv().await.unwrap();
        let gap: GapPayload = first.parse_payload().unwrap();
        assert_eq!(gap, GapPayload { from: 1, to: 2 });
        assert_eq!(sub.recv().await.unwrap().sequence_number, 3);
    }

    #[tokio::test]
    async fn gaps_tracked_per_workspace() {
        let sub = Subscription::new(
            Arc::new(SubscriptionInner::new(1)),
            "actor".into(),
            vec!["a".into(), "b".into()],
            vec![],
        );
        sub.inner.offer(event("a", 1));
        sub.inner.offer(event("b", 1)); // drops a:1
        sub.inner.offer(event("b", 2)); // drops b:1

        let mut gaps = Vec::new();
        let mut events = Vec::new();
        while let Some(ev) = sub.try_recv() {
            if ev.kind == EventKind::Gap {
                gaps.push((ev.workspace_id.clone(), ev.parse_payload::<GapPayload>().unwrap()));
            } else {
                events.push((ev.workspace_id.clone(), ev.sequence_number));
            }
        }
        gaps.sort_by(|x, y| x.0.cmp(&y.0));
        assert_eq!(
            gaps,
            vec![
                ("a".to_string(), GapPayload { from: 1, to: 1 }),
                ("b".to_string(), GapPayload { from: 1, to: 1 }),
            ]
        );
        assert_eq!(events, vec![("b".to_string(), 2)]);
    }

    #[tokio::test]
    async fn recv_returns_none_after_close_and_drain() {
        let sub = subscription(4);
        sub.inner.offer(event("ws", 1));
        sub.close();
        assert!(!sub.inner.offer(event("ws", 2)));

        assert_eq!(sub.recv().await.unwrap().sequence_number, 1);
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_wakes_on_offer() {
        let sub = Arc::new(subscription(4));
        let waiter = Arc::clone(&sub);
        let handle = tokio::spawn(async move { waiter.recv().await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        sub.inner.offer(event("ws", 1));

        let received = handle.await.unwrap().unwrap();
        assert_eq!(received.sequence_number, 1);
    }
}
