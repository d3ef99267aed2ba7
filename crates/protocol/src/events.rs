//! The event envelope pushed over the live stream.
//!
//! An [`Event`] is immutable once emitted. The bus stamps the per-workspace
//! sequence number and emission time; payloads are typed structs serialized
//! into the envelope so subscribers can decode only the kinds they care
//! about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::messages::FileRecord;

/// Enumerated event kinds carried on the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "upload.progress")]
    UploadProgress,
    #[serde(rename = "upload.complete")]
    UploadComplete,
    #[serde(rename = "upload.failed")]
    UploadFailed,
    #[serde(rename = "file.ready")]
    FileReady,
    #[serde(rename = "workspace.activity")]
    WorkspaceActivity,
    /// Synthetic marker for events dropped from a subscriber's queue.
    #[serde(rename = "events.gap")]
    Gap,
}

impl EventKind {
    /// Wire name of the kind (also the SSE event name).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::UploadProgress => "upload.progress",
            EventKind::UploadComplete => "upload.complete",
            EventKind::UploadFailed => "upload.failed",
            EventKind::FileReady => "file.ready",
            EventKind::WorkspaceActivity => "workspace.activity",
            EventKind::Gap => "events.gap",
        }
    }
}

/// One message on the event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub workspace_id: String,
    /// Strictly increasing, gapless per workspace.
    pub sequence_number: u64,
    pub payload: serde_json::Value,
    pub emitted_at: DateTime<Utc>,
}

impl Event {
    /// Builds an event with the given stamped sequence number.
    pub fn new<T: Serialize>(
        kind: EventKind,
        workspace_id: impl Into<String>,
        sequence_number: u64,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            kind,
            workspace_id: workspace_id.into(),
            sequence_number,
            payload: serde_json::to_value(payload)?,
            emitted_at: Utc::now(),
        })
    }

    /// Decodes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Reason code attached to `upload.failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Aborted,
    HashMismatch,
    AssemblyIo,
    Expired,
}

/// Payload of `upload.progress`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgressPayload {
    pub session_id: String,
    pub file_name: String,
    pub received_count: u32,
    pub total_count: u32,
    pub percentage: f64,
}

/// Payload of `upload.complete` and `file.ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadCompletePayload {
    pub session_id: String,
    pub file: FileRecord,
}

/// Payload of `upload.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadFailedPayload {
    pub session_id: String,
    pub reason: FailureReason,
}

/// Payload of `events.gap`: the inclusive range of dropped sequence numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapPayload {
    pub from: u64,
    pub to: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&EventKind::UploadProgress).unwrap(),
            "\"upload.progress\""
        );
        assert_eq!(
            serde_json::to_string(&EventKind::Gap).unwrap(),
            "\"events.gap\""
        );
        assert_eq!(EventKind::FileReady.as_str(), "file.ready");
    }

    #[test]
    fn event_json_roundtrip() {
        let payload = UploadProgressPayload {
            session_id: "s1".into(),
            file_name: "report.pdf".into(),
            received_count: 2,
            total_count: 3,
            percentage: 66.7,
        };
        let event = Event::new(EventKind::UploadProgress, "ws-1", 42, &payload).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        let parsed: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::UploadProgress);
        assert_eq!(parsed.workspace_id, "ws-1");
        assert_eq!(parsed.sequence_number, 42);
        let decoded: UploadProgressPayload = parsed.parse_payload().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn event_envelope_field_names() {
        let event = Event::new(
            EventKind::Gap,
            "ws-2",
            7,
            &GapPayload { from: 3, to: 6 },
        )
        .unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"events.gap\""));
        assert!(json.contains("\"workspaceId\":\"ws-2\""));
        assert!(json.contains("\"sequenceNumber\":7"));
        assert!(json.contains("\"emittedAt\""));
    }

    #[test]
    fn failure_reason_serialization() {
        assert_eq!(
            serde_json::to_string(&FailureReason::AssemblyIo).unwrap(),
            "\"assembly_io\""
        );
        assert_eq!(
            serde_json::to_string(&FailureReason::Aborted).unwrap(),
            "\"aborted\""
        );
    }
}
