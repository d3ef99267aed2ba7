//! HTTP request and response payloads for the upload endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Declares an upload and asks for a chunk plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub file_name: String,
    pub workspace_id: String,
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size_hint: Option<u64>,
    /// Hex SHA-256 of the whole file, verified at finalize when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Chunk plan returned for a new session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub session_id: String,
    pub chunk_size: u64,
    pub chunk_count: u32,
    pub expires_at: DateTime<Utc>,
}

/// Acknowledgement for one submitted chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitChunkResponse {
    pub accepted: bool,
    pub received_count: u32,
    pub total_count: u32,
}

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "assembling")]
    Assembling,
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "expired")]
    Expired,
}

impl SessionStatus {
    /// Terminal states never transition elsewhere.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Failed | SessionStatus::Expired
        )
    }
}

/// Read-only snapshot of a session, for resume decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: SessionStatus,
    pub received_count: u32,
    pub total_count: u32,
    /// Indices accepted so far, ascending.
    pub received_indices: Vec<u32>,
    pub expires_at: DateTime<Utc>,
}

/// A finished file, created only by successful assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub workspace_id: String,
    pub owner_id: String,
    pub file_name: String,
    pub total_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub storage_key: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_field_names() {
        let json = r#"{"fileName":"a.bin","workspaceId":"ws","totalSize":12582912,"chunkSizeHint":5242880}"#;
        let req: CreateUploadRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.file_name, "a.bin");
        assert_eq!(req.total_size, 12_582_912);
        assert_eq!(req.chunk_size_hint, Some(5_242_880));
        assert!(req.content_hash.is_none());
    }

    #[test]
    fn create_request_omits_empty_optionals() {
        let req = CreateUploadRequest {
            file_name: "a.bin".into(),
            workspace_id: "ws".into(),
            total_size: 1,
            chunk_size_hint: None,
            content_hash: None,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("chunkSizeHint"));
        assert!(!json.contains("contentHash"));
    }

    #[test]
    fn session_status_serialization() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Assembling).unwrap(),
            "\"assembling\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Expired).unwrap(),
            "\"expired\""
        );
    }

    #[test]
    fn terminal_states() {
        assert!(SessionStatus::Complete.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
        assert!(SessionStatus::Expired.is_terminal());
        assert!(!SessionStatus::Pending.is_terminal());
        assert!(!SessionStatus::Active.is_terminal());
        assert!(!SessionStatus::Assembling.is_terminal());
    }

    #[test]
    fn file_record_roundtrip() {
        let record = FileRecord {
            id: "f1".into(),
            workspace_id: "ws".into(),
            owner_id: "alice".into(),
            file_name: "report.pdf".into(),
            total_size: 1024,
            content_hash: None,
            storage_key: "files/ws/f1".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("contentHash"));
        let parsed: FileRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
