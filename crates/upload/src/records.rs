//! The external record store, seen through the narrow interface the
//! ingestion core actually needs: quota, stream membership, and
//! FileRecord persistence.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use dropgate_protocol::FileRecord;

/// Workspace metadata operations consumed by the upload engine and the
/// stream endpoint. The real implementation lives outside this core.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Remaining storage quota for the workspace in bytes;
    /// `None` means unlimited.
    async fn remaining_quota(&self, workspace_id: &str) -> Option<u64>;

    /// Whether `actor_id` may touch `workspace_id` (upload into it,
    /// subscribe to its event stream).
    async fn is_member(&self, actor_id: &str, workspace_id: &str) -> bool;

    /// Persists a finished file. Called exactly once per successful
    /// assembly.
    async fn insert_file(&self, record: FileRecord);

    /// Looks up a finished file by id.
    async fn file(&self, file_id: &str) -> Option<FileRecord>;
}

/// Reference implementation backed by process memory.
///
/// Membership is open per workspace until members are registered for it;
/// quotas are absent until set. Keeps single-process deployments and
/// tests free of external services.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<RecordsInner>,
}

#[derive(Default)]
struct RecordsInner {
    files: HashMap<String, FileRecord>,
    quotas: HashMap<String, u64>,
    used: HashMap<String, u64>,
    members: HashMap<String, HashSet<String>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the storage quota for a workspace, in bytes.
    pub fn set_quota(&self, workspace_id: &str, bytes: u64) {
        self.inner
            .lock()
            .unwrap()
            .quotas
            .insert(workspace_id.into(), bytes);
    }

    /// Registers a member; once a workspace has any registered member,
    /// membership checks become closed for it.
    pub fn add_member(&self, actor_id: &str, workspace_id: &str) {
        self.inner
            .lock()
            .unwrap()
            .members
            .entry(workspace_id.into())
            .or_default()
            .insert(actor_id.into());
    }

    pub fn file_count(&self) -> usize {
        self.inner.lock().unwrap().files.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn remaining_quota(&self, workspace_id: &str) -> Option<u64> {
        let inner = self.inner.lock().unwrap();
        let quota = *inner.quotas.get(workspace_id)?;
        let used = inner.used.get(workspace_id).copied().unwrap_or(0);
        Some(quota.saturating_sub(used))
    }

    async fn is_member(&self, actor_id: &str, workspace_id: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        match inner.members.get(workspace_id) {
            Some(members) => members.contains(actor_id),
            None => true,
        }
    }

    async fn insert_file(&self, record: FileRecord) {
        let mut inner = self.inner.lock().unwrap();
        *inner.used.entry(record.workspace_id.clone()).or_insert(0) += record.total_size;
        inner.files.insert(record.id.clone(), record);
    }

    async fn file(&self, file_id: &str) -> Option<FileRecord> {
        self.inner.lock().unwrap().files.get(file_id).cloned()
    }
}
