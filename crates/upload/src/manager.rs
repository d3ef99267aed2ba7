//! Orchestrates chunk admission, assembly and expiry for all sessions.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use dropgate_events::EventBus;
use dropgate_protocol::constants::{ASSEMBLY_RETRY_ATTEMPTS, ASSEMBLY_RETRY_BASE_DELAY};
use dropgate_protocol::events::{
    EventKind, FailureReason, UploadCompletePayload, UploadFailedPayload, UploadProgressPayload,
};
use dropgate_protocol::messages::{
    CreateUploadRequest, CreateUploadResponse, SessionStatusResponse, SubmitChunkResponse,
};
use dropgate_protocol::{Config, FileRecord, SessionStatus};
use dropgate_storage::{ObjectStore, RetryPolicy, with_retry};

use crate::checksum::checksum_bytes;
use crate::planner::plan_chunks;
use crate::records::RecordStore;
use crate::session::UploadSession;
use crate::store::{SessionHandle, SessionStore};
use crate::validation::validate_file_name;
use crate::UploadError;

fn chunk_key(session_id: &str, index: u32) -> String {
    format!("uploads/{session_id}/{index}")
}

fn file_key(workspace_id: &str, file_id: &str) -> String {
    format!("files/{workspace_id}/{file_id}")
}

/// The upload session manager.
///
/// All mutation of a session happens under that session's own lock;
/// chunk bytes are moved to the object store outside it, guarded by a
/// per-index reservation so concurrent submits of the same index cannot
/// race the store.
pub struct UploadManager {
    config: Config,
    sessions: SessionStore,
    objects: Arc<dyn ObjectStore>,
    records: Arc<dyn RecordStore>,
    bus: Arc<EventBus>,
    retry: RetryPolicy,
}

impl UploadManager {
    pub fn new(
        config: Config,
        objects: Arc<dyn ObjectStore>,
        records: Arc<dyn RecordStore>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            sessions: SessionStore::new(),
            objects,
            records,
            bus,
            retry: RetryPolicy::new(ASSEMBLY_RETRY_ATTEMPTS, ASSEMBLY_RETRY_BASE_DELAY),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of registered (non-purged) sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Validates the declaration, computes the chunk plan and registers a
    /// `pending` session.
    pub async fn create_session(
        &self,
        actor: &str,
        req: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, UploadError> {
        validate_file_name(&req.file_name)?;

        if !self.records.is_member(actor, &req.workspace_id).await {
            return Err(UploadError::Unauthorized);
        }

        let plan = plan_chunks(req.total_size, req.chunk_size_hint, &self.config)?;

        if let Some(remaining) = self.records.remaining_quota(&req.workspace_id).await
            && req.total_size > remaining
        {
            return Err(UploadError::QuotaExceeded {
                requested: req.total_size,
                remaining,
            });
        }

        let session = UploadSession::new(
            Uuid::new_v4().to_string(),
            actor.to_string(),
            req.workspace_id.clone(),
            req.file_name.clone(),
            req.content_hash.as_deref().map(str::to_ascii_lowercase),
            plan,
            self.config.session_ttl,
        );

        let response = CreateUploadResponse {
            session_id: session.id.clone(),
            chunk_size: session.chunk_size,
            chunk_count: session.chunk_count,
            expires_at: session.expires_at,
        };

        tracing::info!(
            session = %session.id,
            workspace = %session.workspace_id,
            owner = %session.owner_id,
            total_size = session.declared_total_size,
            chunk_count = session.chunk_count,
            "upload session created"
        );
        self.sessions.insert(session);
        Ok(response)
    }

    /// Validates and persists one chunk.
    ///
    /// Idempotent: resubmitting an already-received index with the same
    /// checksum is a no-op success; a different checksum is a conflict
    /// and mutates nothing.
    pub async fn submit_chunk(
        &self,
        actor: &str,
        session_id: &str,
        index: u32,
        bytes: Vec<u8>,
        checksum: &str,
    ) -> Result<SubmitChunkResponse, UploadError> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.into()))?;

        let digest = checksum_bytes(&bytes);
        let checksum = checksum.to_ascii_lowercase();

        // Admission, under the per-session lock.
        {
            let mut session = handle.lock().unwrap();
            if session.owner_id != actor {
                return Err(UploadError::Unauthorized);
            }
            if session.is_expired_at(Utc::now()) {
                return Err(UploadError::SessionExpired(session_id.into()));
            }
            if !session.accepts_chunks() {
                return Err(UploadError::SessionClosed {
                    status: session.status,
                });
            }

            let plan = session.plan();
            if index >= plan.chunk_count {
                return Err(UploadError::ChunkIndex {
                    index,
                    chunk_count: plan.chunk_count,
                });
            }
            if digest != checksum {
                return Err(UploadError::ChecksumMismatch { index });
            }
            if session.received().contains(index) {
                if session.chunk_checksum(index) == Some(digest.as_str()) {
                    // At-least-once retry of a delivered chunk.
                    return Ok(SubmitChunkResponse {
                        accepted: true,
                        received_count: session.received().count(),
                        total_count: session.chunk_count,
                    });
                }
                return Err(UploadError::ChunkConflict { index });
            }

            let expected = plan.chunk_len(index);
            if bytes.len() as u64 != expected {
                return Err(UploadError::ChunkLength {
                    index,
                    expected,
                    actual: bytes.len() as u64,
                });
            }
            if !session.reserve_chunk(index) {
                // Another writer is persisting this index right now.
                return Err(UploadError::ChunkConflict { index });
            }
        }

        // Persist the bytes outside the lock.
        let key = chunk_key(session_id, index);
        let write = with_retry(&self.retry, || self.objects.put(&key, bytes.clone())).await;

        let (received_count, total_count, workspace_id, file_name, percentage) = {
            let mut session = handle.lock().unwrap();
            if let Err(e) = write {
                session.release_chunk(index);
                return Err(UploadError::Storage(e));
            }
            if !session.accepts_chunks() {
                // Aborted or expired while we were writing; drop the orphan.
                session.release_chunk(index);
                let status = session.status;
                drop(session);
                self.delete_best_effort(&key).await;
                return Err(UploadError::SessionClosed { status });
            }
            session.record_chunk(index, digest);
            (
                session.received().count(),
                session.chunk_count,
                session.workspace_id.clone(),
                session.file_name.clone(),
                session.percentage(),
            )
        };

        self.bus.publish(
            EventKind::UploadProgress,
            &workspace_id,
            &UploadProgressPayload {
                session_id: session_id.into(),
                file_name,
                received_count,
                total_count,
                percentage,
            },
        );

        tracing::debug!(
            session = session_id,
            index,
            received = received_count,
            total = total_count,
            "chunk accepted"
        );
        Ok(SubmitChunkResponse {
            accepted: true,
            received_count,
            total_count,
        })
    }

    /// Assembles a fully-received session into one durable object and
    /// records the file.
    pub async fn finalize(&self, actor: &str, session_id: &str) -> Result<FileRecord, UploadError> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.into()))?;

        // Admission and the `-> assembling` transition.
        let (workspace_id, owner_id, file_name, content_hash, plan) = {
            let mut session = handle.lock().unwrap();
            if session.owner_id != actor {
                return Err(UploadError::Unauthorized);
            }
            match session.status {
                SessionStatus::Expired => {
                    return Err(UploadError::SessionExpired(session_id.into()));
                }
                SessionStatus::Assembling | SessionStatus::Complete => {
                    return Err(UploadError::SessionClosed {
                        status: session.status,
                    });
                }
                SessionStatus::Failed => {
                    // Only assembly failures may retry, and only within
                    // the attempt budget. Aborts are terminal.
                    if session.assembly_attempts == 0
                        || session.assembly_attempts >= ASSEMBLY_RETRY_ATTEMPTS
                    {
                        return Err(UploadError::SessionClosed {
                            status: session.status,
                        });
                    }
                }
                SessionStatus::Pending | SessionStatus::Active => {}
            }
            if session.is_expired_at(Utc::now()) {
                return Err(UploadError::SessionExpired(session_id.into()));
            }
            if !session.received().is_complete() {
                return Err(UploadError::IncompleteUpload {
                    received: session.received().count(),
                    total: session.chunk_count,
                });
            }
            session.status = SessionStatus::Assembling;
            session.assembly_attempts += 1;
            (
                session.workspace_id.clone(),
                session.owner_id.clone(),
                session.file_name.clone(),
                session.content_hash.clone(),
                session.plan(),
            )
        };

        let sources: Vec<String> = (0..plan.chunk_count)
            .map(|i| chunk_key(session_id, i))
            .collect();
        let file_id = Uuid::new_v4().to_string();
        let dest = file_key(&workspace_id, &file_id);

        let assembled_size =
            match with_retry(&self.retry, || self.objects.compose(&sources, &dest)).await {
                Ok(size) => size,
                Err(e) => {
                    return Err(self
                        .fail_assembly(&handle, session_id, &workspace_id, FailureReason::AssemblyIo, e)
                        .await);
                }
            };

        if assembled_size != plan.total_size {
            let e = dropgate_storage::StorageError::Io(std::io::Error::other(format!(
                "assembled {assembled_size} bytes, declared {}",
                plan.total_size
            )));
            self.delete_best_effort(&dest).await;
            return Err(self
                .fail_assembly(&handle, session_id, &workspace_id, FailureReason::AssemblyIo, e)
                .await);
        }

        if let Some(expected) = &content_hash {
            let assembled = match with_retry(&self.retry, || self.objects.get(&dest)).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.delete_best_effort(&dest).await;
                    return Err(self
                        .fail_assembly(&handle, session_id, &workspace_id, FailureReason::AssemblyIo, e)
                        .await);
                }
            };
            if checksum_bytes(&assembled) != *expected {
                self.delete_best_effort(&dest).await;
                {
                    let mut session = handle.lock().unwrap();
                    session.status = SessionStatus::Failed;
                    // Deterministic mismatch: retrying cannot help.
                    session.assembly_attempts = ASSEMBLY_RETRY_ATTEMPTS;
                }
                self.publish_failed(&workspace_id, session_id, FailureReason::HashMismatch);
                tracing::warn!(session = session_id, "content hash mismatch on finalize");
                return Err(UploadError::HashMismatch);
            }
        }

        let record = FileRecord {
            id: file_id,
            workspace_id: workspace_id.clone(),
            owner_id,
            file_name,
            total_size: assembled_size,
            content_hash,
            storage_key: dest,
            created_at: Utc::now(),
        };
        self.records.insert_file(record.clone()).await;

        {
            let mut session = handle.lock().unwrap();
            session.status = SessionStatus::Complete;
        }
        // The session is done; the FileRecord replaces it.
        self.sessions.remove(session_id);

        for source in &sources {
            self.delete_best_effort(source).await;
        }

        self.bus.publish(
            EventKind::UploadComplete,
            &workspace_id,
            &UploadCompletePayload {
                session_id: session_id.into(),
                file: record.clone(),
            },
        );
        self.bus.publish(
            EventKind::FileReady,
            &workspace_id,
            &UploadCompletePayload {
                session_id: session_id.into(),
                file: record.clone(),
            },
        );

        tracing::info!(
            session = session_id,
            file = %record.id,
            size = record.total_size,
            "upload finalized"
        );
        Ok(record)
    }

    /// Aborts an upload: the session stops accepting chunks and its chunk
    /// storage is reclaimed. Aborting a terminal session is a no-op.
    pub async fn abort(&self, actor: &str, session_id: &str) -> Result<(), UploadError> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.into()))?;

        let (workspace_id, keys) = {
            let mut session = handle.lock().unwrap();
            if session.owner_id != actor {
                return Err(UploadError::Unauthorized);
            }
            if session.status.is_terminal() {
                return Ok(());
            }
            if session.status == SessionStatus::Assembling {
                // Finalize owns the session until assembly settles.
                return Err(UploadError::SessionClosed {
                    status: session.status,
                });
            }
            session.status = SessionStatus::Failed;
            (session.workspace_id.clone(), self.received_keys(&session))
        };

        for key in &keys {
            self.delete_best_effort(key).await;
        }
        self.publish_failed(&workspace_id, session_id, FailureReason::Aborted);
        tracing::info!(session = session_id, "upload aborted");
        Ok(())
    }

    /// Read-only snapshot of a session.
    pub fn session_status(
        &self,
        actor: &str,
        session_id: &str,
    ) -> Result<SessionStatusResponse, UploadError> {
        let handle = self
            .sessions
            .get(session_id)
            .ok_or_else(|| UploadError::SessionNotFound(session_id.into()))?;
        let session = handle.lock().unwrap();
        if session.owner_id != actor {
            return Err(UploadError::Unauthorized);
        }
        Ok(SessionStatusResponse {
            session_id: session.id.clone(),
            status: session.status,
            received_count: session.received().count(),
            total_count: session.chunk_count,
            received_indices: session.received().indices(),
            expires_at: session.expires_at,
        })
    }

    /// Background sweep: expires stale sessions and purges terminal ones
    /// past their deadline. The only writer of `Expired`.
    pub async fn expire_stale(&self) -> usize {
        let now = Utc::now();
        let mut expired = 0;

        for handle in self.sessions.all() {
            let action = {
                let mut session = handle.lock().unwrap();
                if !session.is_expired_at(now) {
                    continue;
                }
                if session.accepts_chunks() {
                    session.status = SessionStatus::Expired;
                    SweepAction::Expire {
                        session_id: session.id.clone(),
                        workspace_id: session.workspace_id.clone(),
                        keys: self.received_keys(&session),
                    }
                } else if session.status.is_terminal() {
                    SweepAction::Purge {
                        session_id: session.id.clone(),
                        keys: self.received_keys(&session),
                    }
                } else {
                    // Mid-assembly; finalize owns this session.
                    continue;
                }
            };

            match action {
                SweepAction::Expire {
                    session_id,
                    workspace_id,
                    keys,
                } => {
                    for key in &keys {
                        self.delete_best_effort(key).await;
                    }
                    self.publish_failed(&workspace_id, &session_id, FailureReason::Expired);
                    tracing::info!(session = %session_id, "session expired");
                    expired += 1;
                }
                SweepAction::Purge { session_id, keys } => {
                    for key in &keys {
                        self.delete_best_effort(key).await;
                    }
                    self.sessions.remove(&session_id);
                    tracing::debug!(session = %session_id, "terminal session purged");
                }
            }
        }
        expired
    }

    fn received_keys(&self, session: &UploadSession) -> Vec<String> {
        session
            .received()
            .indices()
            .into_iter()
            .map(|i| chunk_key(&session.id, i))
            .collect()
    }

    async fn fail_assembly(
        &self,
        handle: &SessionHandle,
        session_id: &str,
        workspace_id: &str,
        reason: FailureReason,
        error: dropgate_storage::StorageError,
    ) -> UploadError {
        {
            let mut session = handle.lock().unwrap();
            session.status = SessionStatus::Failed;
        }
        // Chunk data stays intact for a bounded number of retries; the
        // sweep reclaims it once the session passes its deadline.
        self.publish_failed(workspace_id, session_id, reason);
        tracing::error!(session = session_id, error = %error, "assembly failed");
        UploadError::AssemblyIo(error)
    }

    fn publish_failed(&self, workspace_id: &str, session_id: &str, reason: FailureReason) {
        self.bus.publish(
            EventKind::UploadFailed,
            workspace_id,
            &UploadFailedPayload {
                session_id: session_id.into(),
                reason,
            },
        );
    }

    async fn delete_best_effort(&self, key: &str) {
        if let Err(e) = self.objects.delete(key).await {
            tracing::warn!(key, error = %e, "failed to reclaim storage key");
        }
    }
}

enum SweepAction {
    Expire {
        session_id: String,
        workspace_id: String,
        keys: Vec<String>,
    },
    Purge {
        session_id: String,
        keys: Vec<String>,
    },
}
