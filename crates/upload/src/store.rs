//! In-memory registry of live upload sessions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session::UploadSession;

/// One registered session behind its own lock: the per-session critical
/// section for bitmap mutation and state transitions. Sessions never
/// share a lock, so uploads to different sessions proceed in parallel.
pub type SessionHandle = Arc<Mutex<UploadSession>>;

/// Tracks in-flight uploads by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, session: UploadSession) -> SessionHandle {
        let id = session.id.clone();
        let handle: SessionHandle = Arc::new(Mutex::new(session));
        self.sessions
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&handle));
        handle
    }

    pub fn get(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().unwrap().remove(id)
    }

    /// Snapshot of all registered sessions, for the expiry sweep.
    pub fn all(&self) -> Vec<SessionHandle> {
        self.sessions.lock().unwrap().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
