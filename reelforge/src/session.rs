//! Per-run sessions and the concurrent session store.
//!
//! A session is created per run request and owns the run's blackboard,
//! status, and resume bookkeeping (which nodes already completed, how far
//! each loop progressed). Sessions share no mutable state with each other.

use crate::blackboard::Blackboard;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// The lifecycle state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created, run not yet started.
    Created,
    /// Run in progress.
    Running,
    /// Run suspended, waiting for an operator decision.
    AwaitingConfirmation,
    /// Run finished successfully.
    Completed,
    /// Run aborted with an error.
    Failed,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::AwaitingConfirmation => write!(f, "awaiting_confirmation"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl SessionStatus {
    /// Returns true for states from which the run can never resume.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Resume bookkeeping for one loop node.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopProgress {
    /// Number of fully completed passes.
    pub completed_passes: u32,
    /// The pass currently (or last) started, if any.
    pub started_pass: Option<u32>,
}

/// A single pipeline run: blackboard, status, and resume bookkeeping.
#[derive(Debug)]
pub struct Session {
    id: String,
    user_id: String,
    blackboard: Blackboard,
    status: RwLock<SessionStatus>,
    completed: RwLock<HashSet<String>>,
    loops: RwLock<HashMap<String, LoopProgress>>,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Creates a new session for a user.
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("s_{}", &hex[..8]),
            user_id: user_id.into(),
            blackboard: Blackboard::new(),
            status: RwLock::new(SessionStatus::Created),
            completed: RwLock::new(HashSet::new()),
            loops: RwLock::new(HashMap::new()),
            created_at: Utc::now(),
        }
    }

    /// Returns the session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the owning user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the session blackboard.
    #[must_use]
    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    /// Transitions to a new status.
    pub fn set_status(&self, status: SessionStatus) {
        *self.status.write() = status;
    }

    /// Returns true if the given node already completed in this session.
    #[must_use]
    pub fn is_node_completed(&self, node_id: &str) -> bool {
        self.completed.read().contains(node_id)
    }

    /// Records a node as completed.
    pub fn mark_node_completed(&self, node_id: &str) {
        self.completed.write().insert(node_id.to_string());
    }

    /// Forgets completion for a set of nodes, so a new loop pass re-runs them.
    pub fn clear_completed(&self, node_ids: &[String]) {
        let mut completed = self.completed.write();
        for id in node_ids {
            completed.remove(id);
        }
    }

    /// Returns the progress for a loop node.
    #[must_use]
    pub fn loop_progress(&self, loop_id: &str) -> LoopProgress {
        self.loops.read().get(loop_id).copied().unwrap_or_default()
    }

    /// Marks a loop pass as started.
    pub fn begin_loop_pass(&self, loop_id: &str, pass: u32) {
        let mut loops = self.loops.write();
        let entry = loops.entry(loop_id.to_string()).or_default();
        entry.started_pass = Some(pass);
    }

    /// Marks a loop pass as fully completed.
    pub fn complete_loop_pass(&self, loop_id: &str, pass: u32) {
        let mut loops = self.loops.write();
        let entry = loops.entry(loop_id.to_string()).or_default();
        entry.completed_passes = pass + 1;
    }
}

/// Concurrent store of live sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: DashMap<String, Arc<Session>>,
}

impl SessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and registers a new session.
    #[must_use]
    pub fn create(&self, user_id: impl Into<String>) -> Arc<Session> {
        let session = Arc::new(Session::new(user_id));
        self.inner.insert(session.id().to_string(), Arc::clone(&session));
        session
    }

    /// Looks up a session by id.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.get(session_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes a session, returning it if present.
    pub fn remove(&self, session_id: &str) -> Option<Arc<Session>> {
        self.inner.remove(session_id).map(|(_, session)| session)
    }

    /// Returns the number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique_and_prefixed() {
        let a = Session::new("user_001");
        let b = Session::new("user_001");
        assert!(a.id().starts_with("s_"));
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn status_transitions() {
        let session = Session::new("user_001");
        assert_eq!(session.status(), SessionStatus::Created);
        session.set_status(SessionStatus::Running);
        session.set_status(SessionStatus::AwaitingConfirmation);
        assert!(!session.status().is_terminal());
        session.set_status(SessionStatus::Completed);
        assert!(session.status().is_terminal());
    }

    #[test]
    fn completed_nodes_can_be_cleared_for_a_new_pass() {
        let session = Session::new("user_001");
        session.mark_node_completed("reviewer");
        session.mark_node_completed("refiner");
        assert!(session.is_node_completed("reviewer"));

        session.clear_completed(&["reviewer".to_string(), "refiner".to_string()]);
        assert!(!session.is_node_completed("reviewer"));
        assert!(!session.is_node_completed("refiner"));
    }

    #[test]
    fn loop_progress_tracks_passes() {
        let session = Session::new("user_001");
        assert_eq!(session.loop_progress("loop").completed_passes, 0);

        session.begin_loop_pass("loop", 0);
        session.complete_loop_pass("loop", 0);

        let progress = session.loop_progress("loop");
        assert_eq!(progress.completed_passes, 1);
        assert_eq!(progress.started_pass, Some(0));
    }

    #[test]
    fn store_round_trip() {
        let store = SessionStore::new();
        let session = store.create("user_001");
        assert!(store.get(session.id()).is_some());
        assert_eq!(store.len(), 1);

        store.remove(session.id());
        assert!(store.get(session.id()).is_none());
        assert!(store.is_empty());
    }
}
