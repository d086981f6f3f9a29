//! Capture session state
//!
//! Lifecycle state machine and the snapshot handed to the front-end.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Lifecycle of the capture slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No capture in progress
    #[default]
    Idle,
    /// Folder allocated, process being started
    Spawning,
    /// dvgrab is running
    Running,
    /// Interrupt sent, waiting for dvgrab to exit
    Stopping,
}

impl SessionState {
    /// Whether a new session must be refused
    pub fn is_active(&self) -> bool {
        !matches!(self, SessionState::Idle)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionOutcome {
    /// Process exited on its own
    Exited { code: i32 },
    /// Process was terminated by a signal
    Signaled { signal: i32 },
    /// Process never started
    SpawnFailed { message: String },
    /// Process outlived the release timeout and was left running
    Detached,
}

impl SessionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SessionOutcome::Exited { code: 0 })
    }

    /// Code a shell front-end should exit with
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionOutcome::Exited { code } => *code,
            SessionOutcome::Signaled { .. }
            | SessionOutcome::SpawnFailed { .. }
            | SessionOutcome::Detached => 1,
        }
    }
}

/// A started capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,

    /// Freshly created, empty at start
    pub target_dir: PathBuf,

    /// Exact command line, program first
    pub argv: Vec<String>,

    pub started_at: DateTime<Utc>,
}

/// Snapshot of the capture slot for the front-end
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,

    /// Current session, or the last one once it has finished
    pub session: Option<SessionInfo>,

    /// Set once the last session has terminated
    pub outcome: Option<SessionOutcome>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }
}
