use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counters from one sync cycle, merged across entity kinds by `sync_all`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncReport {
    pub pushed: u32,
    pub failed: u32,
    pub pulled: u32,
    pub pending: u32,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.pushed += other.pushed;
        self.failed += other.failed;
        self.pulled += other.pulled;
        self.pending = other.pending;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Pushing,
    Pulling,
    Disabled,
}

/// Engine status snapshot exposed to the UI shell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub state: SyncState,
    pub last_sync: Option<DateTime<Utc>>,
    pub sync_errors: u32,
    /// Set after a 401/403 from the remote; all cycles halt until the shell
    /// re-authenticates and clears it. Queued mutations are preserved.
    pub auth_required: bool,
}

impl Default for EngineStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_sync: None,
            sync_errors: 0,
            auth_required: false,
        }
    }
}
