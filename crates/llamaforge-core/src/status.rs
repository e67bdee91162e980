//! Supervisor lifecycle state.

use serde::{Deserialize, Serialize};

/// Lifecycle state of the managed process.
///
/// `Idle → Starting → Running → Stopping → Idle`, with `Running → Crashed`
/// detected lazily on the next status refresh. `Crashed` means the process
/// is already gone; a subsequent start or stop returns the machine to a
/// normal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupervisorState {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Crashed,
}

/// Point-in-time view of the supervisor, safe to hand to the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: SupervisorState,
    /// PID of the managed process, when one exists.
    pub pid: Option<u32>,
    /// Unix timestamp (seconds) the process was started.
    pub started_at: Option<u64>,
    /// Rendered command line actually used, retained for diagnostics.
    pub command: Option<String>,
}

impl StatusSnapshot {
    /// Snapshot for a supervisor with no managed process.
    pub const fn idle() -> Self {
        Self {
            state: SupervisorState::Idle,
            pid: None,
            started_at: None,
            command: None,
        }
    }
}
