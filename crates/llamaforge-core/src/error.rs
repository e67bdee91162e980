//! Supervisor error taxonomy.
//!
//! Configuration and launch errors surface synchronously; probe failures
//! degrade instead of erroring; crashes surface as state, not as errors
//! from unrelated calls; termination failures are surfaced, never silently
//! treated as success.

use thiserror::Error;

/// Errors reported by the process supervisor.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError {
    /// A start was attempted while a managed process already exists.
    #[error("server is already running")]
    AlreadyRunning,

    /// The configuration carries an empty model reference.
    #[error("no model specified")]
    MissingModel,

    /// No explicit executable was configured and discovery found none.
    #[error("llama-server executable not found; install llama.cpp or set an explicit path")]
    ExecutableNotFound,

    /// The OS refused to spawn the process.
    #[error("failed to spawn llama-server: {0}")]
    SpawnFailed(String),

    /// The process tree survived the full termination escalation.
    #[error("process tree (pid {pid}) did not exit within {timeout_secs}s")]
    TerminationTimedOut { pid: u32, timeout_secs: u64 },

    /// Termination failed for a reason other than a timeout.
    #[error("failed to terminate process tree: {0}")]
    TerminationFailed(String),
}
