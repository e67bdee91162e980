//! Recursive process-tree termination.
//!
//! A plain signal to the server alone is not enough: llama-server may have
//! spawned helper processes of its own. On Unix the child is launched into
//! its own process group, so the whole tree is signalled with
//! SIGTERM → SIGKILL escalation and the exit is confirmed by reaping. On
//! Windows `taskkill /T /F` covers the tree. Failure to confirm death
//! within the bounded waits is surfaced, never swallowed.

use llamaforge_core::SupervisorError;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::debug;

/// Grace period after the polite termination signal.
const TERM_GRACE: Duration = Duration::from_secs(5);
/// Bounded wait for reaping after the forceful kill.
const KILL_WAIT: Duration = Duration::from_secs(5);

/// Terminate a managed process and all of its descendants, blocking until
/// the exit is confirmed.
pub async fn shutdown_process_tree(
    child: &mut Child,
    pid: u32,
) -> Result<ExitStatus, SupervisorError> {
    #[cfg(unix)]
    {
        shutdown_unix(child, pid).await
    }

    #[cfg(not(unix))]
    {
        shutdown_windows(child, pid).await
    }
}

#[cfg(unix)]
async fn shutdown_unix(child: &mut Child, pid: u32) -> Result<ExitStatus, SupervisorError> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The child was spawned as its own process-group leader, so pgid == pid.
    // A pid that does not fit i32 must not collapse to group 0, which would
    // signal our own process group.
    let raw = i32::try_from(pid).map_err(|_| {
        SupervisorError::TerminationFailed(format!("pid {pid} out of signalling range"))
    })?;
    let pgid = Pid::from_raw(raw);

    // Phase 1: SIGTERM to the whole group, bounded grace period
    match killpg(pgid, Signal::SIGTERM) {
        Ok(()) => {}
        Err(Errno::ESRCH) => {
            // Group already gone; just reap
            return child
                .wait()
                .await
                .map_err(|e| SupervisorError::TerminationFailed(e.to_string()));
        }
        Err(e) => return Err(SupervisorError::TerminationFailed(e.to_string())),
    }

    if let Ok(result) = timeout(TERM_GRACE, child.wait()).await {
        let status = result.map_err(|e| SupervisorError::TerminationFailed(e.to_string()))?;
        // Direct child reaped; sweep any stragglers in the group
        let _ = killpg(pgid, Signal::SIGKILL);
        return Ok(status);
    }

    debug!(pid, "grace period elapsed, escalating to SIGKILL");

    // Phase 2: SIGKILL the group, bounded reap
    match killpg(pgid, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => return Err(SupervisorError::TerminationFailed(e.to_string())),
    }

    match timeout(KILL_WAIT, child.wait()).await {
        Ok(result) => result.map_err(|e| SupervisorError::TerminationFailed(e.to_string())),
        Err(_) => Err(SupervisorError::TerminationTimedOut {
            pid,
            timeout_secs: (TERM_GRACE + KILL_WAIT).as_secs(),
        }),
    }
}

#[cfg(not(unix))]
async fn shutdown_windows(child: &mut Child, pid: u32) -> Result<ExitStatus, SupervisorError> {
    // taskkill /T targets the whole process tree; there is no graceful
    // SIGTERM equivalent
    let _ = tokio::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output()
        .await;

    match timeout(KILL_WAIT, child.wait()).await {
        Ok(result) => result.map_err(|e| SupervisorError::TerminationFailed(e.to_string())),
        Err(_) => Err(SupervisorError::TerminationTimedOut {
            pid,
            timeout_secs: KILL_WAIT.as_secs(),
        }),
    }
}
