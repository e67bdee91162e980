//! Lifecycle state machine for the managed llama-server process.
//!
//! At most one managed process exists at a time. All state transitions go
//! through one mutex, so concurrent start/stop calls serialize instead of
//! interleaving. Crashes are detected lazily on the next status refresh;
//! there is no synchronous liveness push from the child.

use crate::command::{build_launch_command, LaunchCommand};
use crate::discovery;
use crate::pipeline::{spawn_stream_reader, LogPipeline, LogSubscriber};
use crate::shutdown::shutdown_process_tree;
use llamaforge_core::{ServerConfig, StatusSnapshot, SupervisorError, SupervisorState};
use serde::Serialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Bounded wait for a reader task to hit end-of-stream after the process
/// died. Readers exit on their own once the pipes close; this only guards
/// against a wedged pipe.
const READER_DRAIN: Duration = Duration::from_secs(2);

/// The single supervised server process.
///
/// Exclusively owned by the supervisor; destroyed once termination is
/// confirmed, whether by explicit stop, crash, or supervisor shutdown.
struct ManagedProcess {
    child: Child,
    pid: u32,
    /// Command actually used, retained for diagnostics.
    command: LaunchCommand,
    /// Unix timestamp (seconds) of the launch.
    started_at: u64,
    /// Reader tasks draining the process's output into the pipeline.
    /// Awaited on stop so stale lines never bleed into a later launch.
    readers: Vec<JoinHandle<()>>,
}

struct Inner {
    state: SupervisorState,
    process: Option<ManagedProcess>,
}

/// Result of a successful start, echoed back for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct StartOutcome {
    pub pid: u32,
    pub command: LaunchCommand,
}

/// Supervisor for one external llama-server process.
pub struct Supervisor {
    inner: Mutex<Inner>,
    pipeline: Arc<LogPipeline>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SupervisorState::Idle,
                process: None,
            }),
            pipeline: Arc::new(LogPipeline::new()),
        }
    }

    /// Subscribe to the classified log stream.
    pub fn subscribe_logs(&self) -> LogSubscriber {
        self.pipeline.subscribe()
    }

    /// Snapshot of recent log events.
    pub fn recent_logs(&self) -> Vec<llamaforge_core::LogEvent> {
        self.pipeline.recent()
    }

    /// Launch the server described by `config`.
    ///
    /// Rejected with [`SupervisorError::AlreadyRunning`] while a managed
    /// process exists; a crashed-but-unacknowledged process does not count,
    /// it is cleared here. On any failure the state returns to `Idle`.
    pub async fn start(&self, config: &ServerConfig) -> Result<StartOutcome, SupervisorError> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match inner.state {
            SupervisorState::Starting | SupervisorState::Running | SupervisorState::Stopping => {
                return Err(SupervisorError::AlreadyRunning);
            }
            SupervisorState::Idle | SupervisorState::Crashed => {}
        }

        if config.model.is_empty() {
            return Err(SupervisorError::MissingModel);
        }

        let program = discovery::resolve_executable(config.executable.as_deref())
            .ok_or(SupervisorError::ExecutableNotFound)?;

        inner.state = SupervisorState::Starting;
        inner.process = None;

        let launch = build_launch_command(&program, config);
        info!(command = %launch.rendered(), "starting llama-server");

        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (key, value) in &launch.env {
            cmd.env(key, value);
        }
        // Own process group so termination can target the whole tree
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                inner.state = SupervisorState::Idle;
                return Err(SupervisorError::SpawnFailed(e.to_string()));
            }
        };

        let Some(pid) = child.id() else {
            // Exited before we could even read a PID; reap and give up
            let _ = child.wait().await;
            inner.state = SupervisorState::Idle;
            return Err(SupervisorError::SpawnFailed(
                "process exited before it could be tracked".to_string(),
            ));
        };

        // Fresh launch, fresh sequence numbers
        self.pipeline.reset();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_stream_reader(stdout, Arc::clone(&self.pipeline)));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_stream_reader(stderr, Arc::clone(&self.pipeline)));
        }

        let started_at = now_secs();
        inner.process = Some(ManagedProcess {
            child,
            pid,
            command: launch.clone(),
            started_at,
            readers,
        });
        inner.state = SupervisorState::Running;
        info!(pid, "llama-server running");

        Ok(StartOutcome {
            pid,
            command: launch,
        })
    }

    /// Terminate the managed process and its descendants.
    ///
    /// A no-op success from `Idle`; from `Crashed` just clears the state.
    /// A termination timeout is surfaced and leaves the supervisor in
    /// `Running` - the process is still alive, and believing otherwise
    /// would leak it.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        let Some(mut managed) = inner.process.take() else {
            inner.state = SupervisorState::Idle;
            return Ok(());
        };

        inner.state = SupervisorState::Stopping;
        info!(pid = managed.pid, "stopping llama-server");

        match shutdown_process_tree(&mut managed.child, managed.pid).await {
            Ok(status) => {
                // Let the readers finish draining the closed pipes before
                // returning, so a follow-up start never races leftover
                // lines against its pipeline reset
                for mut handle in managed.readers.drain(..) {
                    if tokio::time::timeout(READER_DRAIN, &mut handle)
                        .await
                        .is_err()
                    {
                        warn!(pid = managed.pid, "log reader did not drain, aborting it");
                        handle.abort();
                    }
                }
                info!(pid = managed.pid, ?status, "llama-server stopped");
                inner.state = SupervisorState::Idle;
                Ok(())
            }
            Err(e) => {
                warn!(pid = managed.pid, error = %e, "termination not confirmed");
                inner.process = Some(managed);
                inner.state = SupervisorState::Running;
                Err(e)
            }
        }
    }

    /// Stop whatever is running, then start with the new configuration.
    pub async fn restart(&self, config: &ServerConfig) -> Result<StartOutcome, SupervisorError> {
        self.stop().await?;
        self.start(config).await
    }

    /// Current state, with lazy crash detection.
    pub async fn status(&self) -> StatusSnapshot {
        let mut inner = self.inner.lock().await;
        refresh(&mut inner);

        match &inner.process {
            Some(managed) => StatusSnapshot {
                state: inner.state,
                pid: Some(managed.pid),
                started_at: Some(managed.started_at),
                command: Some(managed.command.rendered()),
            },
            None => StatusSnapshot {
                state: inner.state,
                ..StatusSnapshot::idle()
            },
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

// Drop is not async; best effort only. Callers wanting confirmed
// termination must stop() first.
impl Drop for Supervisor {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(managed) = inner.process.take() {
                force_kill_tree(managed.pid);
            }
        }
    }
}

#[cfg(unix)]
fn force_kill_tree(pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;
    // An out-of-range pid must not collapse to group 0 (our own group)
    if let Ok(raw) = i32::try_from(pid) {
        let _ = killpg(Pid::from_raw(raw), Signal::SIGKILL);
    }
}

#[cfg(not(unix))]
fn force_kill_tree(pid: u32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/F", "/T", "/PID", &pid.to_string()])
        .output();
}

/// Lazy crash detection: reconcile the recorded state with the OS view.
/// The managed process reference is destroyed once the exit is observed.
fn refresh(inner: &mut Inner) {
    if inner.state != SupervisorState::Running {
        return;
    }
    let Some(managed) = inner.process.as_mut() else {
        inner.state = SupervisorState::Idle;
        return;
    };

    match managed.child.try_wait() {
        Ok(Some(status)) => {
            warn!(pid = managed.pid, ?status, "llama-server exited unexpectedly");
            inner.process = None;
            inner.state = SupervisorState::Crashed;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(pid = managed.pid, error = %e, "cannot query process, treating as crashed");
            inner.process = None;
            inner.state = SupervisorState::Crashed;
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
