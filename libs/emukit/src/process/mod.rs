//! External-process emulator supervision.
//!
//! Java-based and other native emulators run as child processes described
//! by a [`ProcessCommand`]. The handle returned by [`spawn`] owns the child
//! exclusively; stopping sends a termination signal, waits out a grace
//! period, then force-kills.

pub mod log_forwarder;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::StartError;
use log_forwarder::{StreamKind, spawn_stream_forwarder};

/// Timeout for waiting on forwarder tasks after the child exits.
const FORWARDER_DRAIN_TIMEOUT: Duration = Duration::from_millis(100);

/// How to invoke an external-process emulator: executable plus argument
/// list, environment, and working directory. Owned exclusively by the
/// emulator instance that spawns it.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// A spawned emulator process with its log forwarders.
pub struct ProcessHandle {
    label: String,
    child: Child,
    stdout_forwarder: Option<JoinHandle<()>>,
    stderr_forwarder: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.child.id())
            .finish()
    }
}

/// Spawn `cmd` with piped stdout/stderr; each stream is pumped line by line
/// into `tracing`, tagged with `label`.
///
/// # Errors
/// `StartError::Launch` if the executable cannot be spawned.
pub fn spawn(
    label: &str,
    cmd: &ProcessCommand,
    cancel: &CancellationToken,
) -> Result<ProcessHandle, StartError> {
    let mut command = Command::new(&cmd.program);
    command.args(&cmd.args);
    command.envs(&cmd.env);
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    if let Some(ref dir) = cmd.working_dir {
        if dir.is_dir() {
            command.current_dir(dir);
        } else {
            tracing::warn!(
                emulator = label,
                working_dir = %dir.display(),
                "working directory does not exist, using current dir"
            );
        }
    }

    let mut child = command.spawn().map_err(|source| StartError::Launch {
        program: cmd.program.display().to_string(),
        source,
    })?;

    let stdout_forwarder = child.stdout.take().map(|stdout| {
        spawn_stream_forwarder(stdout, label.to_owned(), cancel.clone(), StreamKind::Stdout)
    });
    let stderr_forwarder = child.stderr.take().map(|stderr| {
        spawn_stream_forwarder(stderr, label.to_owned(), cancel.clone(), StreamKind::Stderr)
    });

    tracing::info!(
        emulator = label,
        program = %cmd.program.display(),
        pid = ?child.id(),
        "spawned emulator process"
    );

    Ok(ProcessHandle {
        label: label.to_owned(),
        child,
        stdout_forwarder,
        stderr_forwarder,
    })
}

impl ProcessHandle {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Graceful stop: termination signal, bounded wait, then force kill.
    /// Never fails; a stop of an already-exited process is a no-op.
    pub async fn stop(mut self, grace: Duration) {
        stop_child_with_grace(&mut self.child, &self.label, grace).await;
        wait_forwarder(self.stdout_forwarder.take()).await;
        wait_forwarder(self.stderr_forwarder.take()).await;
    }
}

/// Send graceful termination to a child process.
///
/// Returns `false` if the process already exited, the PID does not fit in
/// an `i32`, or signal delivery fails; the caller then force-kills.
#[cfg(unix)]
fn send_terminate_signal(child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return false;
    };

    let Ok(pid_i32) = i32::try_from(pid) else {
        tracing::warn!(pid, "PID does not fit in i32, cannot send SIGTERM");
        return false;
    };

    kill(Pid::from_raw(pid_i32), Signal::SIGTERM).is_ok()
}

/// On Windows there is no reliable SIGTERM equivalent for console
/// applications; report failure so the caller proceeds to force kill.
#[cfg(windows)]
fn send_terminate_signal(_child: &Child) -> bool {
    false
}

async fn stop_child_with_grace(child: &mut Child, label: &str, grace: Duration) {
    let pid = child.id();
    let graceful = send_terminate_signal(child);

    tracing::debug!(
        emulator = label,
        pid = ?pid,
        graceful,
        "sent termination signal"
    );

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(emulator = label, status = ?status, "process exited");
        }
        Ok(Err(e)) => {
            tracing::warn!(emulator = label, error = %e, "failed to wait for process");
        }
        Err(_) => {
            tracing::debug!(emulator = label, "grace period expired, force killing");
            if let Err(e) = child.kill().await {
                tracing::warn!(emulator = label, error = %e, "failed to force kill");
            }
        }
    }
}

async fn wait_forwarder(handle: Option<JoinHandle<()>>) {
    if let Some(h) = handle {
        let _ = tokio::time::timeout(FORWARDER_DRAIN_TIMEOUT, h).await;
    }
}
