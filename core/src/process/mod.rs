//! Process spawning and supervision for the Tether core library
//!
//! [`exec`] starts a child process and returns a [`Command`] handle. Each
//! child is owned by a detached supervising task on the current tokio
//! runtime, which:
//!
//! - forwards kill requests from the handle to the child,
//! - reaps the child and publishes its [`ExitResult`](schema::ExitResult)
//!   exactly once,
//! - removes the child's host-exit cleanup from the
//!   [`ShutdownCoordinator`] before publishing.
//!
//! Because signalling and reaping both happen on that one task, a signal is
//! never delivered to a pid that has already been reaped.
//!
//! ## Platform Support
//!
//! - **Unix**: full support, optionally with process groups for tree cleanup
//! - **Windows**: not supported

use crate::shutdown::{install_exit_hook, CleanupId, ShutdownCoordinator};
use crate::{ExecError, Result};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use schema::StdioConfig;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

pub mod command;
pub mod signal;
pub mod unix;

pub use command::Command;
pub use signal::{parse_signal, signal_name, DEFAULT_KILL_SIGNAL};

use command::{ChildPipes, Outcome, OutcomeSender};

/// Options for [`exec`]
///
/// Defaults: no arguments, the host's environment, all standard streams
/// ignored, the host's working directory, no separate process group, and
/// the global [`ShutdownCoordinator`].
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Arguments passed to the program, in order
    pub args: Vec<OsString>,
    /// Complete environment for the child; `None` inherits the host's
    pub env: Option<HashMap<OsString, OsString>>,
    /// Standard stream configuration
    pub stdio: StdioConfig,
    /// Working directory for the child; `None` uses the host's
    pub cwd: Option<PathBuf>,
    /// Start the child in its own session and signal the whole group
    pub process_group: bool,
    /// Coordinator receiving the child's host-exit cleanup
    pub shutdown: Option<ShutdownCoordinator>,
}

impl ExecOptions {
    /// Options with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Replace the child's environment entirely with `env`
    pub fn env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        self.env = Some(
            env.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Set one variable in an explicit environment
    ///
    /// The first call switches from inheriting the host environment to an
    /// explicit one that starts empty.
    pub fn env_var(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Standard stream configuration
    pub fn stdio(mut self, stdio: StdioConfig) -> Self {
        self.stdio = stdio;
        self
    }

    /// Working directory for the child
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Start the child as leader of its own process group
    pub fn process_group(mut self, enabled: bool) -> Self {
        self.process_group = enabled;
        self
    }

    /// Register the host-exit cleanup with `coordinator` instead of the global one
    pub fn shutdown_coordinator(mut self, coordinator: ShutdownCoordinator) -> Self {
        self.shutdown = Some(coordinator);
        self
    }
}

/// Spawn `program` and supervise it
///
/// Returns immediately; the termination outcome is available through
/// [`Command::result`]. If the child cannot be started (missing executable,
/// permission denied, no tokio runtime) the returned command is already
/// settled and its result fails with the corresponding [`ExecError`].
///
/// ## Example
///
/// ```rust,no_run
/// use tether_core::{exec, ExecOptions};
///
/// # async fn run() -> tether_core::Result<()> {
/// let command = exec("sleep", ExecOptions::new().arg("5"));
/// command.kill();
/// let result = command.result().await?;
/// assert_eq!(result.signal(), Some("SIGTERM"));
/// # Ok(())
/// # }
/// ```
pub fn exec(program: impl AsRef<OsStr>, options: ExecOptions) -> Command {
    match try_exec(program, options) {
        Ok(command) => command,
        Err(e) => Command::failed(e),
    }
}

/// Like [`exec`], but report a failed spawn eagerly
pub fn try_exec(program: impl AsRef<OsStr>, options: ExecOptions) -> Result<Command> {
    let program = program.as_ref();
    debug!("Spawning process: {:?} {:?}", program, options.args);

    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        error!("Cannot spawn {:?} outside a tokio runtime", program);
        ExecError::NoRuntime(e.to_string())
    })?;

    let mut child = unix::build_command(program, &options)
        .spawn()
        .map_err(|e| {
            error!("Failed to spawn process {:?}: {}", program, e);
            ExecError::Spawn(format!("Failed to spawn {:?}: {}", program, e))
        })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| ExecError::Spawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    let group = options.process_group;

    let pipes = ChildPipes {
        stdin: child.stdin.take(),
        stdout: child.stdout.take(),
        stderr: child.stderr.take(),
    };

    let (outcome_tx, outcome_rx) = OutcomeSender::channel();
    let (kill_tx, kill_rx) = mpsc::unbounded_channel();

    let coordinator = match options.shutdown {
        Some(coordinator) => coordinator,
        None => {
            install_exit_hook();
            ShutdownCoordinator::global().clone()
        }
    };
    let cleanup = coordinator.register(move || {
        // Best effort: the host does not wait for the child to die
        let _ = unix::deliver_signal(pid, Signal::SIGTERM, group);
    });

    runtime.spawn(supervise(Supervised {
        child,
        pid,
        group,
        kill_rx,
        coordinator,
        cleanup,
        outcome_tx,
    }));

    debug!(pid = raw_pid, group, "Supervising spawned process");
    Ok(Command::new(raw_pid, outcome_rx, kill_tx, pipes))
}

/// Everything the supervising task owns for one child
struct Supervised {
    child: Child,
    pid: Pid,
    group: bool,
    kill_rx: mpsc::UnboundedReceiver<Signal>,
    coordinator: ShutdownCoordinator,
    cleanup: CleanupId,
    outcome_tx: OutcomeSender,
}

async fn supervise(task: Supervised) {
    let Supervised {
        mut child,
        pid,
        group,
        mut kill_rx,
        coordinator,
        cleanup,
        outcome_tx,
    } = task;

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(signal) = kill_rx.recv() => {
                if let Err(e) = unix::deliver_signal(pid, signal, group) {
                    warn!(pid = pid.as_raw(), "Kill request failed: {}", e);
                }
            }
        }
    };

    // The child is reaped: no further signal may reach its pid
    drop(kill_rx);
    drop(child);
    coordinator.deregister(cleanup);

    let outcome = match status {
        Ok(status) => {
            let result = unix::exit_result(status);
            debug!(pid = pid.as_raw(), "Process {}", result);
            Outcome::Exited(result)
        }
        Err(e) => {
            error!(pid = pid.as_raw(), "Failed to wait for process: {}", e);
            Outcome::Failed(ExecError::Supervision(format!(
                "Failed to wait for process {}: {}",
                pid, e
            )))
        }
    };
    outcome_tx.publish(outcome);
}
