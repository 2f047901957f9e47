//! Unix spawn and signal delivery primitives
//!
//! This module builds the OS-level `tokio::process::Command` for a child and
//! delivers signals to it. When a child is started with
//! [`ExecOptions::process_group`](super::ExecOptions::process_group) it is
//! placed in its own session via `setsid()`, which:
//!
//! - Creates a new session and makes the child its leader
//! - Creates a new process group with the child as group leader
//! - Detaches the child from the controlling terminal
//!
//! Signals for such a child are sent to the negative pid (the whole group), so
//! grandchildren started by a shell wrapper are terminated along with it.

// Allow unsafe code for this module since process groups require libc::setsid() calls
#![allow(unsafe_code)]

use super::signal::signal_name;
use super::ExecOptions;
use crate::{ExecError, Result};
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use schema::{ExitResult, StdioMode};
use std::ffi::OsStr;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, error};

fn stdio_for(mode: StdioMode) -> Stdio {
    match mode {
        StdioMode::Inherit => Stdio::inherit(),
        StdioMode::Ignore => Stdio::null(),
        StdioMode::Pipe => Stdio::piped(),
    }
}

/// Build the OS command for `program` with normalized options applied
///
/// The environment is inherited unless `options.env` is set, in which case
/// it replaces the host environment entirely.
pub(crate) fn build_command(program: &OsStr, options: &ExecOptions) -> Command {
    let mut command = Command::new(program);
    command.args(&options.args);

    if let Some(env) = &options.env {
        command.env_clear();
        command.envs(env);
    }
    if let Some(dir) = &options.cwd {
        command.current_dir(dir);
    }

    command.stdin(stdio_for(options.stdio.stdin));
    command.stdout(stdio_for(options.stdio.stdout));
    command.stderr(stdio_for(options.stdio.stderr));

    // The supervising task decides when the child dies, never a dropped handle
    command.kill_on_drop(false);

    if options.process_group {
        // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
        unsafe {
            command.pre_exec(|| {
                // Create a new session and process group
                let result = libc::setsid();
                if result == -1 {
                    return Err(std::io::Error::last_os_error());
                }
                Ok(())
            });
        }
    }

    command
}

/// Send `signal` to the child, or to its whole process group when `group` is set
///
/// ## Error Handling
///
/// - `ESRCH` (No such process) is treated as success since it means the
///   target already exited
/// - `EPERM` is treated as success as well: the pid has most likely been
///   released and reused by a process we do not own
/// - Other errors are propagated as `Supervision` errors
pub(crate) fn deliver_signal(pid: Pid, signal: Signal, group: bool) -> Result<()> {
    debug!(
        "Sending {} to {} {}",
        signal,
        if group { "process group" } else { "process" },
        pid
    );

    let sent = if group {
        killpg(pid, signal)
    } else {
        kill(pid, signal)
    };

    match sent {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process {} already exited", pid);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling {} (likely already exited)",
                pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to {}: {}", signal, pid, e);
            Err(ExecError::Supervision(format!(
                "Failed to send {} to {}: {}",
                signal, pid, e
            )))
        }
    }
}

/// Translate a wait status into an [`ExitResult`]
pub(crate) fn exit_result(status: ExitStatus) -> ExitResult {
    if let Some(code) = status.code() {
        return ExitResult::exited(code);
    }
    match status.signal() {
        Some(raw) => ExitResult::signaled(signal_name(raw)),
        None => ExitResult::new(None, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_result_from_code() {
        // Raw wait status encodes the exit code in the second byte
        let status = ExitStatus::from_raw(3 << 8);
        assert_eq!(exit_result(status), ExitResult::exited(3));
    }

    #[test]
    fn test_exit_result_from_signal() {
        let status = ExitStatus::from_raw(libc::SIGKILL);
        assert_eq!(exit_result(status), ExitResult::signaled("SIGKILL"));
    }

    #[test]
    fn test_signal_nonexistent_process() {
        // pid_max on Linux never reaches this value
        let pid = Pid::from_raw(i32::MAX - 1);
        assert!(deliver_signal(pid, Signal::SIGTERM, false).is_ok());
        assert!(deliver_signal(pid, Signal::SIGKILL, true).is_ok());
    }

    #[tokio::test]
    async fn test_build_command_defaults_ignore_stdio() {
        let options = ExecOptions::new().arg("ok");
        let mut child = build_command(OsStr::new("echo"), &options)
            .spawn()
            .expect("Failed to spawn echo");
        assert!(child.stdin.is_none());
        assert!(child.stdout.is_none());
        assert!(child.stderr.is_none());
        let status = child.wait().await.expect("Failed to wait for echo");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_build_command_process_group() {
        let options = ExecOptions::new().arg("1").process_group(true);
        let mut child = build_command(OsStr::new("sleep"), &options)
            .spawn()
            .expect("Failed to spawn sleep");
        let pid = child.id().expect("child pid") as i32;

        // Process should be its own group leader
        let pgid = unsafe { libc::getpgid(pid) };
        assert_eq!(pgid, pid);

        deliver_signal(Pid::from_raw(pid), Signal::SIGKILL, true).expect("killpg");
        let status = child.wait().await.expect("Failed to wait for sleep");
        assert_eq!(exit_result(status), ExitResult::signaled("SIGKILL"));
    }
}
