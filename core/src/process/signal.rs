//! Signal names as accepted by [`Command::kill_with`](super::Command::kill_with)
//! and reported by [`ExitResult::signal`](schema::ExitResult::signal).

use crate::{ExecError, Result};
use nix::sys::signal::Signal;
use std::str::FromStr;

/// Signal sent by [`Command::kill`](super::Command::kill) and by host-exit cleanup
pub const DEFAULT_KILL_SIGNAL: &str = "SIGTERM";

/// Parse an OS signal name such as `"SIGTERM"` or `"SIGKILL"`
///
/// Names are passed to the OS as-is; no aliasing or case folding is done.
pub fn parse_signal(name: &str) -> Result<Signal> {
    Signal::from_str(name).map_err(|_| ExecError::InvalidSignal(name.to_string()))
}

/// Name for a raw signal number reported in a wait status
///
/// Numbers without a named counterpart (real-time signals) render as
/// `SIG<n>`.
pub fn signal_name(raw: i32) -> String {
    match Signal::try_from(raw) {
        Ok(signal) => signal.as_str().to_string(),
        Err(_) => format!("SIG{}", raw),
    }
}
