//! Termination outcome of a supervised child process

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a child process terminated
///
/// Exactly one of `code` and `signal` is normally set: a process either
/// exits on its own with a status code, or is terminated by a signal. The
/// record is immutable once built; fields are only reachable through the
/// accessor methods.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ExitResult {
    /// Exit code (None if the process did not exit normally)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<i32>,

    /// Name of the terminating signal, e.g. `SIGTERM` (None on normal exit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    signal: Option<String>,
}

impl ExitResult {
    /// Build a result from any combination of exit code and signal name
    pub fn new(code: Option<i32>, signal: Option<String>) -> Self {
        Self { code, signal }
    }

    /// A normal exit with the given status code
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            signal: None,
        }
    }

    /// A termination caused by the named signal
    pub fn signaled(signal: impl Into<String>) -> Self {
        Self {
            code: None,
            signal: Some(signal.into()),
        }
    }

    /// Exit code, if the process exited normally
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Terminating signal name, if the process was signaled
    pub fn signal(&self) -> Option<&str> {
        self.signal.as_deref()
    }

    /// Check if this represents a successful exit (code 0)
    pub fn is_success(&self) -> bool {
        self.code == Some(0)
    }

    /// Check if the process was terminated by a signal
    pub fn is_signaled(&self) -> bool {
        self.signal.is_some()
    }
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal.as_deref()) {
            (Some(code), None) => write!(f, "exited with code {}", code),
            (None, Some(signal)) => write!(f, "terminated by {}", signal),
            (Some(code), Some(signal)) => {
                write!(f, "exited with code {} after {}", code, signal)
            }
            (None, None) => write!(f, "terminated (unknown status)"),
        }
    }
}
