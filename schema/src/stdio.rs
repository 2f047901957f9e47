//! Standard stream configuration for spawned children

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// How a single standard stream of the child is connected
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum StdioMode {
    /// Share the host's stream
    Inherit,
    /// Connect the stream to the null device
    #[default]
    Ignore,
    /// Create a pipe readable/writable by the host
    Pipe,
}

/// Stream configuration for the child's stdin, stdout and stderr
///
/// All three streams default to [`StdioMode::Ignore`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StdioConfig {
    /// Child's standard input
    #[serde(default)]
    pub stdin: StdioMode,
    /// Child's standard output
    #[serde(default)]
    pub stdout: StdioMode,
    /// Child's standard error
    #[serde(default)]
    pub stderr: StdioMode,
}

impl StdioConfig {
    /// Use the same mode for all three streams
    pub const fn all(mode: StdioMode) -> Self {
        Self {
            stdin: mode,
            stdout: mode,
            stderr: mode,
        }
    }

    /// All streams shared with the host
    pub const fn inherit() -> Self {
        Self::all(StdioMode::Inherit)
    }

    /// All streams connected to the null device
    pub const fn ignore() -> Self {
        Self::all(StdioMode::Ignore)
    }

    /// All streams piped to the host
    pub const fn piped() -> Self {
        Self::all(StdioMode::Pipe)
    }
}
