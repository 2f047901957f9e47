//! Configuration loading and validation for spawned commands
//!
//! This module parses TOML into [`ExecSpec`] values, applies defaults via
//! serde, and performs strict validation with field-path error messages.
//! A spec converts into [`ExecOptions`] for [`exec`](crate::exec).

use crate::process::{exec, Command, ExecOptions};
use crate::{ExecError, Result};
use schema::StdioConfig;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Declarative description of a command to spawn
///
/// ```toml
/// command = "python3"
/// args = ["-m", "http.server"]
/// cwd = "/srv/www"
/// processGroup = true
///
/// [env]
/// PYTHONUNBUFFERED = "1"
///
/// [stdio]
/// stdout = "inherit"
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ExecSpec {
    /// Program to run (looked up in PATH unless it contains a slash)
    pub command: String,
    /// Arguments, in order
    #[serde(default)]
    pub args: Vec<String>,
    /// Complete environment; omitted means inherit the host's
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    /// Working directory
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    /// Standard stream configuration (all ignored by default)
    #[serde(default)]
    pub stdio: StdioConfig,
    /// Start the child in its own process group
    #[serde(default)]
    pub process_group: bool,
}

impl ExecSpec {
    /// Validate the spec and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        self.validate_at("")
    }

    fn validate_at(&self, prefix: &str) -> Result<()> {
        if self.command.trim().is_empty() {
            return Err(ExecError::ValidationError(format!(
                "{}command: cannot be empty",
                prefix
            )));
        }
        if self.command.contains('\0') {
            return Err(ExecError::ValidationError(format!(
                "{}command: cannot contain NUL bytes",
                prefix
            )));
        }
        for (i, arg) in self.args.iter().enumerate() {
            if arg.contains('\0') {
                return Err(ExecError::ValidationError(format!(
                    "{}args[{}]: cannot contain NUL bytes",
                    prefix, i
                )));
            }
        }
        if let Some(env) = &self.env {
            for (k, v) in env {
                if k.trim().is_empty() {
                    return Err(ExecError::ValidationError(format!(
                        "{}env: keys cannot be empty",
                        prefix
                    )));
                }
                if k.contains('=') {
                    return Err(ExecError::ValidationError(format!(
                        "{}env.{}: name cannot contain '='",
                        prefix, k
                    )));
                }
                if k.contains('\0') || v.contains('\0') {
                    return Err(ExecError::ValidationError(format!(
                        "{}env.{}: cannot contain NUL bytes",
                        prefix, k
                    )));
                }
            }
        }
        if let Some(cwd) = &self.cwd {
            if cwd.as_os_str().is_empty() {
                return Err(ExecError::ValidationError(format!(
                    "{}cwd: cannot be empty",
                    prefix
                )));
            }
        }
        Ok(())
    }

    /// Convert into options for [`exec`](crate::exec)
    pub fn to_options(&self) -> ExecOptions {
        let mut options = ExecOptions::new()
            .args(self.args.iter().cloned())
            .stdio(self.stdio)
            .process_group(self.process_group);
        if let Some(env) = &self.env {
            options = options.env(env.clone());
        }
        if let Some(cwd) = &self.cwd {
            options = options.cwd(cwd.clone());
        }
        options
    }
}

/// Spawn the command described by `spec`
pub fn exec_spec(spec: &ExecSpec) -> Command {
    exec(&spec.command, spec.to_options())
}

/// Named commands keyed by table name
///
/// This allows writing:
/// [web]
/// command = "npm"
/// args = ["run", "dev"]
///
/// [worker]
/// command = "python3"
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ExecSpecsFile {
    /// Map of name -> spec
    #[serde(flatten)]
    pub commands: BTreeMap<String, ExecSpec>,
}

impl ExecSpecsFile {
    /// Validate every named spec
    pub fn validate(&self) -> Result<()> {
        if self.commands.is_empty() {
            return Err(ExecError::ValidationError(
                "config must contain at least one command section".to_string(),
            ));
        }
        for (name, spec) in &self.commands {
            if name.trim().is_empty() {
                return Err(ExecError::ValidationError(
                    "command name (table name) cannot be empty".to_string(),
                ));
            }
            spec.validate_at(&format!("{}.", name))?;
        }
        Ok(())
    }
}

/// Load a single spec from a TOML string
pub fn load_exec_spec_from_toml_str(input: &str) -> Result<ExecSpec> {
    let spec: ExecSpec = toml::from_str(input)
        .map_err(|e| ExecError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    spec.validate()?;
    Ok(spec)
}

/// Load a single spec from a TOML file path
pub fn load_exec_spec_from_toml_path(path: impl AsRef<Path>) -> Result<ExecSpec> {
    load_exec_spec_from_toml_str(&read_config(path.as_ref())?)
}

/// Load named specs from a TOML string
pub fn load_exec_specs_from_toml_str(input: &str) -> Result<ExecSpecsFile> {
    let file: ExecSpecsFile = toml::from_str(input)
        .map_err(|e| ExecError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    file.validate()?;
    Ok(file)
}

/// Load named specs from a TOML file path
pub fn load_exec_specs_from_toml_path(path: impl AsRef<Path>) -> Result<ExecSpecsFile> {
    load_exec_specs_from_toml_str(&read_config(path.as_ref())?)
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| {
        ExecError::ConfigurationError(format!("Failed to read config {:?}: {}", path, e))
    })
}
