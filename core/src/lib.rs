//! Core functionality for Tether
//!
//! This crate spawns child processes and supervises them: each child is
//! represented by a [`Command`] that can be queried for liveness, awaited for
//! its [`ExitResult`], and asked to terminate. Children still running when the
//! host exits are sent `SIGTERM` through the [`ShutdownCoordinator`].

#[cfg(unix)]
pub mod config;
pub mod error;
#[cfg(unix)]
pub mod process;
#[cfg(unix)]
pub mod shutdown;


// Re-export schema types for convenience
pub use schema::*;

pub use error::{ExecError, Result};
#[cfg(unix)]
pub use process::{exec, try_exec, Command, ExecOptions, DEFAULT_KILL_SIGNAL};
#[cfg(unix)]
pub use shutdown::{install_exit_hook, CleanupId, ShutdownCoordinator};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::ExecError::Other(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
