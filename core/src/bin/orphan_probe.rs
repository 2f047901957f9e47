//! Host process for orphan-cleanup integration tests
//!
//! Starts `sleep 30` under supervision, prints the child's pid on stdout, and
//! then leaves without waiting for the child:
//!
//! - `orphan_probe exit` (default): calls `std::process::exit(0)` right away
//! - `orphan_probe signal`: waits for SIGINT/SIGTERM/SIGHUP, runs the host
//!   cleanups, prints the signal name, and exits

use std::io::Write;
use tether_core::{exec, ExecOptions, ShutdownCoordinator};

#[tokio::main]
async fn main() -> tether_core::Result<()> {
    let _ = tether_core::utils::init_tracing("warn");
    let mode = std::env::args().nth(1).unwrap_or_else(|| "exit".to_string());

    // Handlers must be in place before the pid is announced
    let host_signal = match mode.as_str() {
        "signal" => Some(ShutdownCoordinator::global().on_host_signal()?),
        _ => None,
    };

    let command = exec("sleep", ExecOptions::new().arg("30"));
    let pid = command
        .pid()
        .ok_or_else(|| tether_core::ExecError::Spawn("sleep did not start".to_string()))?;

    let mut stdout = std::io::stdout();
    writeln!(stdout, "{}", pid)?;
    stdout.flush()?;

    if let Some(host_signal) = host_signal {
        let name = host_signal.await;
        writeln!(stdout, "{}", name)?;
        stdout.flush()?;
    }

    std::process::exit(0);
}
