//! Host shutdown coordination
//!
//! Every live child registers a cleanup callback here when it is spawned.
//! The callback is removed exactly once: by the supervising task when the
//! child exits on its own, or by [`ShutdownCoordinator::run_cleanups`] when
//! the host is going away. Cleanups of the process-wide coordinator run
//!
//! - from a `libc::atexit` handler, installed by [`install_exit_hook`] on the
//!   first spawn, when the host calls `std::process::exit` or returns from
//!   `main`;
//! - from [`ShutdownCoordinator::on_host_signal`] for binaries that want
//!   SIGINT/SIGTERM/SIGHUP to stop their children too.

#![allow(unsafe_code)]

use crate::{ExecError, Result};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Once, OnceLock};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

type Cleanup = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a pending cleanup registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    pending: HashMap<CleanupId, Cleanup>,
}

/// Registry of callbacks to run when the host process shuts down
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    inner: Arc<Mutex<Registry>>,
}

impl fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("pending", &self.pending())
            .finish()
    }
}

impl ShutdownCoordinator {
    /// Create an empty coordinator, independent of the global one
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide coordinator used by [`exec`](crate::exec) unless the
    /// caller supplies its own
    pub fn global() -> &'static ShutdownCoordinator {
        static GLOBAL: OnceLock<ShutdownCoordinator> = OnceLock::new();
        GLOBAL.get_or_init(ShutdownCoordinator::new)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        // Callbacks never run under the lock, so a poisoned registry is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a callback to run at host shutdown
    pub fn register(&self, cleanup: impl FnOnce() + Send + 'static) -> CleanupId {
        let mut registry = self.registry();
        let id = CleanupId(registry.next_id);
        registry.next_id += 1;
        registry.pending.insert(id, Box::new(cleanup));
        debug!(cleanup = id.0, "Registered shutdown cleanup");
        id
    }

    /// Remove a pending callback without running it
    ///
    /// Returns `false` if the callback was already removed or already ran.
    pub fn deregister(&self, id: CleanupId) -> bool {
        let removed = self.registry().pending.remove(&id).is_some();
        debug!(cleanup = id.0, removed, "Deregistered shutdown cleanup");
        removed
    }

    /// Number of callbacks still waiting to run
    pub fn pending(&self) -> usize {
        self.registry().pending.len()
    }

    /// Run every pending callback once and return how many ran
    ///
    /// The registry stays usable afterwards; callbacks registered later are
    /// kept until the next call.
    pub fn run_cleanups(&self) -> usize {
        let drained: Vec<Cleanup> = {
            let mut registry = self.registry();
            registry.pending.drain().map(|(_, cleanup)| cleanup).collect()
        };
        let count = drained.len();
        for cleanup in drained {
            cleanup();
        }
        if count > 0 {
            debug!(count, "Ran shutdown cleanups");
        }
        count
    }

    /// Listen for SIGINT, SIGTERM and SIGHUP delivered to the host
    ///
    /// The signal handlers are installed before this returns, so a signal
    /// arriving before the future is first polled is not lost. The returned
    /// future resolves to the received signal's name after running this
    /// coordinator's cleanups; the caller is expected to exit afterwards.
    /// Fails with [`ExecError::NoRuntime`] outside a tokio runtime.
    pub fn on_host_signal(&self) -> Result<impl Future<Output = &'static str> + Send + 'static> {
        tokio::runtime::Handle::try_current()
            .map_err(|e| ExecError::NoRuntime(e.to_string()))?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        let coordinator = self.clone();

        Ok(async move {
            let name = tokio::select! {
                _ = sigint.recv() => "SIGINT",
                _ = sigterm.recv() => "SIGTERM",
                _ = sighup.recv() => "SIGHUP",
            };
            let stopped = coordinator.run_cleanups();
            info!(signal = name, stopped, "Host received termination signal");
            name
        })
    }
}

static EXIT_HOOK: Once = Once::new();

extern "C" fn run_global_cleanups() {
    // Unwinding out of an atexit handler aborts the process
    let _ = std::panic::catch_unwind(|| ShutdownCoordinator::global().run_cleanups());
}

/// Run the global coordinator's cleanups when the host exits normally
///
/// Idempotent. Called automatically by [`exec`](crate::exec) the first time
/// a child is registered with the global coordinator.
pub fn install_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // Safety: the handler is a plain extern "C" fn with no captured state
        let rc = unsafe { libc::atexit(run_global_cleanups) };
        if rc != 0 {
            warn!("Failed to install host exit hook; children may outlive the host");
        } else {
            debug!("Installed host exit hook");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let make = move || -> Box<dyn FnOnce() + Send> {
            let h = h.clone();
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
        };
        (hits, make)
    }

    #[test]
    fn test_run_cleanups_runs_each_once() {
        let coordinator = ShutdownCoordinator::new();
        let (hits, make) = counter();
        coordinator.register(make());
        coordinator.register(make());
        assert_eq!(coordinator.pending(), 2);

        assert_eq!(coordinator.run_cleanups(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.pending(), 0);

        // Nothing left to run
        assert_eq!(coordinator.run_cleanups(), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_deregister_prevents_run() {
        let coordinator = ShutdownCoordinator::new();
        let (hits, make) = counter();
        let first = coordinator.register(make());
        let _second = coordinator.register(make());

        assert!(coordinator.deregister(first));
        assert!(!coordinator.deregister(first));
        assert_eq!(coordinator.run_cleanups(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_deregister_after_run_is_noop() {
        let coordinator = ShutdownCoordinator::new();
        let (_hits, make) = counter();
        let id = coordinator.register(make());
        coordinator.run_cleanups();
        assert!(!coordinator.deregister(id));
    }

    #[test]
    fn test_registration_after_run_is_kept() {
        let coordinator = ShutdownCoordinator::new();
        let (hits, make) = counter();
        coordinator.register(make());
        coordinator.run_cleanups();

        let late = coordinator.register(make());
        assert_eq!(coordinator.pending(), 1);
        assert!(coordinator.deregister(late));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ids_are_unique_and_clones_share_state() {
        let coordinator = ShutdownCoordinator::new();
        let clone = coordinator.clone();
        let (_hits, make) = counter();
        let a = coordinator.register(make());
        let b = clone.register(make());
        assert_ne!(a, b);
        assert_eq!(coordinator.pending(), 2);
        assert!(clone.deregister(a));
        assert_eq!(coordinator.pending(), 1);
    }

    #[test]
    fn test_cleanup_may_register_again() {
        let coordinator = ShutdownCoordinator::new();
        let inner = coordinator.clone();
        coordinator.register(move || {
            inner.register(|| {});
        });
        assert_eq!(coordinator.run_cleanups(), 1);
        assert_eq!(coordinator.pending(), 1);
    }

    #[test]
    fn test_on_host_signal_outside_runtime() {
        let coordinator = ShutdownCoordinator::new();
        assert!(matches!(
            coordinator.on_host_signal(),
            Err(ExecError::NoRuntime(_))
        ));
    }

    #[test]
    fn test_install_exit_hook_is_idempotent() {
        install_exit_hook();
        install_exit_hook();
        assert!(EXIT_HOOK.is_completed());
    }
}
