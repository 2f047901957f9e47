//! Handle over a supervised child process

use super::signal::{parse_signal, DEFAULT_KILL_SIGNAL};
use crate::{ExecError, Result};
use nix::sys::signal::Signal;
use schema::ExitResult;
use std::future::Future;
use tokio::process::{ChildStderr, ChildStdin, ChildStdout};
use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

/// State of a child's termination outcome, published once by its supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Outcome {
    Pending,
    Exited(ExitResult),
    Failed(ExecError),
}

impl Outcome {
    fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending)
    }
}

/// Publishes a child's outcome exactly once
///
/// Dropped without publishing (its supervising task was torn down with the
/// runtime), it settles a still-pending outcome as a supervision failure so
/// `is_running` and `result` agree.
#[derive(Debug)]
pub(crate) struct OutcomeSender {
    tx: watch::Sender<Outcome>,
}

impl OutcomeSender {
    pub(crate) fn channel() -> (Self, watch::Receiver<Outcome>) {
        let (tx, rx) = watch::channel(Outcome::Pending);
        (Self { tx }, rx)
    }

    pub(crate) fn publish(self, outcome: Outcome) {
        self.tx.send_replace(outcome);
    }
}

impl Drop for OutcomeSender {
    fn drop(&mut self) {
        self.tx.send_if_modified(|outcome| {
            if !outcome.is_pending() {
                return false;
            }
            warn!("Supervising task ended before the child exited");
            *outcome = Outcome::Failed(lost_supervisor());
            true
        });
    }
}

fn lost_supervisor() -> ExecError {
    ExecError::Supervision("supervising task ended before the child exited".to_string())
}

/// Piped standard streams taken from the child before supervision starts
#[derive(Debug, Default)]
pub(crate) struct ChildPipes {
    pub(crate) stdin: Option<ChildStdin>,
    pub(crate) stdout: Option<ChildStdout>,
    pub(crate) stderr: Option<ChildStderr>,
}

/// A spawned child process and its eventual [`ExitResult`]
///
/// A `Command` is created by [`exec`](super::exec) and offers two narrow
/// capabilities over the child: observing its termination and asking it to
/// terminate. The child itself is owned by a supervising task; dropping the
/// `Command` does not kill it.
#[derive(Debug)]
pub struct Command {
    pid: Option<u32>,
    outcome_rx: watch::Receiver<Outcome>,
    kill_tx: Option<mpsc::UnboundedSender<Signal>>,
    pipes: ChildPipes,
}

impl Command {
    pub(crate) fn new(
        pid: u32,
        outcome_rx: watch::Receiver<Outcome>,
        kill_tx: mpsc::UnboundedSender<Signal>,
        pipes: ChildPipes,
    ) -> Self {
        Self {
            pid: Some(pid),
            outcome_rx,
            kill_tx: Some(kill_tx),
            pipes,
        }
    }

    /// A command whose child never started
    pub(crate) fn failed(error: ExecError) -> Self {
        let (_outcome_tx, outcome_rx) = watch::channel(Outcome::Failed(error));
        Self {
            pid: None,
            outcome_rx,
            kill_tx: None,
            pipes: ChildPipes::default(),
        }
    }

    /// Process ID of the child, `None` if it could not be spawned
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the child's outcome is still unknown
    pub fn is_running(&self) -> bool {
        self.outcome_rx.borrow().is_pending()
    }

    /// Wait for the child to terminate
    ///
    /// The returned future does not borrow `self`; any number of callers may
    /// await it and all of them observe the same [`ExitResult`]. It fails with
    /// [`ExecError::Spawn`] (or [`ExecError::NoRuntime`]) if the child never
    /// started, and with [`ExecError::Supervision`] if the supervising task
    /// was torn down (runtime shutdown) before the child exited.
    pub fn result(&self) -> impl Future<Output = Result<ExitResult>> + Send + 'static {
        let mut outcome_rx = self.outcome_rx.clone();
        async move {
            // A closed channel still leaves the last published outcome readable
            let _ = outcome_rx.wait_for(|outcome| !outcome.is_pending()).await;
            let outcome = outcome_rx.borrow().clone();
            match outcome {
                Outcome::Exited(result) => Ok(result),
                Outcome::Failed(error) => Err(error),
                Outcome::Pending => Err(lost_supervisor()),
            }
        }
    }

    /// Ask the child to terminate with `SIGTERM`
    pub fn kill(&self) {
        self.kill_with(DEFAULT_KILL_SIGNAL)
    }

    /// Send the named signal (e.g. `"SIGKILL"`) to the child
    ///
    /// Delivered only while the outcome is pending and the supervising task
    /// still holds the child; otherwise this is a silent no-op. Sending a
    /// signal does not wait for the child to die. Unknown signal names are
    /// logged and ignored.
    pub fn kill_with(&self, signal: &str) {
        if !self.is_running() {
            debug!(pid = ?self.pid, signal, "Ignoring kill for terminated child");
            return;
        }
        let parsed = match parse_signal(signal) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(pid = ?self.pid, "Ignoring kill request: {}", e);
                return;
            }
        };
        if let Some(kill_tx) = &self.kill_tx {
            // A closed channel means the supervisor already reaped the child
            let _ = kill_tx.send(parsed);
        }
    }

    /// Take the child's stdin, if it was piped and not yet taken
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.pipes.stdin.take()
    }

    /// Take the child's stdout, if it was piped and not yet taken
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.pipes.stdout.take()
    }

    /// Take the child's stderr, if it was piped and not yet taken
    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.pipes.stderr.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_command() -> (OutcomeSender, mpsc::UnboundedReceiver<Signal>, Command) {
        let (outcome_tx, outcome_rx) = OutcomeSender::channel();
        let (kill_tx, kill_rx) = mpsc::unbounded_channel();
        let command = Command::new(42, outcome_rx, kill_tx, ChildPipes::default());
        (outcome_tx, kill_rx, command)
    }

    #[tokio::test]
    async fn test_kill_forwards_default_signal_while_pending() {
        let (_outcome_tx, mut kill_rx, command) = pending_command();
        assert!(command.is_running());

        command.kill();
        command.kill_with("SIGKILL");
        assert_eq!(kill_rx.recv().await, Some(Signal::SIGTERM));
        assert_eq!(kill_rx.recv().await, Some(Signal::SIGKILL));
    }

    #[tokio::test]
    async fn test_kill_after_outcome_is_silent() {
        let (outcome_tx, mut kill_rx, command) = pending_command();
        outcome_tx.publish(Outcome::Exited(ExitResult::exited(0)));

        assert!(!command.is_running());
        command.kill();
        command.kill_with("SIGKILL");
        assert!(kill_rx.try_recv().is_err());
        assert_eq!(command.result().await, Ok(ExitResult::exited(0)));
    }

    #[tokio::test]
    async fn test_unknown_signal_is_ignored() {
        let (_outcome_tx, mut kill_rx, command) = pending_command();
        command.kill_with("SIGNOPE");
        assert!(kill_rx.try_recv().is_err());
        assert!(command.is_running());
    }

    #[tokio::test]
    async fn test_result_observed_by_many_waiters() {
        let (outcome_tx, _kill_rx, command) = pending_command();
        let first = tokio::spawn(command.result());
        let second = tokio::spawn(command.result());

        outcome_tx.publish(Outcome::Exited(ExitResult::signaled("SIGTERM")));

        let expected = Ok(ExitResult::signaled("SIGTERM"));
        assert_eq!(first.await.unwrap(), expected);
        assert_eq!(second.await.unwrap(), expected);
        assert_eq!(command.result().await, expected);
    }

    #[tokio::test]
    async fn test_lost_supervisor_settles_outcome() {
        let (outcome_tx, mut kill_rx, command) = pending_command();
        let waiter = tokio::spawn(command.result());
        drop(outcome_tx);

        assert!(!command.is_running());
        assert!(matches!(waiter.await.unwrap(), Err(ExecError::Supervision(_))));
        assert!(matches!(
            command.result().await,
            Err(ExecError::Supervision(_))
        ));
        command.kill();
        assert!(kill_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_published_outcome_survives_sender_drop() {
        let (outcome_tx, _kill_rx, command) = pending_command();
        outcome_tx.publish(Outcome::Exited(ExitResult::exited(3)));
        assert!(!command.is_running());
        assert_eq!(command.result().await, Ok(ExitResult::exited(3)));
    }

    #[tokio::test]
    async fn test_failed_command() {
        let command = Command::failed(ExecError::Spawn("missing".to_string()));
        assert_eq!(command.pid(), None);
        assert!(!command.is_running());
        command.kill();
        assert_eq!(
            command.result().await,
            Err(ExecError::Spawn("missing".to_string()))
        );
    }
}
