//! Startup-Registration Collaborator Boundary
//!
//! Auto-start registration is host-specific; the core only sequences around
//! it. The asynchronous acquisition handle is modeled as a single-consumer
//! future: a [`StartupTask`] is moved, not copied, into the consuming task,
//! so awaiting it twice is unrepresentable.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::ShellError;

/// Single-consumer handle to an in-flight startup-registration acquisition.
///
/// Resolves with the acquisition result once the underlying operation
/// completes; fails with [`ShellError::Startup`] if the producer was dropped
/// without completing.
pub struct StartupTask {
    rx: oneshot::Receiver<bool>,
}

impl StartupTask {
    /// Create a task plus the completion handle that resolves it.
    pub fn pair() -> (StartupTaskCompletion, StartupTask) {
        let (tx, rx) = oneshot::channel();
        (StartupTaskCompletion { tx }, StartupTask { rx })
    }
}

impl Future for StartupTask {
    type Output = Result<bool, ShellError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|result| {
            result.map_err(|_| ShellError::Startup("acquisition abandoned".to_string()))
        })
    }
}

/// Producer side of a [`StartupTask`].
pub struct StartupTaskCompletion {
    tx: oneshot::Sender<bool>,
}

impl StartupTaskCompletion {
    /// Complete the acquisition with its result.
    pub fn complete(self, acquired: bool) {
        let _ = self.tx.send(acquired);
    }
}

/// Contract supplied by the startup-registration collaborator.
#[async_trait]
pub trait StartupManager: Send + Sync {
    /// Begin acquiring the registration task, if the host supports one.
    /// `None` means the onboarding flow runs without a startup precondition.
    fn acquire_task(&self) -> Option<StartupTask>;

    /// Enable the auto-start registration. Must have completed before any
    /// surface whose close handler may need to undo it becomes visible.
    async fn enable(&self) -> Result<(), ShellError>;

    /// Disable the auto-start registration. Synchronous by contract.
    fn disable(&self);
}

/// Startup manager for hosts without a registration backend: no task, enable
/// and disable are no-ops.
#[derive(Debug, Default)]
pub struct DisabledStartup;

#[async_trait]
impl StartupManager for DisabledStartup {
    fn acquire_task(&self) -> Option<StartupTask> {
        None
    }

    async fn enable(&self) -> Result<(), ShellError> {
        Ok(())
    }

    fn disable(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_task_resolves() {
        let (completion, task) = StartupTask::pair();
        completion.complete(true);
        assert_eq!(futures::executor::block_on(task).unwrap(), true);
    }

    #[test]
    fn test_abandoned_task_fails_as_startup_error() {
        let (completion, task) = StartupTask::pair();
        drop(completion);
        assert!(matches!(
            futures::executor::block_on(task),
            Err(ShellError::Startup(_))
        ));
    }
}
