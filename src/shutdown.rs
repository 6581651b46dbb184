//! Cross-Context Shutdown Protocol
//!
//! A shutdown attempt walks the registry snapshot, hops onto each context
//! that owns a visible surface to negotiate closing, and aggregates a single
//! `can_exit` verdict. Only a unanimous verdict tears anything down: queues
//! drain one by one, the main intake closes, and the quit sentinel carrying
//! the requested exit code is posted into the native queue.
//!
//! Attempt states: `Init → VisitingContexts → { Aborted | FinalizingOnMain →
//! DrainingQueues → Exited }`. A refusal is the expected cancellation path:
//! the attempt aborts with nothing torn down and the application keeps
//! running; an identical retry stays possible.

use std::sync::Arc;

use tracing::{debug, error, info};

use crate::context::ContextRegistry;
use crate::dispatch::{EventQueue, MainDispatcher};
use crate::error::ShellError;

/// Terminal state of a shutdown attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// At least one surface declined to close; nothing was torn down.
    Aborted,
    /// Every surface accepted; queues drained and the quit signal was posted.
    Exiting,
}

/// Drives shutdown attempts over the live set of execution contexts.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    registry: Arc<ContextRegistry>,
    main: MainDispatcher,
    events: EventQueue,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ContextRegistry>, main: MainDispatcher, events: EventQueue) -> Self {
        Self {
            registry,
            main,
            events,
        }
    }

    /// Fire-and-forget form: schedule an attempt onto the main context.
    ///
    /// Infrastructure failures inside the attempt are not locally
    /// recoverable; they surface as an error-level report here.
    pub fn request(&self, exit_code: i32) {
        let coordinator = self.clone();
        let scheduled = self.main.spawn(async move {
            match coordinator.run(exit_code).await {
                Ok(outcome) => debug!(?outcome, "shutdown attempt finished"),
                Err(error) => error!(%error, "shutdown attempt failed"),
            }
        });
        if let Err(error) = scheduled {
            error!(%error, "could not schedule shutdown attempt");
        }
    }

    /// Run one shutdown attempt to its terminal state.
    pub async fn run(&self, exit_code: i32) -> Result<ShutdownOutcome, ShellError> {
        // Init: optimistic verdict over a fixed snapshot.
        let snapshot = self.registry.snapshot();
        let mut can_exit = true;
        debug!(
            contexts = snapshot.len(),
            exit_code, "shutdown attempt started"
        );

        // VisitingContexts: every context is visited exactly once, even after
        // a refusal; no context may be torn down while another still holds
        // visible state that outlives it.
        for context in &snapshot {
            let surface = {
                let guard = context.lock();
                guard.clone().filter(|surface| surface.has_content())
            };
            let Some(surface) = surface else {
                continue;
            };

            // Close negotiation must happen on the owning context's thread.
            let hop = {
                let surface = surface.clone();
                context.invoke(move || surface.try_close())
            };
            let accepted = match hop {
                Ok(pending) => match pending.await {
                    Ok(accepted) => accepted,
                    // Context drained mid-walk: nothing left to close there.
                    Err(ShellError::ContextClosed(_)) => continue,
                    Err(error) => return Err(error),
                },
                Err(ShellError::ContextClosed(_)) => continue,
                Err(error) => return Err(error),
            };

            if !accepted {
                can_exit = false;
                // Visible signal about which surface blocked the exit.
                surface.bring_to_foreground();
            }
        }

        if !can_exit {
            info!("a surface declined to close, shutdown aborted");
            return Ok(ShutdownOutcome::Aborted);
        }

        // FinalizingOnMain: teardown and the quit signal must originate from
        // the thread that owns the native message loop.
        self.main.resume()?.await?;

        // DrainingQueues: each queue runs dry before the next is touched;
        // the registry drops its entry only after the drain completed.
        for context in &snapshot {
            if !context.is_drained() {
                context.shutdown_queue().await?;
            }
            self.registry.remove(context);
        }
        self.main.close();

        // Exited.
        self.events.post_quit(exit_code)?;
        info!(exit_code, "quit signal posted");
        Ok(ShutdownOutcome::Exiting)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchLoop;
    use crate::host::NullWindowManager;
    use parking_lot::Mutex;

    #[test]
    fn test_empty_registry_exits_with_requested_code() {
        let (dispatch, events, main) = DispatchLoop::new();
        let registry = Arc::new(ContextRegistry::new());
        let coordinator = ShutdownCoordinator::new(registry, main.clone(), events);

        let outcome = Arc::new(Mutex::new(None));
        let seen = outcome.clone();
        main.spawn(async move {
            *seen.lock() = Some(coordinator.run(11).await.unwrap());
        })
        .unwrap();

        assert_eq!(dispatch.run(&NullWindowManager).unwrap(), 11);
        assert_eq!(*outcome.lock(), Some(ShutdownOutcome::Exiting));
    }
}
