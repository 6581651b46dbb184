//! UI Execution Contexts
//!
//! Each [`ExecutionContext`] is one OS thread running a cooperative FIFO job
//! queue, owning at most one top-level [`Surface`] at a time. Work scheduled
//! on a context never runs concurrently with other work on the same context,
//! but different contexts run in parallel with each other and with the main
//! dispatch loop.
//!
//! Cross-context coordination is explicit message passing: [`invoke`] sends a
//! closure to the target context's inbox and returns a future that resolves
//! with the closure's result once it has run on that context's thread. This
//! is the "hop" primitive the shutdown coordinator is built on.
//!
//! [`invoke`]: ExecutionContext::invoke

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::dispatch::MainDispatcher;
use crate::error::ShellError;
use crate::surface::Surface;

enum ContextJob {
    Run(Box<dyn FnOnce() + Send>),
    /// Drain sentinel: every job queued before it has already run when the
    /// worker reaches it. The worker acknowledges and exits.
    Drain(oneshot::Sender<()>),
}

/// A single cooperative task queue bound to one thread.
pub struct ExecutionContext {
    name: String,
    inbox: Sender<ContextJob>,
    surface: Mutex<Option<Surface>>,
    main: MainDispatcher,
    worker: Mutex<Option<JoinHandle<()>>>,
    drained: AtomicBool,
}

impl ExecutionContext {
    /// Spawn a new context thread with an empty job queue.
    ///
    /// The main dispatcher handle is kept so that completions produced on
    /// this context (invoke results, drain acknowledgements) wake the main
    /// dispatch loop.
    pub fn spawn(name: impl Into<String>, main: MainDispatcher) -> Result<Arc<Self>, ShellError> {
        let name = name.into();
        let (inbox, queue) = mpsc::channel::<ContextJob>();

        let wake = main.clone();
        let worker = std::thread::Builder::new()
            .name(format!("ctx-{}", name))
            .spawn(move || {
                while let Ok(job) = queue.recv() {
                    match job {
                        ContextJob::Run(job) => job(),
                        ContextJob::Drain(ack) => {
                            let _ = ack.send(());
                            wake.notify_completion();
                            break;
                        }
                    }
                }
            })?;

        debug!(context = %name, "execution context spawned");
        Ok(Arc::new(Self {
            name,
            inbox,
            surface: Mutex::new(None),
            main,
            worker: Mutex::new(Some(worker)),
            drained: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Schedule a closure on this context's queue. Dispatches from the same
    /// source run in the order they were issued.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<(), ShellError> {
        self.inbox
            .send(ContextJob::Run(Box::new(job)))
            .map_err(|_| ShellError::ContextClosed(self.name.clone()))
    }

    /// Run a closure on this context's thread and resolve with its result.
    ///
    /// This is an asynchronous suspension point: the caller's task yields and
    /// resumes after the closure has executed on the target context. The
    /// completion wakes the main dispatch loop so the awaiting task makes
    /// progress on its next iteration.
    pub fn invoke<R, F>(
        &self,
        job: F,
    ) -> Result<impl Future<Output = Result<R, ShellError>>, ShellError>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let wake = self.main.clone();
        let name = self.name.clone();
        self.dispatch(move || {
            let _ = result_tx.send(job());
            wake.notify_completion();
        })?;
        Ok(async move { result_rx.await.map_err(|_| ShellError::ContextClosed(name)) })
    }

    /// Scoped exclusive access to the current-surface field. Required when
    /// reading the field from any thread other than this context's own.
    pub fn lock(&self) -> MutexGuard<'_, Option<Surface>> {
        self.surface.lock()
    }

    /// Replace the current surface. At most one surface is current at a time;
    /// the previous one (if any) is returned to the caller.
    pub fn set_surface(&self, surface: Option<Surface>) -> Option<Surface> {
        let mut guard = self.surface.lock();
        std::mem::replace(&mut *guard, surface)
    }

    /// Snapshot of the current surface handle.
    pub fn current_surface(&self) -> Option<Surface> {
        self.surface.lock().clone()
    }

    /// Shut down this context's queue: every job dispatched before this call
    /// runs to completion, then the worker thread exits and is joined.
    ///
    /// Failures here are not locally recoverable and propagate as
    /// [`ShellError::QueueDrain`].
    pub async fn shutdown_queue(&self) -> Result<(), ShellError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inbox
            .send(ContextJob::Drain(ack_tx))
            .map_err(|_| ShellError::QueueDrain(self.name.clone()))?;

        ack_rx
            .await
            .map_err(|_| ShellError::QueueDrain(self.name.clone()))?;
        self.drained.store(true, Ordering::Release);

        // The worker acknowledged right before breaking out of its loop, so
        // the join below only reclaims an exiting thread.
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            handle
                .join()
                .map_err(|_| ShellError::QueueDrain(self.name.clone()))?;
        }

        debug!(context = %self.name, "execution context drained");
        Ok(())
    }

    /// Whether the queue has been drained by a completed shutdown pass.
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.name)
            .field("drained", &self.is_drained())
            .finish()
    }
}

/// The dynamic set of all live execution contexts created by the UI
/// subsystem.
///
/// The registry owns strong references; a context is only removed after its
/// queue has fully drained, so enumeration from another context can never
/// observe a freed context mid-walk.
#[derive(Default)]
pub struct ContextRegistry {
    contexts: RwLock<Vec<Arc<ExecutionContext>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, context: Arc<ExecutionContext>) {
        trace!(context = %context.name(), "context registered");
        self.contexts.write().push(context);
    }

    /// Current set of contexts, in insertion order. Shutdown attempts visit
    /// a snapshot, so concurrent registration does not perturb a walk.
    pub fn snapshot(&self) -> Vec<Arc<ExecutionContext>> {
        self.contexts.read().clone()
    }

    /// Remove a context by identity. Called only after its queue drained.
    pub fn remove(&self, context: &Arc<ExecutionContext>) {
        self.contexts
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, context));
    }

    pub fn len(&self) -> usize {
        self.contexts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchLoop;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_runs_on_worker_thread() {
        let (_loop, _events, main) = DispatchLoop::new();
        let ctx = ExecutionContext::spawn("worker", main).unwrap();

        let caller = std::thread::current().id();
        let (tx, rx) = std::sync::mpsc::channel();
        ctx.dispatch(move || {
            let _ = tx.send(std::thread::current().id());
        })
        .unwrap();

        let worker = rx.recv().unwrap();
        assert_ne!(caller, worker);
    }

    #[test]
    fn test_invoke_returns_closure_result() {
        let (_loop, _events, main) = DispatchLoop::new();
        let ctx = ExecutionContext::spawn("worker", main).unwrap();

        let result = futures::executor::block_on(ctx.invoke(|| 6 * 7).unwrap()).unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_shutdown_drains_pending_jobs_in_order() {
        let (_loop, _events, main) = DispatchLoop::new();
        let ctx = ExecutionContext::spawn("worker", main).unwrap();

        let counter = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        for i in 0..16 {
            let counter = counter.clone();
            let order = order.clone();
            ctx.dispatch(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                order.lock().push(i);
            })
            .unwrap();
        }

        futures::executor::block_on(ctx.shutdown_queue()).unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 16);
        assert_eq!(*order.lock(), (0..16).collect::<Vec<_>>());
        assert!(ctx.is_drained());
        assert!(ctx.dispatch(|| {}).is_err());
    }

    #[test]
    fn test_invoke_after_drain_fails() {
        let (_loop, _events, main) = DispatchLoop::new();
        let ctx = ExecutionContext::spawn("worker", main).unwrap();
        futures::executor::block_on(ctx.shutdown_queue()).unwrap();

        assert!(matches!(
            ctx.invoke(|| ()).err(),
            Some(ShellError::ContextClosed(_))
        ));
    }

    #[test]
    fn test_registry_snapshot_preserves_insertion_order() {
        let (_loop, _events, main) = DispatchLoop::new();
        let registry = ContextRegistry::new();

        let a = ExecutionContext::spawn("a", main.clone()).unwrap();
        let b = ExecutionContext::spawn("b", main.clone()).unwrap();
        let c = ExecutionContext::spawn("c", main).unwrap();
        registry.register(a.clone());
        registry.register(b.clone());
        registry.register(c.clone());

        let names: Vec<_> = registry
            .snapshot()
            .iter()
            .map(|ctx| ctx.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        registry.remove(&b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_surface_slot_replacement() {
        let (_loop, _events, main) = DispatchLoop::new();
        let ctx = ExecutionContext::spawn("worker", main).unwrap();

        assert!(ctx.current_surface().is_none());
        let surface = Surface::new();
        assert!(ctx.set_surface(Some(surface.clone())).is_none());
        let replaced = ctx.set_surface(None);
        assert_eq!(replaced.map(|s| s.id()), Some(surface.id()));
    }
}
