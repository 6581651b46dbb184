//! Main Dispatch Loop
//!
//! The single-threaded scheduler that owns the native event queue on the main
//! thread. Native event delivery and asynchronous-task continuations do not
//! share a queue natively, so the loop blocks on one wake channel with a
//! finite set of wake conditions and explicitly alternates between the two
//! sources:
//!
//! - [`Wake::Input`]: native events are queued; drain them all, offering each
//!   to the window-management pre-translation hook before default processing.
//!   A [`NativeEvent::Quit`] terminates the loop immediately with its payload
//!   as the loop's result, discarding anything still queued behind it.
//! - [`Wake::Completion`]: an asynchronous continuation is ready; run queued
//!   main-context jobs and poll the local task pool, without draining events.
//!
//! A failed wait (the wake channel disconnecting) is fatal: no further
//! iterations occur and [`ShellError::WaitFailed`] propagates.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use futures::executor::{LocalPool, LocalSpawner};
use futures::future::BoxFuture;
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, error, info, trace};

use crate::error::ShellError;
use crate::host::WindowManager;
use crate::surface::SurfaceId;

/// An event delivered through the native queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeEvent {
    /// Input or system event addressed to a surface.
    Surface { target: SurfaceId, code: u32 },
    /// The quit sentinel. Terminates the dispatch loop and carries the
    /// process exit code.
    Quit(i32),
}

/// Wake conditions for one loop iteration.
enum Wake {
    /// Native events are available for draining.
    Input,
    /// An asynchronous completion is ready to run on the main context.
    Completion,
}

/// Work scheduled onto the main execution context.
enum MainWork {
    Job(Box<dyn FnOnce() + Send>),
    Task(BoxFuture<'static, ()>),
}

/// Cloneable handle for posting events into the native queue.
#[derive(Clone)]
pub struct EventQueue {
    events: Arc<Mutex<VecDeque<NativeEvent>>>,
    wake: Sender<Wake>,
}

impl EventQueue {
    /// Post an event and wake the loop for an input drain.
    pub fn post(&self, event: NativeEvent) -> Result<(), ShellError> {
        self.events.lock().push_back(event);
        self.wake
            .send(Wake::Input)
            .map_err(|_| ShellError::DispatchClosed)
    }

    /// Post the quit sentinel carrying the requested exit code.
    pub fn post_quit(&self, exit_code: i32) -> Result<(), ShellError> {
        self.post(NativeEvent::Quit(exit_code))
    }
}

/// Cloneable handle for scheduling work onto the main execution context.
///
/// Dispatches issued by one source context run in issue order; no ordering
/// holds across different source contexts.
#[derive(Clone)]
pub struct MainDispatcher {
    work: Arc<Mutex<VecDeque<MainWork>>>,
    wake: Sender<Wake>,
    closed: Arc<AtomicBool>,
}

impl MainDispatcher {
    /// Schedule a closure to run on the main context.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> Result<(), ShellError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ShellError::DispatchClosed);
        }
        self.work.lock().push_back(MainWork::Job(Box::new(job)));
        self.wake
            .send(Wake::Completion)
            .map_err(|_| ShellError::DispatchClosed)
    }

    /// Spawn an asynchronous task driven by the dispatch loop's local pool.
    pub fn spawn(
        &self,
        task: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ShellError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ShellError::DispatchClosed);
        }
        self.work.lock().push_back(MainWork::Task(task.boxed()));
        self.wake
            .send(Wake::Completion)
            .map_err(|_| ShellError::DispatchClosed)
    }

    /// Suspend the calling task and resume it on the main context's queue.
    ///
    /// The returned future completes only after a queued main-context job has
    /// run, so awaiting it is a genuine hop through the main queue rather
    /// than a no-op.
    pub fn resume(&self) -> Result<impl Future<Output = Result<(), ShellError>>, ShellError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(move || {
            let _ = tx.send(());
        })?;
        Ok(async move { rx.await.map_err(|_| ShellError::DispatchClosed) })
    }

    /// Wake the loop because a completion produced elsewhere is ready.
    /// Safe to call from any thread; a missing loop is ignored because the
    /// process is tearing down anyway.
    pub fn notify_completion(&self) {
        let _ = self.wake.send(Wake::Completion);
    }

    /// Close the main context's intake. Queued work still runs; new
    /// dispatches fail with [`ShellError::DispatchClosed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("main dispatch intake closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// The main-thread scheduler.
///
/// The loop owns only the wake receiver and the shared queues; the sending
/// side lives in the [`EventQueue`] and [`MainDispatcher`] handles returned
/// by [`DispatchLoop::new`]. Dropping every handle therefore disconnects the
/// wait primitive, which the loop reports as fatal.
pub struct DispatchLoop {
    wake_rx: Receiver<Wake>,
    events: Arc<Mutex<VecDeque<NativeEvent>>>,
    work: Arc<Mutex<VecDeque<MainWork>>>,
    pool: LocalPool,
    spawner: LocalSpawner,
}

impl DispatchLoop {
    /// Create the loop plus its two sending handles.
    pub fn new() -> (Self, EventQueue, MainDispatcher) {
        let (wake_tx, wake_rx) = mpsc::channel();
        let events = Arc::new(Mutex::new(VecDeque::new()));
        let work = Arc::new(Mutex::new(VecDeque::new()));
        let pool = LocalPool::new();
        let spawner = pool.spawner();

        let queue = EventQueue {
            events: events.clone(),
            wake: wake_tx.clone(),
        };
        let dispatcher = MainDispatcher {
            work: work.clone(),
            wake: wake_tx,
            closed: Arc::new(AtomicBool::new(false)),
        };

        (
            Self {
                wake_rx,
                events,
                work,
                pool,
                spawner,
            },
            queue,
            dispatcher,
        )
    }

    /// Run until the quit sentinel is observed. Returns the exit code it
    /// carried, or a fatal error if the wait primitive failed.
    pub fn run(mut self, window: &dyn WindowManager) -> Result<i32, ShellError> {
        info!("dispatch loop running");
        loop {
            match self.wake_rx.recv() {
                Ok(Wake::Input) => {
                    if let Some(exit_code) = self.drain_events(window) {
                        return Ok(exit_code);
                    }
                    // An input wake also reports any asynchronous work that
                    // finished while events were queued.
                    self.run_completions();
                }
                Ok(Wake::Completion) => self.run_completions(),
                Err(_) => {
                    error!("failed to wait for dispatch wake signal");
                    return Err(ShellError::WaitFailed);
                }
            }
        }
    }

    /// Drain all currently queued native events. Returns the exit code if the
    /// quit sentinel was observed.
    fn drain_events(&mut self, window: &dyn WindowManager) -> Option<i32> {
        loop {
            let event = self.events.lock().pop_front();
            let Some(event) = event else {
                return None;
            };
            match event {
                NativeEvent::Quit(exit_code) => {
                    let discarded = {
                        let mut events = self.events.lock();
                        let len = events.len();
                        events.clear();
                        len
                    };
                    if discarded > 0 {
                        debug!(discarded, "events queued behind quit discarded");
                    }
                    info!(exit_code, "quit observed, leaving dispatch loop");
                    return Some(exit_code);
                }
                event => {
                    if !window.pre_translate(&event) {
                        self.deliver(&event);
                    }
                }
            }
        }
    }

    /// Default processing for an event the pre-translation hook declined.
    fn deliver(&self, event: &NativeEvent) {
        trace!(?event, "delivering event to default processing");
    }

    /// Run queued main-context work and poll the local pool until stalled.
    fn run_completions(&mut self) {
        loop {
            let work = self.work.lock().pop_front();
            match work {
                Some(MainWork::Job(job)) => job(),
                Some(MainWork::Task(task)) => {
                    if self.spawner.spawn_local(task).is_err() {
                        trace!("local pool shut down, task dropped");
                    }
                }
                None => break,
            }
        }
        self.pool.run_until_stalled();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingWindow {
        translated: AtomicUsize,
        consume: bool,
    }

    impl RecordingWindow {
        fn consuming() -> Self {
            Self {
                translated: AtomicUsize::new(0),
                consume: true,
            }
        }
    }

    impl WindowManager for RecordingWindow {
        fn pre_translate(&self, _event: &NativeEvent) -> bool {
            self.translated.fetch_add(1, Ordering::SeqCst);
            self.consume
        }

        fn configuration_changed(&self) {}
        fn remove_tray_icon_override(&self) {}
        fn show_notification(&self, _message: &str) {}
    }

    fn surface_event(code: u32) -> NativeEvent {
        NativeEvent::Surface {
            target: SurfaceId::next(),
            code,
        }
    }

    #[test]
    fn test_quit_returns_exit_code_and_discards_rest() {
        let (dispatch, events, _main) = DispatchLoop::new();
        let window = RecordingWindow::default();

        events.post(surface_event(1)).unwrap();
        events.post_quit(7).unwrap();
        events.post(surface_event(2)).unwrap();

        assert_eq!(dispatch.run(&window).unwrap(), 7);
        // only the event ahead of quit reached the pre-translation hook
        assert_eq!(window.translated.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_pre_translate_consumes_events() {
        let (dispatch, events, _main) = DispatchLoop::new();
        let window = RecordingWindow::consuming();

        events.post(surface_event(1)).unwrap();
        events.post(surface_event(2)).unwrap();
        events.post_quit(0).unwrap();

        assert_eq!(dispatch.run(&window).unwrap(), 0);
        assert_eq!(window.translated.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_main_dispatch_preserves_issue_order() {
        let (dispatch, events, main) = DispatchLoop::new();
        let window = RecordingWindow::default();

        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..8 {
            let seen = seen.clone();
            main.dispatch(move || seen.lock().push(i)).unwrap();
        }
        events.post_quit(0).unwrap();

        assert_eq!(dispatch.run(&window).unwrap(), 0);
        assert_eq!(*seen.lock(), (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_spawned_task_runs_and_posts_quit() {
        let (dispatch, events, main) = DispatchLoop::new();
        let window = RecordingWindow::default();

        let queue = events.clone();
        main.spawn(async move {
            queue.post_quit(3).unwrap();
        })
        .unwrap();

        assert_eq!(dispatch.run(&window).unwrap(), 3);
    }

    #[test]
    fn test_resume_hops_through_main_queue() {
        let (dispatch, events, main) = DispatchLoop::new();
        let window = RecordingWindow::default();

        let queue = events.clone();
        let hop = main.clone();
        main.spawn(async move {
            hop.resume().unwrap().await.unwrap();
            queue.post_quit(1).unwrap();
        })
        .unwrap();

        assert_eq!(dispatch.run(&window).unwrap(), 1);
    }

    #[test]
    fn test_disconnected_wake_channel_is_fatal() {
        let (dispatch, events, main) = DispatchLoop::new();
        let window = RecordingWindow::default();

        drop(events);
        drop(main);

        assert!(matches!(dispatch.run(&window), Err(ShellError::WaitFailed)));
    }

    #[test]
    fn test_closed_dispatcher_rejects_new_work() {
        let (_dispatch, _events, main) = DispatchLoop::new();
        main.close();
        assert!(matches!(
            main.dispatch(|| {}),
            Err(ShellError::DispatchClosed)
        ));
        assert!(matches!(
            main.spawn(async {}),
            Err(ShellError::DispatchClosed)
        ));
    }
}
