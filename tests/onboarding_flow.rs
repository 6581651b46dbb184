//! Integration tests for the first-run onboarding flow: the startup
//! precondition, the two terminal paths (abandoned and approved) and the
//! config-edit request, each observed through recording collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use glassbar::config::{ConfigStore, ShellConfig};
use glassbar::context::ContextRegistry;
use glassbar::dispatch::{DispatchLoop, EventQueue, MainDispatcher};
use glassbar::error::ShellError;
use glassbar::host::{NullWindowManager, WindowManager};
use glassbar::onboarding::{OnboardingFlow, OnboardingState, EXIT_ONBOARDING_CANCELLED, WELCOME_NOTIFICATION};
use glassbar::shutdown::ShutdownCoordinator;
use glassbar::startup::{StartupManager, StartupTask};
use glassbar::surface::Surface;
use parking_lot::Mutex;

#[derive(Default)]
struct RecordingConfig {
    saves: AtomicUsize,
    deletes: AtomicUsize,
    edits: AtomicUsize,
}

impl ConfigStore for RecordingConfig {
    fn get_config(&self) -> ShellConfig {
        ShellConfig::default()
    }

    fn save_config(&self) -> Result<(), ShellError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_config_file(&self) -> Result<(), ShellError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn edit_config_file(&self) -> Result<(), ShellError> {
        self.edits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct RecordingStartup {
    registry: Arc<ContextRegistry>,
    enables: AtomicUsize,
    disables: AtomicUsize,
    contexts_at_enable: AtomicUsize,
}

impl RecordingStartup {
    fn new(registry: Arc<ContextRegistry>) -> Self {
        Self {
            registry,
            enables: AtomicUsize::new(0),
            disables: AtomicUsize::new(0),
            contexts_at_enable: AtomicUsize::new(usize::MAX),
        }
    }
}

#[async_trait]
impl StartupManager for RecordingStartup {
    fn acquire_task(&self) -> Option<StartupTask> {
        None
    }

    async fn enable(&self) -> Result<(), ShellError> {
        self.enables.fetch_add(1, Ordering::SeqCst);
        self.contexts_at_enable
            .store(self.registry.len(), Ordering::SeqCst);
        Ok(())
    }

    fn disable(&self) {
        self.disables.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RecordingWindow {
    tray_removed: AtomicUsize,
    notifications: Mutex<Vec<String>>,
}

impl WindowManager for RecordingWindow {
    fn pre_translate(&self, _event: &glassbar::dispatch::NativeEvent) -> bool {
        false
    }

    fn configuration_changed(&self) {}

    fn remove_tray_icon_override(&self) {
        self.tray_removed.fetch_add(1, Ordering::SeqCst);
    }

    fn show_notification(&self, message: &str) {
        self.notifications.lock().push(message.to_string());
    }
}

struct Harness {
    dispatch: DispatchLoop,
    events: EventQueue,
    main: MainDispatcher,
    registry: Arc<ContextRegistry>,
    state: OnboardingState,
    shutdown: ShutdownCoordinator,
    config: Arc<RecordingConfig>,
    startup: Arc<RecordingStartup>,
    window: Arc<RecordingWindow>,
}

impl Harness {
    fn new() -> Self {
        let (dispatch, events, main) = DispatchLoop::new();
        let registry = Arc::new(ContextRegistry::new());
        let shutdown = ShutdownCoordinator::new(registry.clone(), main.clone(), events.clone());
        Self {
            dispatch,
            events,
            main,
            registry: registry.clone(),
            state: OnboardingState::new(),
            shutdown,
            config: Arc::new(RecordingConfig::default()),
            startup: Arc::new(RecordingStartup::new(registry)),
            window: Arc::new(RecordingWindow::default()),
        }
    }

    fn flow(&self) -> OnboardingFlow {
        OnboardingFlow::new(
            self.registry.clone(),
            self.main.clone(),
            self.config.clone() as Arc<dyn ConfigStore>,
            self.startup.clone() as Arc<dyn StartupManager>,
            self.window.clone() as Arc<dyn WindowManager>,
            self.state.clone(),
            self.shutdown.clone(),
        )
    }
}

#[test]
fn abandoning_setup_deletes_config_and_exits_cancelled() {
    let harness = Harness::new();
    let flow = harness.flow();
    harness
        .main
        .spawn(async move {
            let session = flow.run(None).await.unwrap();
            session.close();
        })
        .unwrap();

    let exit_code = harness.dispatch.run(&NullWindowManager).unwrap();
    assert_eq!(exit_code, EXIT_ONBOARDING_CANCELLED);
    assert_eq!(harness.config.deletes.load(Ordering::SeqCst), 1);
    assert_eq!(harness.config.saves.load(Ordering::SeqCst), 0);
    // no precondition was supplied, so there is no registration to undo
    assert_eq!(harness.startup.enables.load(Ordering::SeqCst), 0);
    assert_eq!(harness.startup.disables.load(Ordering::SeqCst), 0);
    assert!(!harness.state.is_open());
    assert!(harness.registry.is_empty());
}

#[test]
fn abandoning_setup_with_precondition_undoes_the_registration() {
    let harness = Harness::new();
    let (completion, task) = StartupTask::pair();
    completion.complete(true);

    let flow = harness.flow();
    harness
        .main
        .spawn(async move {
            let session = flow.run(Some(task)).await.unwrap();
            session.close();
        })
        .unwrap();

    let exit_code = harness.dispatch.run(&NullWindowManager).unwrap();
    assert_eq!(exit_code, EXIT_ONBOARDING_CANCELLED);
    assert_eq!(harness.startup.enables.load(Ordering::SeqCst), 1);
    assert_eq!(harness.startup.disables.load(Ordering::SeqCst), 1);
    assert_eq!(harness.config.deletes.load(Ordering::SeqCst), 1);
    // enabling finished before the setup context existed
    assert_eq!(harness.startup.contexts_at_enable.load(Ordering::SeqCst), 0);
}

#[test]
fn approving_setup_persists_config_and_reveals_the_tray() {
    let harness = Harness::new();
    let (completion, task) = StartupTask::pair();
    completion.complete(true);

    let flow = harness.flow();
    let events = harness.events.clone();
    harness
        .main
        .spawn(async move {
            let session = flow.run(Some(task)).await.unwrap();
            session.approve();
            events.post_quit(0).unwrap();
        })
        .unwrap();

    assert_eq!(harness.dispatch.run(&NullWindowManager).unwrap(), 0);
    assert_eq!(harness.config.saves.load(Ordering::SeqCst), 1);
    // approval must not run the cancellation reaction
    assert_eq!(harness.config.deletes.load(Ordering::SeqCst), 0);
    assert_eq!(harness.startup.disables.load(Ordering::SeqCst), 0);
    assert_eq!(harness.window.tray_removed.load(Ordering::SeqCst), 1);
    assert_eq!(
        *harness.window.notifications.lock(),
        vec![WELCOME_NOTIFICATION.to_string()]
    );
    assert!(!harness.state.is_open());
}

#[test]
fn edit_request_opens_the_config_file() {
    let harness = Harness::new();
    let flow = harness.flow();
    let events = harness.events.clone();
    harness
        .main
        .spawn(async move {
            let session = flow.run(None).await.unwrap();
            session.page().request_edit();
            events.post_quit(0).unwrap();
        })
        .unwrap();

    assert_eq!(harness.dispatch.run(&NullWindowManager).unwrap(), 0);
    assert_eq!(harness.config.edits.load(Ordering::SeqCst), 1);
    // the edit request is not a terminal action
    assert!(harness.state.is_open());
    assert_eq!(harness.registry.len(), 1);
}

#[test]
fn failed_precondition_aborts_before_any_surface_exists() {
    let harness = Harness::new();
    let (completion, task) = StartupTask::pair();
    drop(completion);

    let flow = harness.flow();
    let events = harness.events.clone();
    let failure = Arc::new(Mutex::new(None));
    {
        let failure = failure.clone();
        harness
            .main
            .spawn(async move {
                *failure.lock() = flow.run(Some(task)).await.err();
                events.post_quit(0).unwrap();
            })
            .unwrap();
    }

    assert_eq!(harness.dispatch.run(&NullWindowManager).unwrap(), 0);
    assert!(matches!(*failure.lock(), Some(ShellError::Startup(_))));
    assert_eq!(harness.startup.enables.load(Ordering::SeqCst), 0);
    assert!(!harness.state.is_open());
    assert!(harness.registry.is_empty());
}

#[test]
fn onboarding_surface_can_be_foregrounded_while_open() {
    let harness = Harness::new();
    let flow = harness.flow();
    let state = harness.state.clone();
    let main = harness.main.clone();
    let events = harness.events.clone();
    let foregrounded = Arc::new(Mutex::new(None::<Surface>));
    {
        let foregrounded = foregrounded.clone();
        harness
            .main
            .spawn(async move {
                let _session = flow.run(None).await.unwrap();
                // hop through the main queue so the state recording ran
                main.resume().unwrap().await.unwrap();
                let surface = state.current().unwrap();
                surface.bring_to_foreground();
                *foregrounded.lock() = Some(surface);
                events.post_quit(0).unwrap();
            })
            .unwrap();
    }

    assert_eq!(harness.dispatch.run(&NullWindowManager).unwrap(), 0);
    let surface = foregrounded.lock().clone().unwrap();
    assert_eq!(surface.foreground_requests(), 1);
}
