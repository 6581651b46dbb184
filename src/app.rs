//! Application Composition Root
//!
//! Thin wiring layer over the orchestration core: holds the context registry,
//! the main dispatcher handles and the collaborator boundaries, and exposes
//! the entry points the host calls (shutdown requests, onboarding start,
//! configuration-changed fan-out).

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::config::ConfigStore;
use crate::context::ContextRegistry;
use crate::dispatch::{EventQueue, MainDispatcher};
use crate::error::ShellError;
use crate::host::WindowManager;
use crate::onboarding::{OnboardingFlow, OnboardingState};
use crate::shutdown::ShutdownCoordinator;
use crate::startup::{StartupManager, StartupTask};

type ConfigObserver = Box<dyn Fn() + Send + Sync>;

/// The composed application.
pub struct App {
    registry: Arc<ContextRegistry>,
    main: MainDispatcher,
    events: EventQueue,
    config: Arc<dyn ConfigStore>,
    startup: Arc<dyn StartupManager>,
    window: Arc<dyn WindowManager>,
    state: OnboardingState,
    shutdown: ShutdownCoordinator,
    config_observers: Mutex<Vec<ConfigObserver>>,
}

impl App {
    pub fn new(
        main: MainDispatcher,
        events: EventQueue,
        config: Arc<dyn ConfigStore>,
        startup: Arc<dyn StartupManager>,
        window: Arc<dyn WindowManager>,
    ) -> Arc<Self> {
        let registry = Arc::new(ContextRegistry::new());
        let shutdown = ShutdownCoordinator::new(registry.clone(), main.clone(), events.clone());
        Arc::new(Self {
            registry,
            main,
            events,
            config,
            startup,
            window,
            state: OnboardingState::new(),
            shutdown,
            config_observers: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    pub fn main(&self) -> &MainDispatcher {
        &self.main
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn onboarding_state(&self) -> &OnboardingState {
        &self.state
    }

    /// Request application shutdown with the given exit code.
    pub fn request_shutdown(&self, exit_code: i32) {
        self.shutdown.request(exit_code);
    }

    /// Start the onboarding flow on the main context.
    pub fn begin_onboarding(&self, precondition: Option<StartupTask>) -> Result<(), ShellError> {
        let flow = OnboardingFlow::new(
            self.registry.clone(),
            self.main.clone(),
            self.config.clone(),
            self.startup.clone(),
            self.window.clone(),
            self.state.clone(),
            self.shutdown.clone(),
        );
        self.main.spawn(async move {
            if let Err(fatal) = flow.run(precondition).await {
                // Precondition failures are unrecoverable startup errors; the
                // surface was never created, so nothing is left dangling.
                error!(%fatal, "onboarding flow failed");
            }
        })
    }

    /// Foreground the onboarding surface if it is open.
    pub fn bring_setup_to_front(&self) -> bool {
        match self.state.current() {
            Some(surface) => {
                surface.bring_to_foreground();
                true
            }
            None => false,
        }
    }

    /// Register an observer for configuration changes. Held by the
    /// composition root and invoked by reference, never through a recovered
    /// context pointer.
    pub fn on_configuration_changed(&self, observer: impl Fn() + Send + Sync + 'static) {
        self.config_observers.lock().push(Box::new(observer));
    }

    /// The persisted configuration changed: notify registered observers and
    /// the window-management collaborator.
    pub fn configuration_changed(&self) {
        debug!("configuration changed");
        for observer in self.config_observers.lock().iter() {
            observer();
        }
        self.window.configuration_changed();
    }
}
