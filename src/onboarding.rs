//! First-Run Onboarding Flow
//!
//! Presents a setup surface on its own execution context, optionally gated on
//! an asynchronous startup-registration precondition, and reacts to exactly
//! one of two terminal user actions: closed-without-approval (abandon
//! first-run, delete configuration, exit with a non-zero code) or approved
//! (persist configuration, reveal the tray affordance, notify).
//!
//! Listener lifetime is explicit: the approval reaction revokes the close
//! subscription before returning, because returning from the approval
//! handler itself fires the close event.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ConfigStore;
use crate::context::{ContextRegistry, ExecutionContext};
use crate::dispatch::MainDispatcher;
use crate::error::ShellError;
use crate::host::WindowManager;
use crate::shutdown::ShutdownCoordinator;
use crate::startup::{StartupManager, StartupTask};
use crate::surface::{PageContent, Surface};

/// Exit code signaling that onboarding was abandoned before approval.
pub const EXIT_ONBOARDING_CANCELLED: i32 = 1;

/// Notification shown once onboarding completes.
pub const WELCOME_NOTIFICATION: &str = "Setup complete. Glassbar is now running in your tray.";

type HandlerFn = Box<dyn FnMut() + Send>;

struct EventHandlers {
    next_id: u64,
    handlers: Vec<(u64, HandlerFn)>,
}

/// One user-visible event with revocable subscriptions.
///
/// Handlers run in subscription order. A handler must not subscribe to or
/// revoke from the event it is currently handling; revoking a *different*
/// event's subscription (the revoke-before-return idiom) is the supported
/// pattern.
#[derive(Clone)]
pub struct EventSource {
    inner: Arc<Mutex<EventHandlers>>,
}

impl EventSource {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(EventHandlers {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Register a handler. The subscription does not revoke on drop; call
    /// [`EventSubscription::revoke`] to deregister.
    pub fn subscribe(&self, handler: impl FnMut() + Send + 'static) -> EventSubscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Box::new(handler)));

        let weak = Arc::downgrade(&self.inner);
        EventSubscription {
            revoke: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.lock().handlers.retain(|(existing, _)| *existing != id);
                }
            })),
        }
    }

    fn fire(&self) {
        let mut inner = self.inner.lock();
        for (_, handler) in inner.handlers.iter_mut() {
            handler();
        }
    }

    #[cfg(test)]
    fn handler_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }
}

/// Handle to a registered event handler.
pub struct EventSubscription {
    revoke: Option<Box<dyn FnOnce() + Send>>,
}

impl EventSubscription {
    /// Deregister the handler. Required before any action documented to
    /// synchronously re-trigger the subscribed event.
    pub fn revoke(mut self) {
        if let Some(revoke) = self.revoke.take() {
            revoke();
        }
    }
}

/// Content of the first-run surface.
pub struct SetupPage {
    closed: EventSource,
    approved: EventSource,
    edit_requested: EventSource,
}

impl SetupPage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            closed: EventSource::new(),
            approved: EventSource::new(),
            edit_requested: EventSource::new(),
        })
    }

    /// Fired when the page closes without approval, and again (if still
    /// subscribed) after approval returns.
    pub fn on_closed(&self, handler: impl FnMut() + Send + 'static) -> EventSubscription {
        self.closed.subscribe(handler)
    }

    pub fn on_approved(&self, handler: impl FnMut() + Send + 'static) -> EventSubscription {
        self.approved.subscribe(handler)
    }

    pub fn on_edit_requested(&self, handler: impl FnMut() + Send + 'static) -> EventSubscription {
        self.edit_requested.subscribe(handler)
    }

    /// The user approved the setup. Runs the approval reactions, then fires
    /// the close event, since closing is an unavoidable side effect of
    /// approval.
    pub fn approve(&self) {
        self.approved.fire();
        self.closed.fire();
    }

    /// The user asked to edit the configuration file directly.
    pub fn request_edit(&self) {
        self.edit_requested.fire();
    }
}

impl PageContent for SetupPage {
    fn request_close(&self) -> bool {
        // The setup page never blocks closing; it reacts instead.
        self.closed.fire();
        true
    }
}

/// Handle to the onboarding surface, mutated only from the main context.
///
/// Non-empty exactly while the onboarding surface is open; cleared before
/// any follow-up action in either terminal path.
#[derive(Clone, Default)]
pub struct OnboardingState {
    surface: Arc<Mutex<Option<Surface>>>,
}

impl OnboardingState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, surface: Surface) {
        *self.surface.lock() = Some(surface);
    }

    pub fn clear(&self) {
        *self.surface.lock() = None;
    }

    pub fn current(&self) -> Option<Surface> {
        self.surface.lock().clone()
    }

    pub fn is_open(&self) -> bool {
        self.surface.lock().is_some()
    }
}

/// Live onboarding session: the created context, surface and page.
pub struct SetupSession {
    context: Arc<ExecutionContext>,
    surface: Surface,
    page: Arc<SetupPage>,
}

impl SetupSession {
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn page(&self) -> &Arc<SetupPage> {
        &self.page
    }

    /// The user closed the surface without approving.
    pub fn close(&self) {
        self.surface.try_close();
    }

    /// The user approved the setup.
    pub fn approve(&self) {
        self.page.approve();
        self.surface.release_page();
    }
}

/// Builds and runs the onboarding flow.
pub struct OnboardingFlow {
    registry: Arc<ContextRegistry>,
    main: MainDispatcher,
    config: Arc<dyn ConfigStore>,
    startup: Arc<dyn StartupManager>,
    window: Arc<dyn WindowManager>,
    state: OnboardingState,
    shutdown: ShutdownCoordinator,
}

impl OnboardingFlow {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ContextRegistry>,
        main: MainDispatcher,
        config: Arc<dyn ConfigStore>,
        startup: Arc<dyn StartupManager>,
        window: Arc<dyn WindowManager>,
        state: OnboardingState,
        shutdown: ShutdownCoordinator,
    ) -> Self {
        Self {
            registry,
            main,
            config,
            startup,
            window,
            state,
            shutdown,
        }
    }

    /// Run the flow: await the precondition (if any), enable the startup
    /// registration, then create the setup surface and wire its reactions.
    ///
    /// Enabling happens before surface creation because the close handler
    /// must synchronously decide whether to undo the registration, which is
    /// only safe once enabling has completed. A precondition failure is a
    /// fatal startup error; no surface is created and no partial onboarding
    /// state is left behind.
    pub async fn run(self, precondition: Option<StartupTask>) -> Result<SetupSession, ShellError> {
        let has_startup = precondition.is_some();
        if let Some(task) = precondition {
            task.await?;
            self.startup.enable().await?;
            debug!("startup registration enabled ahead of setup surface");
        }

        let context = ExecutionContext::spawn("setup", self.main.clone())?;
        self.registry.register(context.clone());

        let page = SetupPage::new();
        let surface = Surface::with_page(page.clone());
        context.set_surface(Some(surface.clone()));

        // Record the onboarding handle on the main context.
        {
            let state = self.state.clone();
            let surface = surface.clone();
            self.main.dispatch(move || state.set(surface))?;
        }

        let close_subscription = {
            let main = self.main.clone();
            let state = self.state.clone();
            let config = self.config.clone();
            let startup = self.startup.clone();
            let shutdown = self.shutdown.clone();
            page.on_closed(move || {
                let state = state.clone();
                let config = config.clone();
                let startup = startup.clone();
                let shutdown = shutdown.clone();
                let dispatched = main.dispatch(move || {
                    state.clear();
                    if has_startup {
                        startup.disable();
                    }
                    // First-run abandonment: no configuration should exist.
                    if let Err(error) = config.delete_config_file() {
                        warn!(%error, "could not delete configuration after abandoned setup");
                    }
                    info!("setup abandoned, requesting shutdown");
                    shutdown.request(EXIT_ONBOARDING_CANCELLED);
                });
                if let Err(error) = dispatched {
                    error!(%error, "could not dispatch setup cancellation");
                }
            })
        };

        {
            let main = self.main.clone();
            let config = self.config.clone();
            let _edit = page.on_edit_requested(move || {
                let config = config.clone();
                let dispatched = main.dispatch(move || {
                    if let Err(error) = config.edit_config_file() {
                        warn!(%error, "could not open configuration for editing");
                    }
                });
                if let Err(error) = dispatched {
                    error!(%error, "could not dispatch configuration edit");
                }
            });
        }

        {
            let main = self.main.clone();
            let state = self.state.clone();
            let config = self.config.clone();
            let window = self.window.clone();
            let mut close_subscription = Some(close_subscription);
            let _approved = page.on_approved(move || {
                // Returning from this handler fires the close event; the
                // cancellation reaction must not re-trigger.
                if let Some(subscription) = close_subscription.take() {
                    subscription.revoke();
                }

                let state = state.clone();
                let config = config.clone();
                let window = window.clone();
                let dispatched = main.dispatch(move || {
                    state.clear();
                    // Creates the config file if not already present.
                    if let Err(error) = config.save_config() {
                        warn!(%error, "could not persist configuration after approval");
                    }
                    window.remove_tray_icon_override();
                    window.show_notification(WELCOME_NOTIFICATION);
                });
                if let Err(error) = dispatched {
                    error!(%error, "could not dispatch setup approval");
                }
            });
        }

        info!(
            surface = surface.id().as_u64(),
            has_startup, "setup surface created"
        );
        Ok(SetupSession {
            context,
            surface,
            page,
        })
    }
}
