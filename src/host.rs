//! Window-Management Collaborator Boundary
//!
//! The orchestration core does not own window chrome, tray icons or toast
//! presentation. It consumes this contract: a pre-translation hook consulted
//! before default event dispatch, plus the notifications the onboarding flow
//! and configuration system send outward.

use tracing::{debug, trace};

use crate::dispatch::NativeEvent;

/// Contract supplied by the window-management collaborator.
pub trait WindowManager: Send + Sync {
    /// Offered every non-quit native event before default processing.
    /// Returning `true` consumes the event.
    fn pre_translate(&self, event: &NativeEvent) -> bool;

    /// The persisted configuration changed; re-apply derived state.
    fn configuration_changed(&self);

    /// Stop suppressing the tray affordance (onboarding approved).
    fn remove_tray_icon_override(&self);

    /// Present a notification to the user.
    fn show_notification(&self, message: &str);
}

/// Window manager that consumes nothing and presents nothing. Used by hosts
/// without a windowing backend and as a quiet default in tooling.
#[derive(Debug, Default)]
pub struct NullWindowManager;

impl WindowManager for NullWindowManager {
    fn pre_translate(&self, event: &NativeEvent) -> bool {
        trace!(?event, "pre-translate (null window manager)");
        false
    }

    fn configuration_changed(&self) {
        debug!("configuration changed (null window manager)");
    }

    fn remove_tray_icon_override(&self) {
        debug!("tray icon override removed (null window manager)");
    }

    fn show_notification(&self, message: &str) {
        debug!(message, "notification suppressed (null window manager)");
    }
}
