//! Glassbar: Shell Customization Runtime
//!
//! The orchestration core of a desktop shell-customization application:
//! multiple independent UI execution contexts (one per top-level surface)
//! layered over a single-threaded dispatch loop, plus the cross-context
//! shutdown protocol that negotiates application exit with every live
//! surface before tearing anything down.

pub mod app;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod logging;
pub mod onboarding;
pub mod shutdown;
pub mod startup;
pub mod surface;
