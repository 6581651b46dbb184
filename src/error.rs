//! Error types for the glassbar orchestration core.

use thiserror::Error;

/// Errors raised by the dispatch loop, the execution contexts and the
/// collaborators they call into.
///
/// Surface refusal during shutdown is deliberately *not* represented here:
/// a surface declining to close is the expected cancellation path and drives
/// an aborted shutdown attempt, never an error.
#[derive(Debug, Error)]
pub enum ShellError {
    /// The wake channel behind the dispatch loop disconnected. This is the
    /// analog of a failed native wait and is fatal for the loop.
    #[error("event wait failed: wake channel disconnected")]
    WaitFailed,

    /// The main context stopped accepting work (its intake was closed during
    /// shutdown finalization).
    #[error("main dispatch queue is closed")]
    DispatchClosed,

    /// The target execution context's queue has already shut down.
    #[error("execution context '{0}' is shut down")]
    ContextClosed(String),

    /// A per-context task queue failed to drain during shutdown.
    #[error("failed to drain queue of execution context '{0}'")]
    QueueDrain(String),

    /// The asynchronous startup-registration precondition failed.
    #[error("startup registration failed: {0}")]
    Startup(String),

    /// Configuration load/save/delete failure.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
