//! Top-Level Visual Surfaces
//!
//! A [`Surface`] is the handle to one top-level window tracked by an
//! execution context. The visual layer itself (markup, styling, rendering)
//! lives outside this crate; what the orchestration core needs from a surface
//! is close negotiation, a content slot, and a way to signal the user when a
//! surface blocks application exit.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

/// Process-unique identifier for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Allocate the next surface id (monotonic, process-wide).
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        SurfaceId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Content hosted by a surface.
///
/// The only contract the orchestration core relies on: when the surface is
/// asked to close, the page decides whether to accept. Returning `false` is
/// the expected cancellation path during shutdown, not an error.
pub trait PageContent: Send + Sync {
    /// Ask the page to close. Must be called on the owning context's thread.
    fn request_close(&self) -> bool;
}

struct SurfaceInner {
    id: SurfaceId,
    page: Mutex<Option<Arc<dyn PageContent>>>,
    foreground_requests: AtomicUsize,
    closed: AtomicBool,
}

/// Cloneable handle to a top-level surface.
#[derive(Clone)]
pub struct Surface {
    inner: Arc<SurfaceInner>,
}

impl Surface {
    /// Create a surface with no content yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SurfaceInner {
                id: SurfaceId::next(),
                page: Mutex::new(None),
                foreground_requests: AtomicUsize::new(0),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Create a surface hosting the given page.
    pub fn with_page(page: Arc<dyn PageContent>) -> Self {
        let surface = Self::new();
        *surface.inner.page.lock() = Some(page);
        surface
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    /// Whether the surface currently hosts non-empty content. A surface
    /// without content never blocks shutdown.
    pub fn has_content(&self) -> bool {
        self.inner.page.lock().is_some()
    }

    /// Ask the surface to close. Returns `true` if the surface accepted (or
    /// had no content to begin with); `false` if the page declined.
    ///
    /// On acceptance the content slot is released, so a later shutdown pass
    /// sees the surface as empty.
    pub fn try_close(&self) -> bool {
        let page = self.inner.page.lock().clone();
        match page {
            Some(page) => {
                if page.request_close() {
                    *self.inner.page.lock() = None;
                    self.inner.closed.store(true, Ordering::Release);
                    debug!(surface = self.id().as_u64(), "surface closed");
                    true
                } else {
                    debug!(surface = self.id().as_u64(), "surface declined to close");
                    false
                }
            }
            None => true,
        }
    }

    /// Release the content slot without close negotiation. Used when the
    /// page has already torn itself down (e.g. after onboarding approval).
    pub fn release_page(&self) {
        *self.inner.page.lock() = None;
        self.inner.closed.store(true, Ordering::Release);
    }

    /// Bring the surface to the foreground. The real presentation is owned
    /// by the window-management collaborator; the core records the request so
    /// a refused shutdown visibly signals which surface blocked it.
    pub fn bring_to_foreground(&self) {
        self.inner.foreground_requests.fetch_add(1, Ordering::Relaxed);
        debug!(surface = self.id().as_u64(), "surface brought to foreground");
    }

    /// Number of foreground requests observed so far.
    pub fn foreground_requests(&self) -> usize {
        self.inner.foreground_requests.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for Surface {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.inner.id)
            .field("has_content", &self.has_content())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPage(bool);

    impl PageContent for FixedPage {
        fn request_close(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_surface_ids_are_unique() {
        let a = Surface::new();
        let b = Surface::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_empty_surface_accepts_close() {
        let surface = Surface::new();
        assert!(!surface.has_content());
        assert!(surface.try_close());
    }

    #[test]
    fn test_accepting_page_releases_content() {
        let surface = Surface::with_page(Arc::new(FixedPage(true)));
        assert!(surface.has_content());
        assert!(surface.try_close());
        assert!(!surface.has_content());
        assert!(surface.is_closed());
    }

    #[test]
    fn test_declining_page_keeps_content() {
        let surface = Surface::with_page(Arc::new(FixedPage(false)));
        assert!(!surface.try_close());
        assert!(surface.has_content());
        assert!(!surface.is_closed());
    }

    #[test]
    fn test_foreground_requests_are_counted() {
        let surface = Surface::new();
        assert_eq!(surface.foreground_requests(), 0);
        surface.bring_to_foreground();
        surface.bring_to_foreground();
        assert_eq!(surface.foreground_requests(), 2);
    }
}
