//! Execution contexts.
//!
//! An [`ExecutionContext`] is one live extension surface: a document host,
//! its fake API object, and (for popup/sidebar) an [`InteractionHelper`]
//! that drives DOM events. Contexts are built by the harness, held in its
//! registry, and destroyed exactly once — by the caller or by harness-wide
//! teardown.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ExecutionContext`] | Handle to one live surface |
//! | [`InteractionHelper`] | Click-driving helper for dependent surfaces |
//! | [`SourceSpec`] | What a surface is built from |
//! | [`LifecycleSynchronizer`] | Readiness state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Context assembly from a source spec.
pub(crate) mod builder;

/// Document readiness synchronization.
pub mod lifecycle;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SourceSpec;
pub use lifecycle::{LifecycleSynchronizer, SyncPhase};

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::api::ExtensionApi;
use crate::coverage::CoverageWriter;
use crate::engine::DocumentHost;
use crate::error::Result;
use crate::messaging::MessageTransport;
use crate::surface::Surface;

use lifecycle::next_tick;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a context.
struct ContextInner {
    /// Surface kind this context emulates.
    surface: Surface,
    /// Document environment handle.
    host: Arc<dyn DocumentHost>,
    /// Fake extension API handle.
    api: Arc<dyn ExtensionApi>,
    /// Shared message transport, for listener cleanup on destroy.
    transport: Arc<MessageTransport>,
    /// Coverage persistence, first step of destroy.
    writer: CoverageWriter,
    /// Interaction helper; present on dependent surfaces.
    helper: Option<InteractionHelper>,
    /// Set once destroy has begun.
    destroyed: AtomicBool,
}

// ============================================================================
// ExecutionContext
// ============================================================================

/// A handle to one live extension surface.
///
/// Cloning the handle shares the underlying context. Destroy runs exactly
/// once; repeat calls are no-ops.
#[derive(Clone)]
pub struct ExecutionContext {
    /// Shared inner state.
    inner: Arc<ContextInner>,
}

// ============================================================================
// ExecutionContext - Display
// ============================================================================

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("surface", &self.inner.surface)
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ExecutionContext - Constructor
// ============================================================================

impl ExecutionContext {
    /// Assembles a context handle.
    pub(crate) fn new(
        surface: Surface,
        host: Arc<dyn DocumentHost>,
        api: Arc<dyn ExtensionApi>,
        transport: Arc<MessageTransport>,
        writer: CoverageWriter,
    ) -> Self {
        let helper = surface
            .is_dependent()
            .then(|| InteractionHelper::new(Arc::clone(&host)));

        debug!(surface = %surface, "Context assembled");

        Self {
            inner: Arc::new(ContextInner {
                surface,
                host,
                api,
                transport,
                writer,
                helper,
                destroyed: AtomicBool::new(false),
            }),
        }
    }
}

// ============================================================================
// ExecutionContext - Accessors
// ============================================================================

impl ExecutionContext {
    /// Returns the surface kind.
    #[inline]
    #[must_use]
    pub fn surface(&self) -> Surface {
        self.inner.surface
    }

    /// Returns the document environment handle.
    #[inline]
    #[must_use]
    pub fn host(&self) -> &Arc<dyn DocumentHost> {
        &self.inner.host
    }

    /// Returns the fake extension API handle.
    #[inline]
    #[must_use]
    pub fn api(&self) -> &Arc<dyn ExtensionApi> {
        &self.inner.api
    }

    /// Returns the interaction helper; `None` on the background surface.
    #[inline]
    #[must_use]
    pub fn helper(&self) -> Option<&InteractionHelper> {
        self.inner.helper.as_ref()
    }

    /// Returns `true` once destroy has begun.
    #[inline]
    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }
}

// ============================================================================
// ExecutionContext - Lifecycle
// ============================================================================

impl ExecutionContext {
    /// Destroys the context: persists coverage, clears the surface's
    /// message listeners, and closes the document environment.
    ///
    /// Runs exactly once; repeat calls return `Ok` without effect. The
    /// environment is released even when persistence fails, but the
    /// failure is still surfaced.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::CoverageWrite`] if the coverage artifact
    /// cannot be written.
    pub async fn destroy(&self) -> Result<()> {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        debug!(surface = %self.inner.surface, "Destroying context");

        let persisted = self
            .inner
            .writer
            .persist(self.inner.surface, self.inner.host.as_ref())
            .await;

        self.inner.transport.clear_surface(self.inner.surface);
        self.inner.host.close();

        info!(surface = %self.inner.surface, "Context destroyed");
        persisted.map(|_| ())
    }
}

// ============================================================================
// InteractionHelper
// ============================================================================

/// Drives DOM events against a dependent surface's document.
///
/// Each interaction dispatches the event and then yields once through the
/// scheduler, so handler-triggered asynchronous work has had a chance to
/// run before control returns. Interactions against one context must be
/// awaited one at a time.
pub struct InteractionHelper {
    /// Document environment receiving the events.
    host: Arc<dyn DocumentHost>,
}

impl fmt::Debug for InteractionHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionHelper").finish_non_exhaustive()
    }
}

// ============================================================================
// InteractionHelper - Implementation
// ============================================================================

impl InteractionHelper {
    /// Creates a helper for the given document.
    pub(crate) fn new(host: Arc<dyn DocumentHost>) -> Self {
        Self { host }
    }

    /// Clicks the element with the given id, then drains one tick.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if no such element exists.
    pub async fn click_element_by_id(&self, id: &str) -> Result<()> {
        self.host.click_element_by_id(id).await?;
        next_tick().await;
        Ok(())
    }

    /// Clicks the last element matching `selector`, then drains one tick.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if nothing matches.
    pub async fn click_last_matching(&self, selector: &str) -> Result<()> {
        self.host.click_last_matching(selector).await?;
        next_tick().await;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
