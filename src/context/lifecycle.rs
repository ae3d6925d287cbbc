//! Document readiness synchronization.
//!
//! Two script-execution strategies exist, each with its own ready contract:
//!
//! - **Inline**: the engine evaluates scripts as the document parses. Ready
//!   means the document reached terminal readiness and the load signal
//!   fired.
//! - **Deferred**: the document parses to completion with no scripts, and
//!   script text is evaluated afterward (this is what makes source
//!   interception for instrumentation possible). A document that settled
//!   before the scripts ran would never fire readiness at their listeners,
//!   so the synchronizer re-dispatches the standard readiness sequence in
//!   exactly that case.
//!
//! Readiness is an explicit state machine:
//!
//! ```text
//! Parsing ──settle_inline (load observed)──────────────▶ Ready
//!    │
//!    └─mark_parsed─▶ ScriptsPending ──settle_deferred──▶ Ready
//! ```
//!
//! Both paths end with a single yield through the scheduler before `Ready`,
//! draining microtask-level initialization queued by the evaluated scripts.

// ============================================================================
// Imports
// ============================================================================

use tracing::debug;

use crate::engine::{DocumentHost, LifecycleSignal};
use crate::error::{Error, Result};

// ============================================================================
// SyncPhase
// ============================================================================

/// The synchronizer's position in the readiness sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// The document is still parsing (or scripts run inline with it).
    Parsing,
    /// The document has parsed; deferred scripts have not yet settled.
    ///
    /// Records whether the document had already reached terminal readiness
    /// at the checkpoint, which decides the re-dispatch on settle.
    ScriptsPending {
        /// Document was complete before deferred evaluation began.
        settled_before_scripts: bool,
    },
    /// The ready checkpoint has resolved.
    Ready,
}

// ============================================================================
// LifecycleSynchronizer
// ============================================================================

/// Drives one context's document to a stable ready checkpoint.
///
/// The checkpoint resolves exactly once: settling an already-ready
/// synchronizer is a no-op, and out-of-order transitions are configuration
/// errors rather than silent re-dispatches.
#[derive(Debug)]
pub struct LifecycleSynchronizer {
    /// Current phase.
    phase: SyncPhase,
}

impl Default for LifecycleSynchronizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LifecycleSynchronizer - Implementation
// ============================================================================

impl LifecycleSynchronizer {
    /// Creates a synchronizer in the parsing phase.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            phase: SyncPhase::Parsing,
        }
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    /// Returns `true` once the ready checkpoint has resolved.
    #[inline]
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.phase, SyncPhase::Ready)
    }

    /// Settles an inline-execution document.
    ///
    /// If the document is not yet complete, awaits the engine's load signal
    /// and then dispatches a ready-state-change (engines don't reliably
    /// fire it, and scripts may have installed a handler for it). If the
    /// document was already complete, the engine's own sequence stands and
    /// nothing is dispatched.
    pub async fn settle_inline(&mut self, host: &dyn DocumentHost) -> Result<()> {
        match self.phase {
            SyncPhase::Ready => return Ok(()),
            SyncPhase::ScriptsPending { .. } => {
                return Err(Error::configuration(
                    "lifecycle synchronizer: inline settle after a deferred checkpoint",
                ));
            }
            SyncPhase::Parsing => {}
        }

        if !host.ready_state().is_complete() {
            host.wait_for_load().await?;
            host.dispatch(LifecycleSignal::ReadyStateChange)?;
        }

        self.finish().await
    }

    /// Records the parse-complete checkpoint before deferred evaluation.
    pub fn mark_parsed(&mut self, host: &dyn DocumentHost) -> Result<()> {
        if self.phase != SyncPhase::Parsing {
            return Err(Error::configuration(
                "lifecycle synchronizer: parse checkpoint recorded twice",
            ));
        }

        let settled_before_scripts = host.ready_state().is_complete();
        debug!(settled_before_scripts, "Deferred parse checkpoint");
        self.phase = SyncPhase::ScriptsPending {
            settled_before_scripts,
        };
        Ok(())
    }

    /// Settles a deferred-execution document after its scripts evaluated.
    ///
    /// If the document was already complete at the checkpoint, re-dispatches
    /// the standard readiness sequence so listeners the scripts installed
    /// still observe it. Otherwise awaits the engine's own completion and
    /// leaves its dispatch undisturbed.
    pub async fn settle_deferred(&mut self, host: &dyn DocumentHost) -> Result<()> {
        let settled_before_scripts = match self.phase {
            SyncPhase::Ready => return Ok(()),
            SyncPhase::Parsing => {
                return Err(Error::configuration(
                    "lifecycle synchronizer: deferred settle without a parse checkpoint",
                ));
            }
            SyncPhase::ScriptsPending {
                settled_before_scripts,
            } => settled_before_scripts,
        };

        if settled_before_scripts {
            debug!("Re-dispatching readiness sequence after deferred evaluation");
            host.dispatch(LifecycleSignal::ContentLoaded)?;
            host.dispatch(LifecycleSignal::Load)?;
            host.dispatch(LifecycleSignal::ReadyStateChange)?;
        } else if !host.ready_state().is_complete() {
            host.wait_for_load().await?;
        }

        self.finish().await
    }

    /// Enters the ready phase after one scheduler-tick drain.
    async fn finish(&mut self) -> Result<()> {
        next_tick().await;
        self.phase = SyncPhase::Ready;
        debug!("Context ready checkpoint resolved");
        Ok(())
    }
}

// ============================================================================
// Scheduler Helpers
// ============================================================================

/// Yields control once through the host scheduler.
///
/// Used after readiness and after interaction events so queued continuations
/// drain before control returns to the caller.
pub(crate) async fn next_tick() {
    tokio::task::yield_now().await;
}

// ============================================================================
// Tests
// ============================================================================
