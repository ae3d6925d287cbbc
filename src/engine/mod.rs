//! Document engine seam.
//!
//! The harness does not parse HTML or run script text itself; an external
//! engine does. This module defines the contract that engine must satisfy:
//!
//! - [`DocumentEngine`] opens a document and hands back a [`DocumentHost`]
//! - [`DocumentHost`] is the window-like environment of one document:
//!   readiness, script evaluation, lifecycle signal dispatch, element
//!   clicks, and the accumulated coverage object
//!
//! The [`crate::testing`] module ships an in-process simulation of both
//! traits for test suites that don't want a real engine.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Markup for a blank host document used by deferred script injection.
pub const BLANK_DOCUMENT: &str = "<!DOCTYPE html><html><head></head><body></body></html>";

// ============================================================================
// ReadyState
// ============================================================================

/// Document readiness, mirroring the standard `document.readyState` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    /// The document is still being parsed.
    Loading,
    /// Parsing finished; subresources may still be loading.
    Interactive,
    /// Terminal readiness: the document and its subresources are loaded.
    Complete,
}

impl ReadyState {
    /// Returns `true` if this is the terminal readiness value.
    #[inline]
    #[must_use]
    pub const fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }
}

// ============================================================================
// LifecycleSignal
// ============================================================================

/// A document-lifecycle signal the harness can observe or re-dispatch.
///
/// Dispatching a signal through [`DocumentHost::dispatch`] must invoke every
/// handler the evaluated scripts installed for it; for
/// [`LifecycleSignal::ReadyStateChange`] that includes an
/// `onreadystatechange`-style property handler, not just event listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleSignal {
    /// The content-loaded signal (`DOMContentLoaded`).
    ContentLoaded,
    /// The window load-completion signal.
    Load,
    /// The ready-state-change signal.
    ReadyStateChange,
}

impl LifecycleSignal {
    /// Returns the signal name as used in logs.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ContentLoaded => "content-loaded",
            Self::Load => "load",
            Self::ReadyStateChange => "ready-state-change",
        }
    }
}

// ============================================================================
// DocumentSource
// ============================================================================

/// What the engine should parse into a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// Parse the file at this path, evaluating inline scripts as a browser
    /// would.
    File(PathBuf),
    /// Parse the given markup string.
    Markup(String),
}

impl DocumentSource {
    /// A blank document, used as the host for deferred script injection.
    #[inline]
    #[must_use]
    pub fn blank() -> Self {
        Self::Markup(BLANK_DOCUMENT.to_string())
    }
}

// ============================================================================
// EnvSetup
// ============================================================================

/// Injection hook applied to the environment before any script runs.
///
/// The engine must invoke this after creating the host but before parsing
/// begins, so globals (the fake extension API) exist when the first script
/// evaluates.
pub type EnvSetup = Box<dyn FnOnce(&dyn DocumentHost) -> Result<()> + Send>;

// ============================================================================
// DocumentEngine
// ============================================================================

/// External component that parses documents and evaluates script text.
#[async_trait]
pub trait DocumentEngine: Send + Sync {
    /// Opens a document and resolves once initial parsing has finished.
    ///
    /// For [`DocumentSource::File`], inline scripts run during the parse.
    /// For [`DocumentSource::Markup`], the markup is parsed as-is; the
    /// harness injects scripts afterward via [`DocumentHost::evaluate`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if the document cannot be opened.
    async fn open(&self, source: DocumentSource, setup: EnvSetup) -> Result<Arc<dyn DocumentHost>>;
}

// ============================================================================
// DocumentHost
// ============================================================================

/// The window-like environment of one open document.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    /// Current document readiness.
    fn ready_state(&self) -> ReadyState;

    /// Attaches the fake extension API object to the environment.
    ///
    /// Called from the [`EnvSetup`] hook before any script runs; the engine
    /// exposes the handle to scripts as the `browser`/`chrome` globals.
    fn attach_api(&self, api: Arc<dyn crate::api::ExtensionApi>) -> Result<()>;

    /// Evaluates script text against the environment.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if evaluation fails.
    async fn evaluate(&self, source: &str) -> Result<()>;

    /// Resolves once the load-completion signal has fired.
    ///
    /// Resolves immediately if the document is already complete.
    async fn wait_for_load(&self) -> Result<()>;

    /// Dispatches a lifecycle signal, invoking installed handlers.
    fn dispatch(&self, signal: LifecycleSignal) -> Result<()>;

    /// Clicks the element with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if no such element exists.
    async fn click_element_by_id(&self, id: &str) -> Result<()>;

    /// Clicks the last element matching the given selector.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Engine`] if nothing matches.
    async fn click_last_matching(&self, selector: &str) -> Result<()>;

    /// The coverage object accumulated by instrumented scripts, if any.
    fn coverage(&self) -> Option<Value>;

    /// Releases the document environment.
    fn close(&self);
}

// ============================================================================
// Tests
// ============================================================================
