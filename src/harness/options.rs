//! Harness configuration options.
//!
//! Every recognized knob is an explicit field of [`HarnessOptions`]; there
//! is no environment-variable switching and no open-ended options bag.
//!
//! # Example
//!
//! ```ignore
//! use webext_harness::{HarnessOptions, SurfacePolicy, CoverageConfig, Instrumenter};
//!
//! let options = HarnessOptions::new()
//!     .with_api_fake()
//!     .with_wiring()
//!     .with_sidebar(SurfacePolicy::Disabled)
//!     .with_coverage(
//!         CoverageConfig::enabled("./.coverage")
//!             .with_instrumenter(Instrumenter::new("nyc").with_arg("instrument")),
//!     );
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::instrument::Instrumenter;

// ============================================================================
// ReadyHook
// ============================================================================

/// Async callback invoked around a context's ready checkpoint.
///
/// `before_ready` runs after the document and its scripts have evaluated
/// but before the readiness drain; `after_ready` runs once the context is
/// fully ready. A hook error fails the build and the context is released.
pub type ReadyHook =
    Arc<dyn Fn(ExecutionContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

// ============================================================================
// SurfacePolicy
// ============================================================================

/// Whether the orchestrator builds a surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SurfacePolicy {
    /// Build the surface when the manifest declares it (default).
    #[default]
    Declared,
    /// Never build the surface, declared or not.
    Disabled,
}

impl SurfacePolicy {
    /// Returns `true` if a declared surface should be built.
    #[inline]
    #[must_use]
    pub const fn builds(self) -> bool {
        matches!(self, Self::Declared)
    }
}

// ============================================================================
// CoverageConfig
// ============================================================================

/// Coverage collection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageConfig {
    /// Whether coverage collection is enabled.
    pub enabled: bool,

    /// Directory receiving one artifact per destroyed context.
    pub temp_directory: PathBuf,

    /// External instrumentation step. Required when enabled.
    pub instrumenter: Option<Instrumenter>,
}

impl CoverageConfig {
    /// Creates a disabled coverage configuration.
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates an enabled configuration writing artifacts under `dir`.
    #[inline]
    #[must_use]
    pub fn enabled(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            temp_directory: dir.into(),
            instrumenter: None,
        }
    }

    /// Sets the external instrumentation step.
    #[inline]
    #[must_use]
    pub fn with_instrumenter(mut self, instrumenter: Instrumenter) -> Self {
        self.instrumenter = Some(instrumenter);
        self
    }

    /// Returns the artifact directory.
    #[inline]
    #[must_use]
    pub fn temp_directory(&self) -> &Path {
        &self.temp_directory
    }
}

// ============================================================================
// HarnessOptions
// ============================================================================

/// Orchestrator configuration.
///
/// Controls which surfaces are built, whether the fake API's stub behaviors
/// are populated, whether cross-context message wiring is installed, and
/// how coverage is collected.
#[derive(Clone, Default)]
pub struct HarnessOptions {
    /// Background surface policy.
    pub background: SurfacePolicy,

    /// Popup surface policy.
    pub popup: SurfacePolicy,

    /// Sidebar surface policy.
    pub sidebar: SurfacePolicy,

    /// Populate the fake API's stub implementations.
    pub api_fake: bool,

    /// Enable cross-context message simulation.
    pub wiring: bool,

    /// Coverage collection settings.
    pub coverage: CoverageConfig,

    /// Hook invoked before each context's readiness drain.
    pub before_ready: Option<ReadyHook>,

    /// Hook invoked after each context is ready.
    pub after_ready: Option<ReadyHook>,
}

// ============================================================================
// HarnessOptions - Display
// ============================================================================

impl fmt::Debug for HarnessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessOptions")
            .field("background", &self.background)
            .field("popup", &self.popup)
            .field("sidebar", &self.sidebar)
            .field("api_fake", &self.api_fake)
            .field("wiring", &self.wiring)
            .field("coverage", &self.coverage)
            .field("before_ready", &self.before_ready.is_some())
            .field("after_ready", &self.after_ready.is_some())
            .finish()
    }
}

// ============================================================================
// HarnessOptions - Constructors
// ============================================================================

impl HarnessOptions {
    /// Creates options with default settings: build every declared surface,
    /// no stub population, no wiring, coverage disabled.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// HarnessOptions - Builder Methods
// ============================================================================

impl HarnessOptions {
    /// Sets the background surface policy.
    #[inline]
    #[must_use]
    pub fn with_background(mut self, policy: SurfacePolicy) -> Self {
        self.background = policy;
        self
    }

    /// Sets the popup surface policy.
    #[inline]
    #[must_use]
    pub fn with_popup(mut self, policy: SurfacePolicy) -> Self {
        self.popup = policy;
        self
    }

    /// Sets the sidebar surface policy.
    #[inline]
    #[must_use]
    pub fn with_sidebar(mut self, policy: SurfacePolicy) -> Self {
        self.sidebar = policy;
        self
    }

    /// Populates the fake API's stub implementations in every context.
    #[inline]
    #[must_use]
    pub fn with_api_fake(mut self) -> Self {
        self.api_fake = true;
        self
    }

    /// Enables cross-context message simulation.
    #[inline]
    #[must_use]
    pub fn with_wiring(mut self) -> Self {
        self.wiring = true;
        self
    }

    /// Sets the coverage configuration.
    #[inline]
    #[must_use]
    pub fn with_coverage(mut self, coverage: CoverageConfig) -> Self {
        self.coverage = coverage;
        self
    }

    /// Sets the hook invoked before each context's readiness drain.
    #[must_use]
    pub fn with_before_ready(mut self, hook: ReadyHook) -> Self {
        self.before_ready = Some(hook);
        self
    }

    /// Sets the hook invoked after each context is ready.
    #[must_use]
    pub fn with_after_ready(mut self, hook: ReadyHook) -> Self {
        self.after_ready = Some(hook);
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl HarnessOptions {
    /// Validates the options configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if coverage is enabled without an
    /// instrumenter or without an artifact directory.
    pub fn validate(&self) -> Result<()> {
        if self.coverage.enabled {
            if self.coverage.instrumenter.is_none() {
                return Err(Error::configuration(
                    "Coverage is enabled but no instrumenter is configured.\n\
                     Use CoverageConfig::with_instrumenter() to set the external step.",
                ));
            }
            if self.coverage.temp_directory.as_os_str().is_empty() {
                return Err(Error::configuration(
                    "Coverage is enabled but the artifact directory is empty.",
                ));
            }
        }
        Ok(())
    }

    /// Returns `true` if coverage collection is enabled.
    #[inline]
    #[must_use]
    pub const fn coverage_enabled(&self) -> bool {
        self.coverage.enabled
    }
}

// ============================================================================
// Tests
// ============================================================================
