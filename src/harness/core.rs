//! Harness coordinator and factory.
//!
//! The [`Harness`] owns the registry of live contexts for one manifest:
//! it decides which surfaces to build, builds background before dependents
//! (message wiring requires it), shares one instrumentation cache and one
//! message transport across all contexts, and exposes teardown.
//!
//! # Example
//!
//! ```ignore
//! use webext_harness::{Harness, HarnessOptions};
//!
//! # async fn example(engine: std::sync::Arc<dyn webext_harness::DocumentEngine>,
//! #                  api_fake: std::sync::Arc<dyn webext_harness::ExtensionApiFake>)
//! #     -> webext_harness::Result<()> {
//! let harness = Harness::builder()
//!     .engine(engine)
//!     .api_fake(api_fake)
//!     .options(HarnessOptions::new().with_api_fake().with_wiring())
//!     .from_manifest("./extension/manifest.json")
//!     .await?;
//!
//! let popup = harness.popup().expect("popup declared");
//! popup.helper().unwrap().click_element_by_id("submit").await?;
//!
//! harness.teardown().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, info};

use crate::api::ExtensionApiFake;
use crate::context::builder::ContextBuilder;
use crate::context::{ExecutionContext, SourceSpec};
use crate::engine::DocumentEngine;
use crate::error::{Error, Result};
use crate::instrument::InstrumentationCache;
use crate::messaging::MessageTransport;
use crate::surface::Surface;

use super::manifest::ExtensionManifest;
use super::options::HarnessOptions;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for the harness.
struct HarnessInner {
    /// Document engine seam.
    engine: Arc<dyn DocumentEngine>,

    /// Fake API factory seam.
    api_fake: Arc<dyn ExtensionApiFake>,

    /// Harness configuration.
    options: HarnessOptions,

    /// Source cache shared by every context built within this run.
    cache: Arc<InstrumentationCache>,

    /// Message transport shared by every context.
    transport: Arc<MessageTransport>,

    /// Live contexts by surface kind; at most one per kind.
    contexts: Mutex<FxHashMap<Surface, ExecutionContext>>,
}

// ============================================================================
// Harness
// ============================================================================

/// Orchestrator for one extension's execution contexts.
///
/// The harness is responsible for:
/// - Reading the manifest and deciding which surfaces to build
/// - Building background before dependents when wiring is requested
/// - Tracking live contexts and tearing them down
#[derive(Clone)]
pub struct Harness {
    /// Shared inner state.
    inner: Arc<HarnessInner>,
}

// ============================================================================
// Harness - Display
// ============================================================================

impl fmt::Debug for Harness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Harness")
            .field("context_count", &self.context_count())
            .field("wiring", &self.inner.options.wiring)
            .field("coverage", &self.inner.options.coverage_enabled())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Harness - Public API
// ============================================================================

impl Harness {
    /// Creates a configuration builder for the harness.
    #[inline]
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::new()
    }

    /// Returns the background context, if live.
    #[inline]
    #[must_use]
    pub fn background(&self) -> Option<ExecutionContext> {
        self.context(Surface::Background)
    }

    /// Returns the popup context, if live.
    #[inline]
    #[must_use]
    pub fn popup(&self) -> Option<ExecutionContext> {
        self.context(Surface::Popup)
    }

    /// Returns the sidebar context, if live.
    #[inline]
    #[must_use]
    pub fn sidebar(&self) -> Option<ExecutionContext> {
        self.context(Surface::Sidebar)
    }

    /// Returns the live context for `surface`, purging destroyed handles.
    #[must_use]
    pub fn context(&self, surface: Surface) -> Option<ExecutionContext> {
        let mut contexts = self.inner.contexts.lock();
        match contexts.get(&surface) {
            Some(context) if context.is_destroyed() => {
                contexts.remove(&surface);
                None
            }
            Some(context) => Some(context.clone()),
            None => None,
        }
    }

    /// Number of live contexts currently registered.
    #[must_use]
    pub fn context_count(&self) -> usize {
        Surface::ALL
            .into_iter()
            .filter(|s| self.context(*s).is_some())
            .count()
    }

    /// Builds the background surface from a source spec.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a live background is already
    /// registered, plus any build error from the spec.
    pub async fn build_background(&self, spec: SourceSpec) -> Result<ExecutionContext> {
        self.build_surface(Surface::Background, spec).await
    }

    /// Builds the popup surface from a document path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a live popup is already
    /// registered, plus any build error from the path.
    pub async fn build_popup(&self, path: impl Into<PathBuf>) -> Result<ExecutionContext> {
        self.build_surface(Surface::Popup, SourceSpec::Page(path.into()))
            .await
    }

    /// Builds the sidebar surface from a document path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a live sidebar is already
    /// registered, plus any build error from the path.
    pub async fn build_sidebar(&self, path: impl Into<PathBuf>) -> Result<ExecutionContext> {
        self.build_surface(Surface::Sidebar, SourceSpec::Page(path.into()))
            .await
    }

    /// Destroys one surface's context and removes it from the registry.
    ///
    /// A surface that was never built is simply absent, not an error.
    ///
    /// # Errors
    ///
    /// Returns the destroy error, if any (coverage persistence).
    pub async fn destroy(&self, surface: Surface) -> Result<()> {
        let context = self.inner.contexts.lock().remove(&surface);
        match context {
            Some(context) => context.destroy().await,
            None => Ok(()),
        }
    }

    /// Destroys every registered context, background first.
    ///
    /// Every surface is attempted even when an earlier destroy fails; the
    /// first error is returned after all attempts, so coverage loss is
    /// surfaced without leaving later contexts alive.
    pub async fn teardown(&self) -> Result<()> {
        info!(count = self.context_count(), "Tearing down harness");

        let mut first_error = None;
        for surface in Surface::ALL {
            if let Err(e) = self.destroy(surface).await {
                debug!(surface = %surface, error = %e, "Error destroying context during teardown");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Harness - Internal API
// ============================================================================

impl Harness {
    /// Creates a harness with validated options.
    fn new(
        engine: Arc<dyn DocumentEngine>,
        api_fake: Arc<dyn ExtensionApiFake>,
        options: HarnessOptions,
    ) -> Result<Self> {
        options.validate()?;

        let cache = match (&options.coverage.enabled, &options.coverage.instrumenter) {
            (true, Some(instrumenter)) => {
                Arc::new(InstrumentationCache::instrumented(instrumenter.clone()))
            }
            _ => Arc::new(InstrumentationCache::raw()),
        };

        debug!(
            coverage = options.coverage_enabled(),
            wiring = options.wiring,
            "Harness initialized"
        );

        Ok(Self {
            inner: Arc::new(HarnessInner {
                engine,
                api_fake,
                options,
                cache,
                transport: Arc::new(MessageTransport::new()),
                contexts: Mutex::new(FxHashMap::default()),
            }),
        })
    }

    /// Builds the surfaces a manifest declares, honoring surface policies.
    async fn load_manifest(&self, manifest_path: &Path) -> Result<()> {
        let manifest = ExtensionManifest::load(manifest_path).await?;
        let base = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        if self.inner.options.background.builds()
            && let Some(spec) = manifest.background_spec(base)?
        {
            self.build_surface(Surface::Background, spec).await?;
        }

        if self.inner.options.popup.builds()
            && let Some(path) = manifest.popup_path(base)
        {
            self.build_surface(Surface::Popup, SourceSpec::Page(path))
                .await?;
        }

        if self.inner.options.sidebar.builds()
            && let Some(path) = manifest.sidebar_path(base)
        {
            self.build_surface(Surface::Sidebar, SourceSpec::Page(path))
                .await?;
        }

        Ok(())
    }

    /// Builds and registers one surface.
    async fn build_surface(&self, surface: Surface, spec: SourceSpec) -> Result<ExecutionContext> {
        if self.context(surface).is_some() {
            return Err(Error::configuration(format!(
                "A {} context is already registered; destroy it before rebuilding",
                surface
            )));
        }

        let background_present = self.context(Surface::Background).is_some();
        let context = ContextBuilder {
            surface,
            engine: &self.inner.engine,
            api_fake: &self.inner.api_fake,
            cache: &self.inner.cache,
            transport: &self.inner.transport,
            options: &self.inner.options,
            background_present,
        }
        .build(spec)
        .await?;

        self.inner
            .contexts
            .lock()
            .insert(surface, context.clone());

        info!(surface = %surface, count = self.context_count(), "Context registered");
        Ok(context)
    }
}

// ============================================================================
// HarnessBuilder
// ============================================================================

/// Builder for configuring a [`Harness`] instance.
///
/// Use [`Harness::builder()`] to create a new builder.
#[derive(Default)]
pub struct HarnessBuilder {
    /// Document engine seam.
    engine: Option<Arc<dyn DocumentEngine>>,
    /// Fake API factory seam.
    api_fake: Option<Arc<dyn ExtensionApiFake>>,
    /// Harness configuration.
    options: HarnessOptions,
}

impl fmt::Debug for HarnessBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarnessBuilder")
            .field("engine", &self.engine.is_some())
            .field("api_fake", &self.api_fake.is_some())
            .field("options", &self.options)
            .finish()
    }
}

// ============================================================================
// HarnessBuilder - Implementation
// ============================================================================

impl HarnessBuilder {
    /// Creates a new harness builder with no configuration.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the document engine.
    #[inline]
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn DocumentEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the fake extension API factory.
    #[inline]
    #[must_use]
    pub fn api_fake(mut self, api_fake: Arc<dyn ExtensionApiFake>) -> Self {
        self.api_fake = Some(api_fake);
        self
    }

    /// Sets the harness options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: HarnessOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds an empty harness for manual per-surface assembly.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if engine or api-fake factory is missing
    /// - [`Error::Configuration`] if the options fail validation
    pub fn build(self) -> Result<Harness> {
        let engine = self.engine.ok_or_else(|| {
            Error::configuration(
                "A document engine is required. Use .engine() to set it.\n\
                 Example: Harness::builder().engine(engine)",
            )
        })?;
        let api_fake = self.api_fake.ok_or_else(|| {
            Error::configuration(
                "An extension API fake is required. Use .api_fake() to set it.\n\
                 Example: Harness::builder().api_fake(factory)",
            )
        })?;

        Harness::new(engine, api_fake, self.options)
    }

    /// Builds the harness and every surface the manifest declares.
    ///
    /// Build order is background, then popup, then sidebar, so dependents
    /// can wire messages to an already-ready background.
    ///
    /// # Errors
    ///
    /// Returns builder validation errors, manifest errors, and any surface
    /// build error.
    pub async fn from_manifest(self, manifest_path: impl AsRef<Path>) -> Result<Harness> {
        let harness = self.build()?;
        harness.load_manifest(manifest_path.as_ref()).await?;
        Ok(harness)
    }
}

// ============================================================================
// Tests
// ============================================================================
