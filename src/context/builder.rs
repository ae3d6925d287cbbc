//! Context assembly.
//!
//! The builder composes the document engine, the fake API factory, the
//! instrumentation cache, and the lifecycle synchronizer into one named
//! execution context. There is no partial success: if any step fails after
//! the document opened, the environment is released before the error
//! surfaces, and nothing is registered.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::api::ExtensionApiFake;
use crate::coverage::CoverageWriter;
use crate::engine::{DocumentEngine, DocumentHost, DocumentSource, EnvSetup};
use crate::error::{Error, Result};
use crate::harness::HarnessOptions;
use crate::instrument::InstrumentationCache;
use crate::messaging::MessageTransport;
use crate::surface::Surface;

use super::ExecutionContext;
use super::lifecycle::LifecycleSynchronizer;

// ============================================================================
// SourceSpec
// ============================================================================

/// What a surface's document is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// A document file; the engine evaluates its scripts inline as it
    /// parses.
    Page(PathBuf),
    /// An ordered list of script files injected into a blank document
    /// after it has parsed (deferred execution, which is what lets the
    /// instrumentation cache intercept the source text).
    Scripts(Vec<PathBuf>),
}

impl SourceSpec {
    /// Creates a page spec.
    #[inline]
    #[must_use]
    pub fn page(path: impl Into<PathBuf>) -> Self {
        Self::Page(path.into())
    }

    /// Creates a script-list spec.
    #[inline]
    #[must_use]
    pub fn scripts(paths: impl IntoIterator<Item = impl Into<PathBuf>>) -> Self {
        Self::Scripts(paths.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// ContextBuilder
// ============================================================================

/// Builds one execution context for the owning harness.
pub(crate) struct ContextBuilder<'a> {
    /// Surface being built.
    pub surface: Surface,
    /// Document engine seam.
    pub engine: &'a Arc<dyn DocumentEngine>,
    /// Fake API factory seam.
    pub api_fake: &'a Arc<dyn ExtensionApiFake>,
    /// Shared source cache.
    pub cache: &'a Arc<InstrumentationCache>,
    /// Shared message transport.
    pub transport: &'a Arc<MessageTransport>,
    /// Harness configuration.
    pub options: &'a HarnessOptions,
    /// Whether a live background context is registered right now.
    pub background_present: bool,
}

// ============================================================================
// ContextBuilder - Implementation
// ============================================================================

impl ContextBuilder<'_> {
    /// Builds the context.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for a malformed spec
    /// - [`Error::ResourceNotFound`] for a missing page or script
    /// - [`Error::Instrumentation`] if the instrumentation step fails
    /// - [`Error::Engine`] if the document engine fails
    pub(crate) async fn build(self, spec: SourceSpec) -> Result<ExecutionContext> {
        debug!(surface = %self.surface, ?spec, "Building context");

        // Load scripts through the cache up front; a missing script fails
        // the build before any environment exists.
        let (source, scripts) = match &spec {
            SourceSpec::Page(path) => {
                if !path.exists() {
                    return Err(Error::resource_not_found(path));
                }
                (DocumentSource::File(path.clone()), None)
            }
            SourceSpec::Scripts(paths) => {
                if paths.is_empty() {
                    return Err(Error::configuration(format!(
                        "{} source spec declares an empty script list",
                        self.surface
                    )));
                }
                let mut texts = Vec::with_capacity(paths.len());
                for path in paths {
                    texts.push(self.cache.instrument(path).await?);
                }
                (DocumentSource::blank(), Some(texts))
            }
        };

        let api = self.api_fake.create();
        self.install_wiring(&api);

        let setup = self.env_setup(&api);
        let host = self.engine.open(source, setup).await?;

        match self.finish(&host, api, scripts).await {
            Ok(context) => Ok(context),
            Err(e) => {
                // No partial success: release the environment before the
                // error surfaces.
                host.close();
                Err(e)
            }
        }
    }

    /// Installs message-bus routing on the fresh API handle.
    ///
    /// Background contexts route inbound listener registrations into the
    /// shared transport; dependent contexts get an outbound override only
    /// when a live background is already registered. Building a dependent
    /// first is not an error — wiring is simply skipped.
    fn install_wiring(&self, api: &Arc<dyn crate::api::ExtensionApi>) {
        if !self.options.wiring {
            return;
        }

        if self.surface == Surface::Background {
            api.route_inbound(Arc::clone(self.transport), Surface::Background);
        } else if self.background_present {
            let transport = Arc::clone(self.transport);
            api.route_outbound(Arc::new(move |message| {
                transport.send(Surface::Background, message)
            }));
            debug!(surface = %self.surface, "Outbound message wiring installed");
        } else {
            debug!(surface = %self.surface, "No background registered, wiring skipped");
        }
    }

    /// Builds the injection hook attaching the fake API before any script
    /// runs.
    fn env_setup(&self, api: &Arc<dyn crate::api::ExtensionApi>) -> EnvSetup {
        let api = Arc::clone(api);
        let populate = self.options.api_fake;
        Box::new(move |host| {
            host.attach_api(Arc::clone(&api))?;
            if populate {
                api.populate_stubs()?;
            }
            Ok(())
        })
    }

    /// Drives the opened document to readiness and assembles the context.
    async fn finish(
        &self,
        host: &Arc<dyn DocumentHost>,
        api: Arc<dyn crate::api::ExtensionApi>,
        scripts: Option<Vec<Arc<str>>>,
    ) -> Result<ExecutionContext> {
        let mut sync = LifecycleSynchronizer::new();

        let deferred = if let Some(texts) = scripts {
            sync.mark_parsed(host.as_ref())?;
            for text in texts {
                host.evaluate(&text).await?;
            }
            true
        } else {
            false
        };

        let context = ExecutionContext::new(
            self.surface,
            Arc::clone(host),
            api,
            Arc::clone(self.transport),
            CoverageWriter::new(self.options.coverage.clone()),
        );

        if let Some(hook) = &self.options.before_ready {
            hook(context.clone()).await?;
        }

        if deferred {
            sync.settle_deferred(host.as_ref()).await?;
        } else {
            sync.settle_inline(host.as_ref()).await?;
        }

        if let Some(hook) = &self.options.after_ready {
            hook(context.clone()).await?;
        }

        debug!(surface = %self.surface, "Context ready");
        Ok(context)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::harness::HarnessOptions;
    use crate::testing::{RecordingApiFake, SimEngine};

    struct Fixture {
        engine: Arc<SimEngine>,
        api_fake: Arc<RecordingApiFake>,
        cache: Arc<InstrumentationCache>,
        transport: Arc<MessageTransport>,
        options: HarnessOptions,
    }

    impl Fixture {
        fn new(options: HarnessOptions) -> Self {
            Self {
                engine: Arc::new(SimEngine::new()),
                api_fake: Arc::new(RecordingApiFake::new()),
                cache: Arc::new(InstrumentationCache::raw()),
                transport: Arc::new(MessageTransport::new()),
                options,
            }
        }

        async fn build(&self, surface: Surface, spec: SourceSpec) -> Result<ExecutionContext> {
            let engine: Arc<dyn DocumentEngine> = self.engine.clone();
            let api_fake: Arc<dyn ExtensionApiFake> = self.api_fake.clone();
            ContextBuilder {
                surface,
                engine: &engine,
                api_fake: &api_fake,
                cache: &self.cache,
                transport: &self.transport,
                options: &self.options,
                background_present: false,
            }
            .build(spec)
            .await
        }
    }

    #[tokio::test]
    async fn test_scripts_evaluated_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("first.js");
        let second = dir.path().join("second.js");
        fs::write(&first, "first();").expect("write first");
        fs::write(&second, "second();").expect("write second");

        let fixture = Fixture::new(HarnessOptions::new());
        let context = fixture
            .build(Surface::Background, SourceSpec::scripts([&first, &second]))
            .await
            .expect("build");

        let host = &fixture.engine.hosts()[0];
        assert_eq!(host.evaluated(), vec!["first();", "second();"]);
        assert!(!context.is_destroyed());
    }

    #[tokio::test]
    async fn test_empty_script_list_is_configuration_error() {
        let fixture = Fixture::new(HarnessOptions::new());
        let err = fixture
            .build(Surface::Background, SourceSpec::Scripts(Vec::new()))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(fixture.engine.hosts().is_empty());
    }

    #[tokio::test]
    async fn test_missing_page_is_resource_error() {
        let fixture = Fixture::new(HarnessOptions::new());
        let err = fixture
            .build(Surface::Popup, SourceSpec::page("/nonexistent/popup.html"))
            .await
            .unwrap_err();
        assert!(err.is_resource_missing());
    }

    #[tokio::test]
    async fn test_missing_script_is_resource_error() {
        let fixture = Fixture::new(HarnessOptions::new());
        let err = fixture
            .build(
                Surface::Background,
                SourceSpec::scripts(["/nonexistent/bg.js"]),
            )
            .await
            .unwrap_err();
        assert!(err.is_resource_missing());
    }

    #[tokio::test]
    async fn test_api_attached_before_scripts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "init();").expect("write script");

        let fixture = Fixture::new(HarnessOptions::new().with_api_fake());
        fixture
            .build(Surface::Background, SourceSpec::scripts([&script]))
            .await
            .expect("build");

        let host = &fixture.engine.hosts()[0];
        assert!(host.api().is_some());
        assert!(fixture.api_fake.created()[0].stubs_populated());
    }

    #[tokio::test]
    async fn test_stubs_not_populated_by_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "init();").expect("write script");

        let fixture = Fixture::new(HarnessOptions::new());
        fixture
            .build(Surface::Background, SourceSpec::scripts([&script]))
            .await
            .expect("build");

        assert!(!fixture.api_fake.created()[0].stubs_populated());
    }

    #[tokio::test]
    async fn test_failed_build_releases_host() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "init();").expect("write script");

        let options = HarnessOptions::new().with_before_ready(Arc::new(|_context| {
            Box::pin(async { Err(Error::configuration("hook rejected the build")) })
        }));
        let fixture = Fixture::new(options);

        let err = fixture
            .build(Surface::Background, SourceSpec::scripts([&script]))
            .await
            .unwrap_err();
        assert!(err.is_configuration());

        let host = &fixture.engine.hosts()[0];
        assert!(host.is_closed());
    }

    #[tokio::test]
    async fn test_ready_hooks_run_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "init();").expect("write script");

        let order = Arc::new(AtomicUsize::new(0));
        let before_seen = Arc::new(AtomicUsize::new(0));
        let after_seen = Arc::new(AtomicUsize::new(0));

        let options = HarnessOptions::new()
            .with_before_ready({
                let order = Arc::clone(&order);
                let before_seen = Arc::clone(&before_seen);
                Arc::new(move |_context| {
                    before_seen.store(order.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
                    Box::pin(async { Ok(()) })
                })
            })
            .with_after_ready({
                let order = Arc::clone(&order);
                let after_seen = Arc::clone(&after_seen);
                Arc::new(move |_context| {
                    after_seen.store(order.fetch_add(1, Ordering::SeqCst) + 1, Ordering::SeqCst);
                    Box::pin(async { Ok(()) })
                })
            });

        let fixture = Fixture::new(options);
        fixture
            .build(Surface::Background, SourceSpec::scripts([&script]))
            .await
            .expect("build");

        assert_eq!(before_seen.load(Ordering::SeqCst), 1);
        assert_eq!(after_seen.load(Ordering::SeqCst), 2);
    }
}
