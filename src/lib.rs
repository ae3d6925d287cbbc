//! WebExtension harness - deterministic extension surfaces for tests.
//!
//! This library builds isolated, script-executing document environments
//! that emulate the surfaces of a browser extension (background, popup,
//! sidebar), synchronizes document-lifecycle events deterministically
//! across asynchronous script evaluation, optionally instruments and
//! caches source for coverage collection, and simulates the cross-surface
//! message bus extension code uses to communicate.
//!
//! # Architecture
//!
//! The harness orchestrates three external collaborators behind seams:
//!
//! - **Document engine** ([`DocumentEngine`] / [`DocumentHost`]): parses
//!   documents and evaluates script text against a window-like environment
//! - **Extension API fake** ([`ExtensionApiFake`] / [`ExtensionApi`]):
//!   per-context recordable `browser.*` stubs
//! - **Instrumenter** ([`Instrumenter`]): external source-to-source
//!   coverage transformation
//!
//! Key design principles:
//!
//! - One [`Harness`] owns one manifest's contexts, one source cache, and
//!   one message transport; nothing is process-global
//! - Background builds fully (including readiness) before dependents, so
//!   message wiring always finds a live target
//! - Readiness is an explicit state machine with a single scheduler-tick
//!   drain, not scattered readyState polling
//! - Message delivery is synchronous and first-reply-wins, a deliberate
//!   deterministic simplification of the real protocol
//!
//! # Quick Start
//!
//! ```ignore
//! use webext_harness::{Harness, HarnessOptions, Result};
//!
//! # async fn example(engine: std::sync::Arc<dyn webext_harness::DocumentEngine>,
//! #                  api_fake: std::sync::Arc<dyn webext_harness::ExtensionApiFake>)
//! #     -> Result<()> {
//! // Build every surface the manifest declares, with message wiring.
//! let harness = Harness::builder()
//!     .engine(engine)
//!     .api_fake(api_fake)
//!     .options(HarnessOptions::new().with_api_fake().with_wiring())
//!     .from_manifest("./extension/manifest.json")
//!     .await?;
//!
//! // Drive the popup; the click helper drains one scheduler tick.
//! let popup = harness.popup().expect("popup declared");
//! popup.helper().unwrap().click_element_by_id("submit").await?;
//!
//! // Teardown persists coverage and releases every context.
//! harness.teardown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`harness`] | Orchestrator: [`Harness`], options, manifest |
//! | [`context`] | [`ExecutionContext`], readiness, interaction helper |
//! | [`engine`] | Document engine seam (external) |
//! | [`api`] | Extension API fake seam (external) |
//! | [`messaging`] | Cross-surface [`MessageTransport`] |
//! | [`instrument`] | Source [`InstrumentationCache`] |
//! | [`coverage`] | [`CoverageWriter`] artifact persistence |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`testing`] | In-process simulation doubles |

// ============================================================================
// Modules
// ============================================================================

/// Extension API fake seam.
///
/// Traits the external stub factory implements, plus the message types the
/// bus is built from.
pub mod api;

/// Execution contexts.
///
/// One live surface: document host, fake API, interaction helper.
pub mod context;

/// Coverage artifact persistence.
pub mod coverage;

/// Document engine seam.
///
/// Traits the external parse/evaluate engine implements.
pub mod engine;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Harness orchestration.
///
/// Use [`Harness::builder()`] to create a configured harness.
pub mod harness;

/// Source loading and instrumentation cache.
pub mod instrument;

/// Cross-surface message transport.
pub mod messaging;

/// Extension surface kinds.
pub mod surface;

/// In-process simulation doubles for the engine and API seams.
pub mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// API seam types
pub use api::{ExtensionApi, ExtensionApiFake, ListenerReply, Message, MessageListener};

// Context types
pub use context::{ExecutionContext, InteractionHelper, LifecycleSynchronizer, SourceSpec, SyncPhase};

// Coverage types
pub use coverage::CoverageWriter;

// Engine seam types
pub use engine::{DocumentEngine, DocumentHost, DocumentSource, LifecycleSignal, ReadyState};

// Error types
pub use error::{Error, Result};

// Harness types
pub use harness::{
    CoverageConfig, ExtensionManifest, Harness, HarnessBuilder, HarnessOptions, ReadyHook,
    SurfacePolicy,
};

// Instrumentation types
pub use instrument::{InstrumentationCache, Instrumenter};

// Messaging types
pub use messaging::MessageTransport;

// Surface types
pub use surface::Surface;
