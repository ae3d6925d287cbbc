//! Harness orchestration module.
//!
//! This module provides the main entry point for assembling extension
//! surfaces from a manifest.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Harness`] | Context registry and orchestrator |
//! | [`HarnessBuilder`] | Fluent configuration builder |
//! | [`HarnessOptions`] | Typed configuration record |
//! | [`SurfacePolicy`] | Per-surface build policy |
//! | [`CoverageConfig`] | Coverage collection settings |
//! | [`ExtensionManifest`] | Manifest surface declarations |
//!
//! # Example
//!
//! ```ignore
//! use webext_harness::{Harness, HarnessOptions, Result};
//!
//! # async fn example(engine: std::sync::Arc<dyn webext_harness::DocumentEngine>,
//! #                  api_fake: std::sync::Arc<dyn webext_harness::ExtensionApiFake>)
//! #     -> Result<()> {
//! let harness = Harness::builder()
//!     .engine(engine)
//!     .api_fake(api_fake)
//!     .options(HarnessOptions::new().with_api_fake())
//!     .from_manifest("./extension/manifest.json")
//!     .await?;
//!
//! let background = harness.background().expect("background declared");
//! harness.teardown().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Core orchestrator implementation.
pub mod core;

/// Extension manifest input.
pub mod manifest;

/// Typed harness configuration.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::{Harness, HarnessBuilder};
pub use manifest::{BackgroundDecl, BrowserActionDecl, ExtensionManifest, SidebarActionDecl};
pub use options::{CoverageConfig, HarnessOptions, ReadyHook, SurfacePolicy};
