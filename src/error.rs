//! Error types for the WebExtension harness.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use webext_harness::{Result, Error};
//!
//! async fn example(harness: &Harness) -> Result<()> {
//!     let popup = harness.build_popup("./popup.html").await?;
//!     popup.helper().unwrap().click_element_by_id("submit").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Configuration`] |
//! | Resources | [`Error::ResourceNotFound`] |
//! | Instrumentation | [`Error::Instrumentation`] |
//! | Coverage | [`Error::CoverageWrite`] |
//! | Engine | [`Error::Engine`] |
//! | External | [`Error::Io`], [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::path::PathBuf;
use std::result::Result as StdResult;

use thiserror::Error;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging. None of these are
/// retried automatically; retries, if desired, are the caller's
/// responsibility.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned for a malformed manifest, a malformed source spec, invalid
    /// harness options, or misuse of a component's contract.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Document or script file not found at path.
    ///
    /// Returned when a manifest, page, or script path does not exist.
    #[error("Resource not found: {path}")]
    ResourceNotFound {
        /// Path where the resource was expected.
        path: PathBuf,
    },

    // ========================================================================
    // Instrumentation Errors
    // ========================================================================
    /// External instrumentation step failed.
    ///
    /// Returned when the configured instrumenter is missing or exits
    /// non-zero. Never silently degraded to raw source: skipping
    /// instrumentation would corrupt coverage results without signaling it.
    #[error("Instrumentation failed for {path}: {message}")]
    Instrumentation {
        /// Source file being instrumented.
        path: PathBuf,
        /// Description of the failure, including captured stderr if any.
        message: String,
    },

    // ========================================================================
    // Coverage Errors
    // ========================================================================
    /// Coverage artifact persistence failed.
    ///
    /// Returned when the artifact directory or file cannot be written.
    #[error("Coverage write failed at {path}: {message}")]
    CoverageWrite {
        /// Artifact or directory path that failed.
        path: PathBuf,
        /// Description of the write failure.
        message: String,
    },

    // ========================================================================
    // Engine Errors
    // ========================================================================
    /// Document engine failure.
    ///
    /// Returned when the external document engine fails to open a document,
    /// evaluate script text, or dispatch a lifecycle signal.
    #[error("Document engine error: {message}")]
    Engine {
        /// Description of the engine failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a resource not found error.
    #[inline]
    pub fn resource_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ResourceNotFound { path: path.into() }
    }

    /// Creates an instrumentation error.
    #[inline]
    pub fn instrumentation(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Instrumentation {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a coverage write error.
    #[inline]
    pub fn coverage_write(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CoverageWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a document engine error.
    #[inline]
    pub fn engine(message: impl Into<String>) -> Self {
        Self::Engine {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a configuration error.
    #[inline]
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Returns `true` if this is a missing-resource error.
    #[inline]
    #[must_use]
    pub fn is_resource_missing(&self) -> bool {
        matches!(self, Self::ResourceNotFound { .. })
    }

    /// Returns `true` if this is an instrumentation error.
    #[inline]
    #[must_use]
    pub fn is_instrumentation(&self) -> bool {
        matches!(self, Self::Instrumentation { .. })
    }

    /// Returns `true` if this is a coverage persistence error.
    #[inline]
    #[must_use]
    pub fn is_coverage_write(&self) -> bool {
        matches!(self, Self::CoverageWrite { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================
