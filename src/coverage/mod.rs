//! Coverage artifact persistence.
//!
//! When a context is destroyed, its accumulated coverage object is written
//! to one uniquely named artifact under the configured directory. The
//! object is produced by the external instrumentation tooling's runtime;
//! the harness writes it verbatim.

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;

use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::DocumentHost;
use crate::error::{Error, Result};
use crate::harness::CoverageConfig;
use crate::surface::Surface;

// ============================================================================
// CoverageWriter
// ============================================================================

/// Persists one context's coverage object on teardown.
#[derive(Debug, Clone)]
pub struct CoverageWriter {
    /// Coverage settings shared with the owning harness.
    config: CoverageConfig,
}

// ============================================================================
// CoverageWriter - Implementation
// ============================================================================

impl CoverageWriter {
    /// Creates a writer for the given coverage configuration.
    #[inline]
    #[must_use]
    pub fn new(config: CoverageConfig) -> Self {
        Self { config }
    }

    /// Writes the host's coverage object to a fresh artifact file.
    ///
    /// No-op returning `Ok(None)` when coverage is disabled or the
    /// environment accumulated no coverage object. The artifact name is
    /// derived from a v4 UUID, so concurrent destroys within one run never
    /// collide.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoverageWrite`] if the directory or file cannot be
    /// written. Persistence failures are surfaced, never swallowed: silent
    /// coverage loss would invalidate the reporting run.
    pub async fn persist(
        &self,
        surface: Surface,
        host: &dyn DocumentHost,
    ) -> Result<Option<PathBuf>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let Some(coverage) = host.coverage() else {
            debug!(surface = %surface, "No coverage object accumulated, skipping artifact");
            return Ok(None);
        };

        let dir = self.config.temp_directory();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::coverage_write(dir, e.to_string()))?;

        let path = dir.join(format!("coverage-{}.json", Uuid::new_v4()));
        let body = serde_json::to_vec(&coverage)?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::coverage_write(&path, e.to_string()))?;

        info!(surface = %surface, path = %path.display(), "Coverage artifact written");
        Ok(Some(path))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::fs;
    use std::sync::Arc;

    use serde_json::json;

    use crate::testing::SimEngine;

    async fn host_with_coverage(value: serde_json::Value) -> Arc<crate::testing::SimHost> {
        let engine = SimEngine::new();
        let host = engine.open_blank().await.expect("open blank host");
        host.set_coverage(value);
        host
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let host = host_with_coverage(json!({"f": 1})).await;
        let writer = CoverageWriter::new(CoverageConfig::disabled());

        let written = writer
            .persist(Surface::Background, host.as_ref())
            .await
            .expect("persist");
        assert!(written.is_none());
    }

    #[tokio::test]
    async fn test_absent_coverage_object_skips_artifact() {
        let engine = SimEngine::new();
        let host = engine.open_blank().await.expect("open blank host");
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = CoverageWriter::new(CoverageConfig::enabled(dir.path()));

        let written = writer
            .persist(Surface::Popup, host.as_ref())
            .await
            .expect("persist");
        assert!(written.is_none());
    }

    #[tokio::test]
    async fn test_persist_writes_object_verbatim() {
        let host = host_with_coverage(json!({"bg.js": {"s": {"0": 2}}})).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = CoverageWriter::new(CoverageConfig::enabled(dir.path().join("nested")));

        let path = writer
            .persist(Surface::Background, host.as_ref())
            .await
            .expect("persist")
            .expect("artifact path");

        let body = fs::read_to_string(&path).expect("read artifact");
        let parsed: serde_json::Value = serde_json::from_str(&body).expect("parse artifact");
        assert_eq!(parsed, json!({"bg.js": {"s": {"0": 2}}}));
    }

    #[tokio::test]
    async fn test_unwritable_directory_is_surfaced() {
        let host = host_with_coverage(json!({})).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, "not a directory").expect("write blocker");

        let writer = CoverageWriter::new(CoverageConfig::enabled(&blocked));
        let err = writer
            .persist(Surface::Background, host.as_ref())
            .await
            .unwrap_err();
        assert!(err.is_coverage_write());
    }

    #[tokio::test]
    async fn test_concurrent_destroys_produce_distinct_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let writer = Arc::new(CoverageWriter::new(CoverageConfig::enabled(dir.path())));

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let writer = Arc::clone(&writer);
                tokio::spawn(async move {
                    let host = host_with_coverage(json!({"context": i})).await;
                    writer
                        .persist(Surface::Popup, host.as_ref())
                        .await
                        .expect("persist")
                        .expect("artifact path")
                })
            })
            .collect();

        let mut paths = HashSet::new();
        for task in tasks {
            paths.insert(task.await.expect("join"));
        }

        assert_eq!(paths.len(), 100);
        for path in &paths {
            let body = fs::read_to_string(path).expect("read artifact");
            let parsed: serde_json::Value = serde_json::from_str(&body).expect("parse artifact");
            assert!(parsed.get("context").is_some());
        }
    }
}
