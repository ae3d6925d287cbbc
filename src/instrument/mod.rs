//! Source loading and coverage instrumentation cache.
//!
//! Every script a context loads goes through one [`InstrumentationCache`]
//! owned by its harness. In raw mode the cache memoizes file contents; in
//! instrumented mode it memoizes the output of an external
//! [`Instrumenter`] subprocess. Either way, a given path is computed at
//! most once per cache lifetime: repeat loads of the same script must be
//! free and must observe identical text within one run.
//!
//! The cache key is the file *path*, not its content. A fixture edited
//! between two builds within the same run is served stale; scope the cache
//! (and therefore the harness) to one run of the suite.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{Error, Result};

// ============================================================================
// Instrumenter
// ============================================================================

/// The external source-to-source instrumentation step.
///
/// Invoked as `<program> <args...> <source-path>`; the instrumented source
/// is expected on stdout and is piped to a scratch file on disk rather than
/// buffered, so large files don't hit subprocess output limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumenter {
    /// Program to execute.
    program: PathBuf,
    /// Arguments placed before the source path.
    args: Vec<String>,
}

impl Instrumenter {
    /// Creates an instrumenter invoking `program`.
    #[inline]
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds an argument placed before the source path.
    #[inline]
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Adds multiple arguments placed before the source path.
    #[inline]
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Returns the program path.
    #[inline]
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Builds the command line for one source file.
    fn command(&self, source: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(source);
        cmd
    }
}

// ============================================================================
// Types
// ============================================================================

/// How the cache produces source text.
enum CacheMode {
    /// Serve raw file contents.
    Raw,
    /// Pipe sources through the external instrumentation step.
    Instrumented(Instrumenter),
}

/// One memoized entry; the cell serializes the first computation so
/// concurrent callers for a still-pending path await the in-flight result
/// instead of duplicating work.
type CacheSlot = Arc<OnceCell<Arc<str>>>;

// ============================================================================
// InstrumentationCache
// ============================================================================

/// Memoized source loader shared by all contexts of one harness.
pub struct InstrumentationCache {
    /// Production mode, fixed at construction.
    mode: CacheMode,
    /// Computed (or in-flight) entries by source path.
    entries: Mutex<FxHashMap<PathBuf, CacheSlot>>,
}

// ============================================================================
// InstrumentationCache - Display
// ============================================================================

impl fmt::Debug for InstrumentationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationCache")
            .field("instrumented", &matches!(self.mode, CacheMode::Instrumented(_)))
            .field("entry_count", &self.entry_count())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// InstrumentationCache - Constructors
// ============================================================================

impl InstrumentationCache {
    /// Creates a cache serving raw file contents.
    #[inline]
    #[must_use]
    pub fn raw() -> Self {
        Self {
            mode: CacheMode::Raw,
            entries: Mutex::new(FxHashMap::default()),
        }
    }

    /// Creates a cache piping sources through `instrumenter`.
    #[inline]
    #[must_use]
    pub fn instrumented(instrumenter: Instrumenter) -> Self {
        Self {
            mode: CacheMode::Instrumented(instrumenter),
            entries: Mutex::new(FxHashMap::default()),
        }
    }
}

// ============================================================================
// InstrumentationCache - Public API
// ============================================================================

impl InstrumentationCache {
    /// Returns the (possibly instrumented) source text for `path`.
    ///
    /// The first call for a path computes and caches; every later call, and
    /// every concurrent call racing the first, observes that same text.
    ///
    /// # Errors
    ///
    /// - [`Error::ResourceNotFound`] if the source file does not exist
    /// - [`Error::Instrumentation`] if the external step is missing or
    ///   exits non-zero
    pub async fn instrument(&self, path: impl AsRef<Path>) -> Result<Arc<str>> {
        let path = path.as_ref();
        let slot: CacheSlot = {
            let mut entries = self.entries.lock();
            Arc::clone(entries.entry(path.to_path_buf()).or_default())
        };

        let text = slot.get_or_try_init(|| self.load(path)).await?;
        Ok(Arc::clone(text))
    }

    /// Number of paths with a computed or in-flight entry.
    #[inline]
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

// ============================================================================
// InstrumentationCache - Internal
// ============================================================================

impl InstrumentationCache {
    /// Computes the cache entry for one path.
    async fn load(&self, path: &Path) -> Result<Arc<str>> {
        match &self.mode {
            CacheMode::Raw => {
                let source = read_source(path).await?;
                debug!(path = %path.display(), bytes = source.len(), "Cached raw source");
                Ok(Arc::from(source))
            }
            CacheMode::Instrumented(instrumenter) => {
                let text = run_instrumenter(instrumenter, path).await?;
                debug!(path = %path.display(), bytes = text.len(), "Cached instrumented source");
                Ok(Arc::from(text))
            }
        }
    }
}

// ============================================================================
// Private Helpers
// ============================================================================

/// Reads a source file, mapping a missing file to [`Error::ResourceNotFound`].
async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            Error::resource_not_found(path)
        } else {
            Error::Io(e)
        }
    })
}

/// Runs the external instrumentation step for one source file.
///
/// Stdout is redirected to a scratch file and re-read after the process
/// exits; stderr is captured for the error message.
async fn run_instrumenter(instrumenter: &Instrumenter, path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::resource_not_found(path));
    }

    let scratch = tempfile::NamedTempFile::with_prefix("instrument-")?;
    let stdout = scratch.reopen()?;

    let mut cmd = instrumenter.command(path);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::piped());

    let child = cmd.spawn().map_err(|e| {
        Error::instrumentation(
            path,
            format!(
                "failed to launch {}: {}",
                instrumenter.program().display(),
                e
            ),
        )
    })?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| Error::instrumentation(path, format!("instrumenter did not exit: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::instrumentation(
            path,
            format!("{}: {}", output.status, stderr.trim()),
        ));
    }

    let text = tokio::fs::read_to_string(scratch.path()).await?;
    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    /// Shell-based instrumenter that appends one line to `marker` per run
    /// and prefixes the source on stdout.
    fn counting_instrumenter(marker: &Path) -> Instrumenter {
        let script = format!(
            "echo run >> \"{}\"; sleep 0.1; printf 'instrumented:'; cat \"$1\"",
            marker.display()
        );
        Instrumenter::new("sh").with_args(["-c", script.as_str(), "sh"])
    }

    #[tokio::test]
    async fn test_raw_returns_file_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "const a = 1;").expect("write fixture");

        let cache = InstrumentationCache::raw();
        let text = cache.instrument(&script).await.expect("instrument");
        assert_eq!(&*text, "const a = 1;");
        assert_eq!(cache.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_raw_missing_file() {
        let cache = InstrumentationCache::raw();
        let err = cache
            .instrument("/nonexistent/script.js")
            .await
            .unwrap_err();
        assert!(err.is_resource_missing());
    }

    #[tokio::test]
    async fn test_repeat_load_is_memoized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "original").expect("write fixture");

        let cache = InstrumentationCache::raw();
        let first = cache.instrument(&script).await.expect("first load");

        // The path key means a hot-edited fixture is served stale.
        fs::write(&script, "edited").expect("rewrite fixture");
        let second = cache.instrument(&script).await.expect("second load");

        assert_eq!(first, second);
        assert_eq!(&*second, "original");
    }

    #[tokio::test]
    async fn test_distinct_paths_cached_separately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let a = dir.path().join("a.js");
        let b = dir.path().join("b.js");
        fs::write(&a, "aaa").expect("write a");
        fs::write(&b, "bbb").expect("write b");

        let cache = InstrumentationCache::raw();
        assert_eq!(&*cache.instrument(&a).await.expect("a"), "aaa");
        assert_eq!(&*cache.instrument(&b).await.expect("b"), "bbb");
        assert_eq!(cache.entry_count(), 2);
    }

    #[tokio::test]
    async fn test_instrumented_output_cached() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        let marker = dir.path().join("marker");
        fs::write(&script, "const x = 1;").expect("write fixture");

        let cache = InstrumentationCache::instrumented(counting_instrumenter(&marker));
        let text = cache.instrument(&script).await.expect("instrument");
        assert_eq!(&*text, "instrumented:const x = 1;");
    }

    #[tokio::test]
    async fn test_concurrent_calls_run_step_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        let marker = dir.path().join("marker");
        fs::write(&script, "const x = 1;").expect("write fixture");

        let cache = Arc::new(InstrumentationCache::instrumented(counting_instrumenter(
            &marker,
        )));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let script = script.clone();
                tokio::spawn(async move { cache.instrument(&script).await })
            })
            .collect();

        for task in tasks {
            let text = task.await.expect("join").expect("instrument");
            assert_eq!(&*text, "instrumented:const x = 1;");
        }

        let runs = fs::read_to_string(&marker).expect("read marker");
        assert_eq!(runs.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_instrumenter_failure_propagates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "const x = 1;").expect("write fixture");

        let failing = Instrumenter::new("sh").with_args(["-c", "echo boom >&2; exit 3", "sh"]);
        let cache = InstrumentationCache::instrumented(failing);

        let err = cache.instrument(&script).await.unwrap_err();
        assert!(err.is_instrumentation());
        assert!(err.to_string().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_instrumenter_tool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let script = dir.path().join("bg.js");
        fs::write(&script, "const x = 1;").expect("write fixture");

        let cache =
            InstrumentationCache::instrumented(Instrumenter::new("/nonexistent/instrumenter"));
        let err = cache.instrument(&script).await.unwrap_err();
        assert!(err.is_instrumentation());
    }

    #[tokio::test]
    async fn test_instrumented_missing_source() {
        let cache = InstrumentationCache::instrumented(Instrumenter::new("sh"));
        let err = cache.instrument("/nonexistent/script.js").await.unwrap_err();
        assert!(err.is_resource_missing());
    }
}
