use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::RefScanError;
use crate::results::MatchResult;

/// Where the cache gets its paths and file contents from.
///
/// # Thread Safety
///
/// `Send + Sync` are required — `read_all_text` is called concurrently by
/// every build worker.
///
/// # Error Handling
///
/// A failed read should return a recoverable error ([`RefScanError::Io`] and
/// friends). The build records it and carries on; the file is simply absent
/// from the cache.
pub trait FileProvider: Send + Sync {
    /// Every candidate path under `root`. Filtering into scenes/assets happens
    /// in the cache, so this may return anything it finds.
    ///
    /// The provider may use its own concurrency here; the cache only sees the list.
    fn enumerate_paths(&self, root: &Path) -> Result<Vec<PathBuf>, RefScanError>;

    /// Full text contents of `path`.
    fn read_all_text(&self, path: &Path) -> Result<String, RefScanError>;
}

/// An opaque handle to the thing whose references are searched for.
///
/// Only the [`IdentifierResolver`] interprets it: an asset path, a database
/// key, whatever the resolver understands.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target(String);

impl Target {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A target after resolution: the exact text to search for and a name to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub identifier: String,
    pub display_name: String,
}

/// Maps targets to identifiers and matched paths back to readable names.
///
/// # Thread Safety
///
/// `Send + Sync` are required — display names are resolved on the reporting
/// thread while the coordinator resolves targets on its own.
pub trait IdentifierResolver: Send + Sync {
    /// Fails with [`RefScanError::Resolution`] when the target is invalid.
    /// The engine never invents a fallback identifier.
    fn resolve_identifier(&self, target: &Target) -> Result<ResolvedTarget, RefScanError>;

    fn resolve_display_name(&self, path: &Path) -> String;
}

/// Receives progress, matches and log lines from a running operation.
///
/// Every method has an empty default so sinks implement only what they show.
///
/// Calls for one operation are made from a single reporting thread, in the
/// order events were emitted. Match order within a scan is unspecified.
pub trait EventSink: Send + Sync {
    fn on_progress(&self, _percent: f32) {}

    fn on_match(&self, _found: &MatchResult) {}

    fn on_log(&self, _message: &str) {}
}

/// Forwards everything to the `log` facade. Used when no sink is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn on_progress(&self, percent: f32) {
        log::trace!("progress {percent:.0}%");
    }

    fn on_match(&self, found: &MatchResult) {
        log::info!("referenced by {} ({})", found.display_name, found.path.display());
    }

    fn on_log(&self, message: &str) {
        log::info!("{message}");
    }
}
