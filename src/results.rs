use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::RefScanError;

/// One file found to reference the searched identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub path: PathBuf,
    pub display_name: String,
}

/// Which coordinator operation a report describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    BuildDatabase,
    /// A single-target query; carries the target handle as given.
    Search(String),
    /// A batch query over this many targets.
    Batch(usize),
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildDatabase => f.write_str("Build database"),
            Self::Search(target) => write!(f, "Search for `{target}`"),
            Self::Batch(n) => write!(f, "Batch search over {n} targets"),
        }
    }
}

/// How an operation ended.
#[derive(Debug)]
pub enum Outcome {
    Completed,

    /// Cancellation was requested. Counts in the report are partial.
    Canceled,

    /// An unexpected error ended the operation.
    Faulted(RefScanError),
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}

/// Per-target line of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCount {
    pub display_name: String,
    pub matches: usize,
}

/// The output of a finished coordinator operation.
#[derive(Debug)]
pub struct OperationReport {
    pub kind: OperationKind,

    pub outcome: Outcome,

    /// Total references found. For a batch, the sum over all targets; for a
    /// canceled scan, whatever had been counted when the workers stopped.
    pub matches: usize,

    /// Batch only: one entry per resolved target, in input order.
    pub per_target: Vec<TargetCount>,

    /// Recoverable per-file faults (unreadable files and the like).
    /// The affected files are missing from the cache.
    pub faults: Vec<RefScanError>,

    pub stats: OperationStats,
}

impl OperationReport {
    /// The one-line summary handed to `EventSink::on_log` when the operation ends.
    pub fn summary(&self) -> String {
        let secs = self.stats.duration.as_secs_f64();
        match &self.outcome {
            Outcome::Completed if self.kind == OperationKind::BuildDatabase => format!(
                "{} completed in {secs:.2}s: {} records cached",
                self.kind, self.stats.records_cached
            ),
            Outcome::Completed => format!(
                "{} completed in {secs:.2}s: {} references",
                self.kind, self.matches
            ),
            Outcome::Canceled if self.kind == OperationKind::BuildDatabase => format!(
                "{} canceled after {secs:.2}s: {} records cached",
                self.kind, self.stats.records_cached
            ),
            Outcome::Canceled => format!(
                "{} canceled after {secs:.2}s: {} references found before cancellation",
                self.kind, self.matches
            ),
            Outcome::Faulted(e) => format!("{} failed after {secs:.2}s: {e}", self.kind),
        }
    }
}

/// Timing and volume for a finished operation.
#[derive(Debug, Clone, Default)]
pub struct OperationStats {
    /// Wall-clock time from operation start to completion.
    pub duration: Duration,

    /// Records added to the cache by this operation (zero when it was reused).
    pub records_cached: usize,

    /// Records examined by scans in this operation. A batch scans the cache
    /// once per resolved target.
    pub records_scanned: usize,

    /// Time spent enumerating and reading files, including reuse checks.
    pub build_time: Duration,

    /// Time spent scanning cached contents.
    pub scan_time: Duration,
}

impl OperationStats {
    /// Files read into the cache per second of build time.
    /// `None` when the cache was reused and nothing was read.
    pub fn read_rate(&self) -> Option<f64> {
        per_second(self.records_cached, self.build_time)
    }

    /// Records scanned per second of scan time. `None` when nothing was scanned.
    pub fn scan_rate(&self) -> Option<f64> {
        per_second(self.records_scanned, self.scan_time)
    }
}

fn per_second(count: usize, elapsed: Duration) -> Option<f64> {
    if count == 0 || elapsed.is_zero() {
        return None;
    }
    Some(count as f64 / elapsed.as_secs_f64())
}
