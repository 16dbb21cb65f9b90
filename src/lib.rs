//! # refscan
//!
//! Concurrent asset-reference index and search engine.
//!
//! refscan reads a corpus of text-like asset files into an in-memory cache
//! with a bounded worker pool, then scans that cache for files whose contents
//! contain a given identifier (typically a GUID). Builds and scans are
//! cancellable, report progress and matches as they go, and a built cache is
//! reused by every later query until it is cleared.
//!
//! refscan owns the worker pool, the cache, the scanner and the single-flight
//! [`SearchCoordinator`]. Where files come from ([`FileProvider`]), how a
//! target becomes an identifier ([`IdentifierResolver`]) and how results are
//! shown ([`EventSink`]) belong to the caller; filesystem implementations of
//! the first two ship in [`provider`].
//!
//! # Quick Start
//!
//! ```rust
//! use std::path::{Path, PathBuf};
//! use refscan::{FileProvider, IdentifierResolver, RefScanError, ResolvedTarget, Target};
//!
//! // A two-file corpus held in memory.
//! struct Corpus;
//!
//! impl FileProvider for Corpus {
//!     fn enumerate_paths(&self, _root: &Path) -> Result<Vec<PathBuf>, RefScanError> {
//!         Ok(vec!["Hero.prefab".into(), "Level.unity".into()])
//!     }
//!     fn read_all_text(&self, path: &Path) -> Result<String, RefScanError> {
//!         Ok(match path.to_str() {
//!             Some("Level.unity") => "m_SourcePrefab: {guid: 8d2e}".into(),
//!             _ => "m_Name: Hero".into(),
//!         })
//!     }
//! }
//!
//! struct Guids;
//!
//! impl IdentifierResolver for Guids {
//!     fn resolve_identifier(&self, target: &Target) -> Result<ResolvedTarget, RefScanError> {
//!         Ok(ResolvedTarget { identifier: "8d2e".into(), display_name: target.to_string() })
//!     }
//!     fn resolve_display_name(&self, path: &Path) -> String {
//!         path.display().to_string()
//!     }
//! }
//!
//! let coordinator = refscan::coordinator()
//!     .provider(Corpus)
//!     .resolver(Guids)
//!     .workers(2)
//!     .build()
//!     .unwrap();
//!
//! let report = coordinator.run_single(&Target::new("Hero.prefab")).unwrap();
//! assert!(report.outcome.is_completed());
//! assert_eq!(report.matches, 1);
//! println!("{}", report.summary());
//! ```
//!
//! # Concurrency
//!
//! Each build or scan runs a fixed number of worker threads over one shared
//! cursor (see [`pool::run`]). Matches arrive in no particular order; only the
//! final count is guaranteed complete once an operation returns. Cancellation
//! is cooperative: [`SearchCoordinator::cancel_operation`] sets a flag that
//! every worker checks between units of work.

#![forbid(unsafe_code)]

pub mod filter;
pub mod pool;
pub mod provider;

mod builder;
mod cache;
mod cancel;
mod coordinator;
mod error;
mod record;
mod report;
mod results;
mod scanner;
mod traits;

#[cfg(test)]
pub(crate) mod test_support;

// ── Public re-exports ─────────────────────────────────────────────────────────

pub use builder::{CoordinatorBuilder, DEFAULT_WORKERS};
pub use cancel::CancellationToken;
pub use coordinator::{OperationHandle, SearchCoordinator};
pub use error::RefScanError;
pub use filter::{PathFilter, Rule};
pub use provider::{DirectoryProvider, MetaGuidResolver};
pub use record::{CacheKind, CacheScope, ContentRecord};
pub use results::{MatchResult, OperationKind, OperationReport, OperationStats, Outcome, TargetCount};
pub use traits::{EventSink, FileProvider, IdentifierResolver, LogSink, ResolvedTarget, Target};

// ── Entry point ───────────────────────────────────────────────────────────────

/// Create a new [`CoordinatorBuilder`] to configure a [`SearchCoordinator`].
///
/// # Example
///
/// ```rust,no_run
/// use refscan::{DirectoryProvider, MetaGuidResolver, Target};
///
/// let coordinator = refscan::coordinator()
///     .provider(DirectoryProvider::new())
///     .resolver(MetaGuidResolver::new("my-game"))
///     .root("my-game/Assets")
///     .build()
///     .unwrap();
///
/// let report = coordinator
///     .run_single(&Target::new("Assets/Prefabs/Hero.prefab"))
///     .unwrap();
/// println!("{}", report.summary());
/// ```
pub fn coordinator() -> CoordinatorBuilder {
    CoordinatorBuilder::default()
}
