use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::coordinator::{SearchCoordinator, Settings};
use crate::error::RefScanError;
use crate::filter::PathFilter;
use crate::record::CacheScope;
use crate::traits::{EventSink, FileProvider, IdentifierResolver, LogSink};

/// Worker count used when none is configured.
pub const DEFAULT_WORKERS: usize = 4;

// ---------------------------------------------------------------------------
// CoordinatorBuilder
// ---------------------------------------------------------------------------

/// Entry point for configuring a [`SearchCoordinator`].
///
/// Created via [`refscan::coordinator()`](crate::coordinator). Configure with
/// chained builder methods, then call [`build()`](CoordinatorBuilder::build).
///
/// # Example
///
/// ```rust,ignore
/// let coordinator = refscan::coordinator()
///     .provider(DirectoryProvider::new())
///     .resolver(MetaGuidResolver::new(project))
///     .root(project.join("Assets"))
///     .workers(8)
///     .build()?;
/// ```
pub struct CoordinatorBuilder {
    provider: Option<Arc<dyn FileProvider>>,
    resolver: Option<Arc<dyn IdentifierResolver>>,
    sink:     Option<Arc<dyn EventSink>>,
    roots:    Vec<PathBuf>,
    workers:  usize,
    scope:    CacheScope,
    filter:   PathFilter,
}

impl Default for CoordinatorBuilder {
    fn default() -> Self {
        Self {
            provider: None,
            resolver: None,
            sink:     None,
            roots:    Vec::new(),
            workers:  DEFAULT_WORKERS,
            scope:    CacheScope::Both,
            filter:   PathFilter::default(),
        }
    }
}

impl CoordinatorBuilder {
    // ── Collaborators ─────────────────────────────────────────────────────

    /// Where paths and file contents come from. Required.
    pub fn provider(mut self, p: impl FileProvider + 'static) -> Self {
        self.provider = Some(Arc::new(p));
        self
    }

    /// Maps targets to identifiers and matched paths to display names. Required.
    pub fn resolver(mut self, r: impl IdentifierResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(r));
        self
    }

    /// Receives progress, matches and log lines. Defaults to [`LogSink`].
    pub fn sink(mut self, s: impl EventSink + 'static) -> Self {
        self.sink = Some(Arc::new(s));
        self
    }

    /// Like [`sink`](Self::sink), for a sink the caller keeps a handle to.
    pub fn shared_sink(mut self, s: Arc<dyn EventSink>) -> Self {
        self.sink = Some(s);
        self
    }

    // ── Options ───────────────────────────────────────────────────────────

    /// Add a root handed to [`FileProvider::enumerate_paths`]. Defaults to `.`
    /// when none is given.
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.push(root.into());
        self
    }

    pub fn roots<I, P>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.roots.extend(roots.into_iter().map(Into::into));
        self
    }

    /// Workers per build or scan. Defaults to [`DEFAULT_WORKERS`]; `0` is
    /// rejected by [`build()`](Self::build).
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    /// Collections that queries build and scan. Defaults to both.
    pub fn scope(mut self, scope: CacheScope) -> Self {
        self.scope = scope;
        self
    }

    /// Rules partitioning paths into assets and scenes.
    pub fn filter(mut self, filter: PathFilter) -> Self {
        self.filter = filter;
        self
    }

    // ── Build ─────────────────────────────────────────────────────────────

    /// Validate the configuration and create the coordinator.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the provider or resolver is missing,
    /// `InvalidWorkerCount` when the worker count is zero.
    pub fn build(self) -> Result<SearchCoordinator, RefScanError> {
        let provider = self.provider.ok_or_else(|| {
            RefScanError::InvalidConfiguration("no file provider configured".into())
        })?;
        let resolver = self.resolver.ok_or_else(|| {
            RefScanError::InvalidConfiguration("no identifier resolver configured".into())
        })?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(LogSink));

        let roots = if self.roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.roots
        };

        let settings = Settings {
            roots,
            workers: validate_workers(self.workers)?,
            scope:   self.scope,
            filter:  self.filter,
        };

        Ok(SearchCoordinator::new(settings, provider, resolver, sink))
    }
}

/// Reject a zero worker count at the API boundary.
pub(crate) fn validate_workers(n: usize) -> Result<NonZeroUsize, RefScanError> {
    NonZeroUsize::new(n).ok_or(RefScanError::InvalidWorkerCount(n))
}
