use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use crate::cancel::CancellationToken;
use crate::error::RefScanError;
use crate::filter::PathFilter;
use crate::pool::{self, Step};
use crate::record::{CacheKind, CacheScope, ContentRecord};
use crate::report::{Dispatcher, WorkProgress};
use crate::traits::FileProvider;

/// In-memory contents of the corpus, split into assets and scenes.
///
/// Written only by [`build_if_empty`](ContentCache::build_if_empty), which
/// takes `&mut self`; scans borrow it shared and read without locking.
#[derive(Debug, Default)]
pub(crate) struct ContentCache {
    assets: Vec<ContentRecord>,
    scenes: Vec<ContentRecord>,
}

/// Everything a build needs besides the cache itself.
pub(crate) struct BuildContext<'a> {
    pub provider: &'a dyn FileProvider,
    pub filter: &'a PathFilter,
    pub roots: &'a [PathBuf],
    pub workers: NonZeroUsize,
    pub token: &'a CancellationToken,
    pub dispatcher: &'a Dispatcher,
}

#[derive(Debug, Default)]
pub(crate) struct BuildOutcome {
    /// Records added by this call. Zero when every collection was reused.
    pub cached: usize,
    pub faults: Vec<RefScanError>,
    /// The token stopped the build. Records and faults above are partial.
    pub canceled: bool,
}

struct BuildCursor {
    next: usize,
    records: Vec<ContentRecord>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(&self, kind: CacheKind) -> &[ContentRecord] {
        match kind {
            CacheKind::Assets => &self.assets,
            CacheKind::Scenes => &self.scenes,
        }
    }

    fn collection_mut(&mut self, kind: CacheKind) -> &mut Vec<ContentRecord> {
        match kind {
            CacheKind::Assets => &mut self.assets,
            CacheKind::Scenes => &mut self.scenes,
        }
    }

    pub fn len(&self, kind: CacheKind) -> usize {
        self.collection(kind).len()
    }

    /// `true` when every collection in `scope` is empty.
    pub fn is_empty(&self, scope: CacheScope) -> bool {
        scope.kinds().all(|k| self.collection(k).is_empty())
    }

    pub fn clear(&mut self) {
        self.assets.clear();
        self.scenes.clear();
    }

    /// Records of `scope` in scan order: assets, then scenes.
    pub fn records(&self, scope: CacheScope) -> impl Iterator<Item = &ContentRecord> + Send {
        self.scoped(scope, CacheKind::Assets)
            .iter()
            .chain(self.scoped(scope, CacheKind::Scenes).iter())
    }

    fn scoped(&self, scope: CacheScope, kind: CacheKind) -> &[ContentRecord] {
        if scope.includes(kind) {
            self.collection(kind)
        } else {
            &[]
        }
    }

    /// Fill every empty collection in `scope`. Non-empty collections are left
    /// alone and cost no I/O.
    ///
    /// On cancellation the records read so far stay in the cache and the
    /// outcome comes back with `canceled` set, carrying what was cached and
    /// every fault seen until then. A later call treats that collection as built.
    /// Cancellation during enumeration caches nothing and returns `Err(Canceled)`.
    pub(crate) fn build_if_empty(
        &mut self,
        scope: CacheScope,
        ctx: &BuildContext<'_>,
    ) -> Result<BuildOutcome, RefScanError> {
        let pending: Vec<CacheKind> = scope
            .kinds()
            .filter(|k| self.collection(*k).is_empty())
            .collect();
        if pending.is_empty() {
            log::debug!("cache reused for {scope:?}");
            return Ok(BuildOutcome::default());
        }

        // Rules see paths relative to their root; dedup is on the full path.
        let mut seen = HashSet::new();
        let mut assets = Vec::new();
        let mut scenes = Vec::new();
        for root in ctx.roots {
            for path in ctx.provider.enumerate_paths(root)? {
                let relative = path.strip_prefix(root).unwrap_or(&path);
                let kind = match ctx.filter.classify(relative) {
                    Some(kind) if pending.contains(&kind) => kind,
                    _ => continue,
                };
                if !seen.insert(path.clone()) {
                    continue;
                }
                match kind {
                    CacheKind::Assets => assets.push(path),
                    CacheKind::Scenes => scenes.push(path),
                }
            }
            ctx.token.check()?;
        }
        log::debug!(
            "building cache: {} asset paths, {} scene paths",
            assets.len(),
            scenes.len()
        );

        let progress = WorkProgress::new(assets.len() + scenes.len());
        let mut outcome = BuildOutcome::default();

        for (kind, paths) in [(CacheKind::Assets, assets), (CacheKind::Scenes, scenes)] {
            if !pending.contains(&kind) {
                continue;
            }
            let (records, report) = read_all(&paths, ctx, &progress);

            outcome.cached += records.len();
            self.collection_mut(kind).extend(records);
            outcome.faults.extend(report.faults);

            if report.canceled {
                log::debug!("cache build canceled; keeping {} partial {kind:?} records", self.len(kind));
                outcome.canceled = true;
                return Ok(outcome);
            }
        }
        progress.finish(ctx.dispatcher);

        Ok(outcome)
    }
}

/// Read `paths` with the worker pool. Each worker claims the next index and
/// appends its record under the same short-held lock.
fn read_all(
    paths: &[PathBuf],
    ctx: &BuildContext<'_>,
    progress: &WorkProgress,
) -> (Vec<ContentRecord>, pool::PoolReport) {
    let cursor = Mutex::new(BuildCursor {
        next: 0,
        records: Vec::with_capacity(paths.len()),
    });

    let report = pool::run(
        ctx.workers,
        || {
            let index = {
                let mut c = cursor.lock().unwrap_or_else(PoisonError::into_inner);
                if c.next >= paths.len() {
                    return Ok(Step::Done);
                }
                c.next += 1;
                c.next - 1
            };
            progress.claim(ctx.dispatcher);

            let path = &paths[index];
            let contents = ctx.provider.read_all_text(path)?;

            cursor
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .records
                .push(ContentRecord::new(path.clone(), contents));
            Ok(Step::Continue)
        },
        ctx.token,
    );

    let records = cursor
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .records;
    (records, report)
}
