use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::builder::validate_workers;
use crate::cache::{BuildContext, ContentCache};
use crate::cancel::CancellationToken;
use crate::error::RefScanError;
use crate::filter::PathFilter;
use crate::record::{CacheKind, CacheScope};
use crate::report::{Dispatcher, ProgressCell};
use crate::results::{OperationKind, OperationReport, OperationStats, Outcome, TargetCount};
use crate::scanner;
use crate::traits::{EventSink, FileProvider, IdentifierResolver, ResolvedTarget, Target};

/// Validated configuration, produced by the builder.
pub(crate) struct Settings {
    pub roots:   Vec<PathBuf>,
    pub workers: NonZeroUsize,
    pub scope:   CacheScope,
    pub filter:  PathFilter,
}

// ---------------------------------------------------------------------------
// SearchCoordinator
// ---------------------------------------------------------------------------

/// Runs builds and reference queries against one corpus, one at a time.
///
/// Cloning is cheap and every clone drives the same cache and the same
/// single-flight slot, so one clone can cancel what another started.
///
/// While an operation is in flight, any other `build_database`, `run_*`,
/// `start_*` or `clear_cache` call fails with
/// [`RefScanError::OperationInFlight`] and leaves the running operation alone.
#[derive(Clone)]
pub struct SearchCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    settings: Settings,
    provider: Arc<dyn FileProvider>,
    resolver: Arc<dyn IdentifierResolver>,
    sink:     Arc<dyn EventSink>,
    cache:    Mutex<ContentCache>,
    active:   Mutex<Option<CancellationToken>>,
    progress: Arc<ProgressCell>,
}

impl SearchCoordinator {
    pub(crate) fn new(
        settings: Settings,
        provider: Arc<dyn FileProvider>,
        resolver: Arc<dyn IdentifierResolver>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                settings,
                provider,
                resolver,
                sink,
                cache: Mutex::new(ContentCache::new()),
                active: Mutex::new(None),
                progress: Arc::new(ProgressCell::default()),
            }),
        }
    }

    // ── Blocking operations ───────────────────────────────────────────────

    /// Fill the empty collections of `scope` using `workers` threads.
    /// Collections that already hold records are reused; clear first to rebuild.
    pub fn build_database(&self, scope: CacheScope, workers: usize) -> Result<OperationReport, RefScanError> {
        let workers = validate_workers(workers)?;
        let guard = self.inner.begin()?;
        self.inner.execute_build(guard, scope, workers)
    }

    /// Find every cached file referencing `target`, building the cache first if needed.
    pub fn run_single(&self, target: &Target) -> Result<OperationReport, RefScanError> {
        let guard = self.inner.begin()?;
        self.inner.execute_single(guard, target)
    }

    /// Query each target in order and sum the counts. `None` slots and targets
    /// that fail to resolve are skipped with a log line.
    pub fn run_batch(&self, targets: &[Option<Target>]) -> Result<OperationReport, RefScanError> {
        validate_batch(targets)?;
        let guard = self.inner.begin()?;
        self.inner.execute_batch(guard, targets)
    }

    // ── Background operations ─────────────────────────────────────────────

    /// [`build_database`](Self::build_database) on a background thread.
    pub fn start_build(&self, scope: CacheScope, workers: usize) -> Result<OperationHandle, RefScanError> {
        let workers = validate_workers(workers)?;
        let guard = self.inner.begin()?;
        OperationHandle::spawn(guard, move |inner, guard| inner.execute_build(guard, scope, workers))
    }

    /// [`run_single`](Self::run_single) on a background thread.
    pub fn start_single(&self, target: Target) -> Result<OperationHandle, RefScanError> {
        let guard = self.inner.begin()?;
        OperationHandle::spawn(guard, move |inner, guard| inner.execute_single(guard, &target))
    }

    /// [`run_batch`](Self::run_batch) on a background thread.
    pub fn start_batch(&self, targets: Vec<Option<Target>>) -> Result<OperationHandle, RefScanError> {
        validate_batch(&targets)?;
        let guard = self.inner.begin()?;
        OperationHandle::spawn(guard, move |inner, guard| inner.execute_batch(guard, &targets))
    }

    // ── Control ───────────────────────────────────────────────────────────

    /// Request cancellation of the operation in flight.
    /// Returns `false` when nothing was running or it was already canceled.
    pub fn cancel_operation(&self) -> bool {
        match self.inner.lock_active().as_ref() {
            Some(token) => token.cancel(),
            None => false,
        }
    }

    /// Drop every cached record.
    pub fn clear_cache(&self) -> Result<(), RefScanError> {
        // Holding the slot lock keeps an operation from starting mid-clear.
        let active = self.inner.lock_active();
        if active.is_some() {
            return Err(RefScanError::OperationInFlight);
        }
        self.inner.lock_cache().clear();
        log::debug!("cache cleared");
        Ok(())
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn is_busy(&self) -> bool {
        self.inner.lock_active().is_some()
    }

    /// Percent complete of the current build or scan phase, as last reported.
    /// Back to 0 once the coordinator is idle.
    pub fn progress(&self) -> f32 {
        self.inner.progress.get()
    }

    /// Records cached for `kind`. Unavailable while an operation holds the cache.
    pub fn cache_len(&self, kind: CacheKind) -> Result<usize, RefScanError> {
        match self.inner.cache.try_lock() {
            Ok(cache) => Ok(cache.len(kind)),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner().len(kind)),
            Err(TryLockError::WouldBlock) => Err(RefScanError::OperationInFlight),
        }
    }

    /// Whether every collection in `scope` is empty. Unavailable while an operation holds the cache.
    pub fn is_cache_empty(&self, scope: CacheScope) -> Result<bool, RefScanError> {
        match self.inner.cache.try_lock() {
            Ok(cache) => Ok(cache.is_empty(scope)),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner().is_empty(scope)),
            Err(TryLockError::WouldBlock) => Err(RefScanError::OperationInFlight),
        }
    }

    pub fn workers(&self) -> usize {
        self.inner.settings.workers.get()
    }

    pub fn scope(&self) -> CacheScope {
        self.inner.settings.scope
    }
}

fn validate_batch(targets: &[Option<Target>]) -> Result<(), RefScanError> {
    if targets.is_empty() {
        return Err(RefScanError::InvalidConfiguration("batch has no targets".into()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single-flight slot
// ---------------------------------------------------------------------------

/// Proof that this operation owns the slot. Dropping it returns the
/// coordinator to idle, whatever the outcome.
struct OperationGuard {
    inner:   Arc<Inner>,
    token:   CancellationToken,
    started: Instant,
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.inner.progress.reset();
        *self.inner.lock_active() = None;
    }
}

impl Inner {
    fn lock_active(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_cache(&self) -> MutexGuard<'_, ContentCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(self: &Arc<Self>) -> Result<OperationGuard, RefScanError> {
        let mut active = self.lock_active();
        if active.is_some() {
            log::debug!("rejected: an operation is already in flight");
            return Err(RefScanError::OperationInFlight);
        }
        let token = CancellationToken::new();
        *active = Some(token.clone());
        Ok(OperationGuard {
            inner: Arc::clone(self),
            token,
            started: Instant::now(),
        })
    }

    // ── Operation bodies ──────────────────────────────────────────────────

    fn execute_build(
        &self,
        guard: OperationGuard,
        scope: CacheScope,
        workers: NonZeroUsize,
    ) -> Result<OperationReport, RefScanError> {
        self.run_operation(&guard, OperationKind::BuildDatabase, |s| s.build(scope, workers))
    }

    fn execute_single(&self, guard: OperationGuard, target: &Target) -> Result<OperationReport, RefScanError> {
        let kind = OperationKind::Search(target.to_string());
        self.run_operation(&guard, kind, |s| {
            let resolved = s.resolve(target)?;
            s.dispatcher.log(format!(
                "Searching for references to {} ({})",
                resolved.display_name, resolved.identifier
            ));
            s.build(s.settings.scope, s.settings.workers)?;
            let found = s.scan(&resolved)?;
            s.tally.matches = found;
            s.dispatcher.log(format!("{}: {found} references", resolved.display_name));
            Ok(())
        })
    }

    fn execute_batch(&self, guard: OperationGuard, targets: &[Option<Target>]) -> Result<OperationReport, RefScanError> {
        self.run_operation(&guard, OperationKind::Batch(targets.len()), |s| {
            for (slot, target) in targets.iter().enumerate() {
                s.token.check()?;

                let Some(target) = target else {
                    s.dispatcher.log(format!("Skipping empty target slot {slot}"));
                    continue;
                };
                let resolved = match s.resolve(target) {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("batch target skipped: {e}");
                        s.dispatcher.log(format!("Skipping `{target}`: {e}"));
                        continue;
                    }
                };

                s.build(s.settings.scope, s.settings.workers)?;
                let found = s.scan(&resolved)?;
                s.tally.matches += found;
                s.tally.per_target.push(TargetCount {
                    display_name: resolved.display_name.clone(),
                    matches: found,
                });
                s.dispatcher.log(format!("{}: {found} references", resolved.display_name));

                if s.tally.canceled {
                    break;
                }
            }
            Ok(())
        })
    }

    /// Shared skeleton: reporting thread up, cache locked, body run, outcome
    /// classified, summary logged, reporting thread drained.
    fn run_operation<F>(&self, guard: &OperationGuard, kind: OperationKind, body: F) -> Result<OperationReport, RefScanError>
    where
        F: FnOnce(&mut Session<'_>) -> Result<(), RefScanError>,
    {
        let dispatcher = Dispatcher::spawn(
            Arc::clone(&self.sink),
            Arc::clone(&self.resolver),
            Arc::clone(&self.progress),
        )?;
        let mut cache = self.lock_cache();
        log::debug!("{kind} started");

        let mut session = Session {
            settings:   &self.settings,
            provider:   self.provider.as_ref(),
            resolver:   self.resolver.as_ref(),
            cache:      &mut cache,
            token:      &guard.token,
            dispatcher: &dispatcher,
            tally:      Tally::default(),
        };
        let result = body(&mut session);
        let tally = session.tally;

        let outcome = match result {
            Ok(()) if tally.canceled => Outcome::Canceled,
            Ok(()) => Outcome::Completed,
            Err(RefScanError::Canceled) => Outcome::Canceled,
            Err(e) => Outcome::Faulted(e),
        };

        let report = OperationReport {
            kind,
            outcome,
            matches: tally.matches,
            per_target: tally.per_target,
            faults: tally.faults,
            stats: OperationStats {
                duration:        guard.started.elapsed(),
                records_cached:  tally.cached,
                records_scanned: tally.scanned,
                build_time:      tally.build_time,
                scan_time:       tally.scan_time,
            },
        };

        let summary = report.summary();
        match report.outcome {
            Outcome::Faulted(_) => log::error!("{summary}"),
            _ => log::info!("{summary}"),
        }
        dispatcher.log(summary);

        drop(cache);
        drop(dispatcher);
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tally {
    matches:    usize,
    cached:     usize,
    scanned:    usize,
    build_time: Duration,
    scan_time:  Duration,
    canceled:   bool,
    per_target: Vec<TargetCount>,
    faults:     Vec<RefScanError>,
}

/// Borrowed view of one in-flight operation.
struct Session<'a> {
    settings:   &'a Settings,
    provider:   &'a dyn FileProvider,
    resolver:   &'a dyn IdentifierResolver,
    cache:      &'a mut ContentCache,
    token:      &'a CancellationToken,
    dispatcher: &'a Dispatcher,
    tally:      Tally,
}

impl Session<'_> {
    fn resolve(&self, target: &Target) -> Result<ResolvedTarget, RefScanError> {
        let resolved = self.resolver.resolve_identifier(target)?;
        if resolved.identifier.is_empty() {
            return Err(RefScanError::Resolution {
                target: target.to_string(),
                reason: "resolved to an empty identifier".into(),
            });
        }
        Ok(resolved)
    }

    fn build(&mut self, scope: CacheScope, workers: NonZeroUsize) -> Result<(), RefScanError> {
        self.dispatcher.progress(0.0);
        let ctx = BuildContext {
            provider:   self.provider,
            filter:     &self.settings.filter,
            roots:      &self.settings.roots,
            workers,
            token:      self.token,
            dispatcher: self.dispatcher,
        };
        let started = Instant::now();
        let outcome = self.cache.build_if_empty(scope, &ctx);
        self.tally.build_time += started.elapsed();
        let outcome = outcome?;

        // A canceled build still hands back what it cached and what it skipped.
        self.tally.cached += outcome.cached;
        self.absorb(outcome.faults)?;
        if outcome.canceled {
            return Err(RefScanError::Canceled);
        }
        Ok(())
    }

    /// Scan the configured scope. A canceled scan is not an error here: its
    /// partial count is returned and the tally is marked canceled.
    fn scan(&mut self, resolved: &ResolvedTarget) -> Result<usize, RefScanError> {
        self.dispatcher.progress(0.0);
        let started = Instant::now();
        let outcome = scanner::scan(
            self.cache.records(self.settings.scope),
            &resolved.identifier,
            self.settings.workers,
            self.token,
            self.dispatcher,
        );
        self.tally.scan_time += started.elapsed();
        self.tally.scanned += outcome.scanned;
        self.tally.canceled |= outcome.canceled;
        self.absorb(outcome.faults)?;
        Ok(outcome.matches)
    }

    /// Keep recoverable faults for the report; return the first fatal one.
    fn absorb(&mut self, faults: Vec<RefScanError>) -> Result<(), RefScanError> {
        let (fatal, recoverable): (Vec<_>, Vec<_>) =
            faults.into_iter().partition(|f| !f.is_recoverable());
        for fault in &recoverable {
            self.dispatcher.log(format!("Skipped: {fault}"));
        }
        self.tally.faults.extend(recoverable);
        match fatal.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// OperationHandle
// ---------------------------------------------------------------------------

/// A coordinator operation running on its own thread.
pub struct OperationHandle {
    token:  CancellationToken,
    handle: JoinHandle<Result<OperationReport, RefScanError>>,
}

impl OperationHandle {
    fn spawn<F>(guard: OperationGuard, body: F) -> Result<Self, RefScanError>
    where
        F: FnOnce(&Inner, OperationGuard) -> Result<OperationReport, RefScanError> + Send + 'static,
    {
        let token = guard.token.clone();
        let handle = thread::Builder::new()
            .name("refscan-operation".into())
            .spawn(move || {
                let inner = Arc::clone(&guard.inner);
                body(&*inner, guard)
            })
            .map_err(|e| RefScanError::ThreadPool(e.to_string()))?;
        Ok(Self { token, handle })
    }

    /// Request cancellation of this operation.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the operation and return its report.
    pub fn join(self) -> Result<OperationReport, RefScanError> {
        self.handle
            .join()
            .map_err(|_| RefScanError::WorkerPanic("operation thread panicked".into()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::builder::CoordinatorBuilder;
    use crate::test_support::{MapResolver, MemoryProvider, RecordingSink};

    const WAIT: Duration = Duration::from_secs(10);

    fn coordinator(provider: MemoryProvider, resolver: MapResolver, sink: &Arc<RecordingSink>) -> SearchCoordinator {
        CoordinatorBuilder::default()
            .provider(provider)
            .resolver(resolver)
            .shared_sink(sink.clone())
            .root("Assets")
            .workers(4)
            .build()
            .unwrap()
    }

    /// Two prefabs reference A, none reference B, five reference C.
    fn batch_corpus() -> MemoryProvider {
        let mut provider = MemoryProvider::default().file("Assets/Main.unity", "scene with no refs");
        for i in 0..2 {
            provider = provider.file(format!("Assets/A{i}.prefab"), "guid: guid-a");
        }
        for i in 0..5 {
            provider = provider.file(format!("Assets/C{i}.prefab"), "guid: guid-c");
        }
        provider
    }

    fn abc_resolver() -> MapResolver {
        MapResolver::default()
            .with("a", "guid-a", "A")
            .with("b", "guid-b", "B")
            .with("c", "guid-c", "C")
    }

    #[test]
    fn single_query_counts_and_reports_matches() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        let report = c.run_single(&Target::new("c")).unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.matches, 5);
        assert_eq!(report.stats.records_cached, 8);
        assert_eq!(report.stats.records_scanned, 8);
        assert_eq!(sink.matches().len(), 5);
        assert!(sink.matches().iter().all(|m| m.display_name.starts_with('C')));
        assert_eq!(sink.progress().last(), Some(&100.0));
        assert_eq!(c.progress(), 0.0, "progress resets once the coordinator is idle");
        assert!(sink.logs().last().unwrap().contains("completed"));
        assert!(!c.is_busy());
    }

    #[test]
    fn batch_sums_counts_and_logs_targets_in_input_order() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        let targets = vec![
            Some(Target::new("a")),
            None,
            Some(Target::new("b")),
            Some(Target::new("missing")),
            Some(Target::new("c")),
        ];
        let report = c.run_batch(&targets).unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.matches, 7);
        let counts: Vec<_> = report
            .per_target
            .iter()
            .map(|t| (t.display_name.as_str(), t.matches))
            .collect();
        assert_eq!(counts, vec![("A", 2), ("B", 0), ("C", 5)]);

        let logs = sink.logs();
        let per_target: Vec<_> = logs
            .iter()
            .filter(|l| l.ends_with(" references") && !l.starts_with("Batch"))
            .cloned()
            .collect();
        assert_eq!(per_target, vec!["A: 2 references", "B: 0 references", "C: 5 references"]);
        assert!(logs.iter().any(|l| l == "Skipping empty target slot 1"));
        assert!(logs.iter().any(|l| l.starts_with("Skipping `missing`")));
        assert!(logs.last().unwrap().ends_with("7 references"));
    }

    #[test]
    fn cache_is_reused_across_queries_until_cleared() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        let first = c.run_single(&Target::new("a")).unwrap();
        let second = c.run_single(&Target::new("c")).unwrap();
        assert_eq!(first.stats.records_cached, 8);
        assert_eq!(second.stats.records_cached, 0, "second query reuses the cache");
        assert_eq!(c.cache_len(CacheKind::Assets).unwrap(), 7);
        assert_eq!(c.cache_len(CacheKind::Scenes).unwrap(), 1);

        c.clear_cache().unwrap();
        assert_eq!(c.cache_len(CacheKind::Assets).unwrap(), 0);

        let third = c.run_single(&Target::new("a")).unwrap();
        assert_eq!(third.stats.records_cached, 8);
        assert_eq!(third.matches, 2);
    }

    #[test]
    fn unresolvable_single_target_faults() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        let report = c.run_single(&Target::new("nope")).unwrap();

        assert!(matches!(report.outcome, Outcome::Faulted(RefScanError::Resolution { .. })));
        assert_eq!(report.stats.records_cached, 0, "nothing is built for an unresolvable target");
        assert!(sink.logs().last().unwrap().contains("failed"));
        assert!(!c.is_busy());
    }

    #[test]
    fn invalid_arguments_are_rejected_synchronously() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        assert!(matches!(c.run_batch(&[]), Err(RefScanError::InvalidConfiguration(_))));
        assert!(matches!(
            c.build_database(CacheScope::Both, 0),
            Err(RefScanError::InvalidWorkerCount(0))
        ));
        assert!(sink.logs().is_empty(), "no operation was started");
    }

    #[test]
    fn unreadable_file_is_logged_and_skipped() {
        let sink = Arc::new(RecordingSink::default());
        let provider = batch_corpus().failing("Assets/C0.prefab");
        let c = coordinator(provider, abc_resolver(), &sink);

        let report = c.run_single(&Target::new("c")).unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.matches, 4);
        assert_eq!(report.faults.len(), 1);
        assert!(sink.logs().iter().any(|l| l.starts_with("Skipped:")));
    }

    #[test]
    fn build_database_reports_cached_records() {
        let sink = Arc::new(RecordingSink::default());
        let c = coordinator(batch_corpus(), abc_resolver(), &sink);

        let report = c.build_database(CacheScope::Scenes, 2).unwrap();

        assert!(report.outcome.is_completed());
        assert_eq!(report.stats.records_cached, 1);
        assert_eq!(c.cache_len(CacheKind::Scenes).unwrap(), 1);
        assert_eq!(c.cache_len(CacheKind::Assets).unwrap(), 0);
        assert!(!c.is_cache_empty(CacheScope::Scenes).unwrap());
        assert!(c.is_cache_empty(CacheScope::Assets).unwrap());
        assert!(sink.logs().last().unwrap().ends_with("1 records cached"));
    }

    #[test]
    fn reentrant_calls_are_rejected_while_in_flight() {
        let sink = Arc::new(RecordingSink::default());
        let (provider, gate) = batch_corpus().gated();
        let c = coordinator(provider, abc_resolver(), &sink);

        let handle = c.start_single(Target::new("c")).unwrap();
        gate.started.recv_timeout(WAIT).unwrap();

        assert!(c.is_busy());
        assert!(matches!(c.run_single(&Target::new("a")), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.run_batch(&[Some(Target::new("a"))]), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.build_database(CacheScope::Both, 2), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.start_single(Target::new("a")), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.clear_cache(), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.cache_len(CacheKind::Assets), Err(RefScanError::OperationInFlight)));
        assert!(matches!(c.is_cache_empty(CacheScope::Both), Err(RefScanError::OperationInFlight)));

        drop(gate.release);
        let report = handle.join().unwrap();

        assert!(report.outcome.is_completed(), "rejections must not disturb the running query");
        assert_eq!(report.matches, 5);
        assert!(!c.is_busy());
        assert!(c.run_single(&Target::new("a")).is_ok());
    }

    #[test]
    fn cancel_mid_build_ends_canceled_and_keeps_partial_cache() {
        let sink = Arc::new(RecordingSink::default());
        let (provider, gate) = batch_corpus().gated();
        let c = coordinator(provider, abc_resolver(), &sink);

        let handle = c.start_single(Target::new("c")).unwrap();
        gate.started.recv_timeout(WAIT).unwrap();

        assert!(c.cancel_operation());
        assert!(!c.cancel_operation(), "second cancel is a no-op");
        drop(gate.release);
        let report = handle.join().unwrap();

        assert!(report.outcome.is_canceled());
        assert_eq!(report.matches, 0);
        assert!(sink.logs().last().unwrap().contains("canceled"));
        assert!(!c.is_busy());
        assert!(!c.cancel_operation(), "nothing to cancel when idle");

        // Only the reads in flight at cancel time made it into the cache.
        let partial = c.cache_len(CacheKind::Assets).unwrap();
        assert!(partial >= 1 && partial <= 4, "partial = {partial}");
        assert_eq!(report.stats.records_cached, partial);
        assert_eq!(c.progress(), 0.0);

        // The partial collection counts as built; scenes were never started.
        let retry = c.run_single(&Target::new("c")).unwrap();
        assert!(retry.outcome.is_completed());
        assert_eq!(c.cache_len(CacheKind::Assets).unwrap(), partial);
        assert_eq!(c.cache_len(CacheKind::Scenes).unwrap(), 1);
    }

    #[test]
    fn canceled_build_reports_faults_and_records_read_before_cancel() {
        let sink = Arc::new(RecordingSink::default());
        let (provider, gate) = batch_corpus().failing("Assets/A1.prefab").gated();
        let c = coordinator(provider, abc_resolver(), &sink);

        // One worker reads in path order: A0, then A1 (fails), then cancel.
        let handle = c.start_build(CacheScope::Both, 1).unwrap();
        assert_eq!(gate.started.recv_timeout(WAIT).unwrap(), PathBuf::from("Assets/A0.prefab"));
        gate.release.send(()).unwrap();
        assert_eq!(gate.started.recv_timeout(WAIT).unwrap(), PathBuf::from("Assets/A1.prefab"));
        assert!(c.cancel_operation());
        drop(gate.release);
        let report = handle.join().unwrap();

        assert!(report.outcome.is_canceled());
        assert_eq!(report.stats.records_cached, 1);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].path().unwrap(), &PathBuf::from("Assets/A1.prefab"));

        let logs = sink.logs();
        assert!(logs.iter().any(|l| l.starts_with("Skipped:") && l.contains("A1.prefab")));
        let summary = logs.last().unwrap();
        assert!(summary.starts_with("Build database canceled"), "{summary}");
        assert!(summary.ends_with("1 records cached"), "{summary}");
    }

    #[test]
    fn handle_cancel_stops_a_batch() {
        let sink = Arc::new(RecordingSink::default());
        let (provider, gate) = batch_corpus().gated();
        let c = coordinator(provider, abc_resolver(), &sink);

        let handle = c
            .start_batch(vec![Some(Target::new("a")), Some(Target::new("c"))])
            .unwrap();
        gate.started.recv_timeout(WAIT).unwrap();
        assert!(handle.cancel());
        drop(gate.release);
        let report = handle.join().unwrap();

        assert!(report.outcome.is_canceled());
        assert!(report.per_target.is_empty(), "cancelled during the first target's build");
    }
}
