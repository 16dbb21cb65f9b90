use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use crate::cancel::CancellationToken;
use crate::error::RefScanError;

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

/// What a unit of work tells its worker after one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One unit was processed; call again.
    Continue,

    /// No input left. The worker exits.
    Done,
}

// ---------------------------------------------------------------------------
// PoolReport
// ---------------------------------------------------------------------------

/// What happened across all workers of one [`run`].
#[derive(Debug, Default)]
pub struct PoolReport {
    /// Every fault raised by a unit of work or a panicking worker, aggregated.
    pub faults: Vec<RefScanError>,

    /// `true` when the token stopped the pool before the input ran out.
    pub canceled: bool,
}

impl PoolReport {
    /// First fault that ended a worker, if any.
    pub fn fatal(&self) -> Option<&RefScanError> {
        self.faults.iter().find(|f| !f.is_recoverable())
    }
}

// ---------------------------------------------------------------------------
// run()
// ---------------------------------------------------------------------------

/// Run `workers` threads, each calling `unit` until it returns [`Step::Done`]
/// or `token` is cancelled.
///
/// `unit` is shared by every worker and must coordinate its own state (cursor,
/// destination). The token is polled before each call, so a cancelled pool
/// winds down within one unit of work per worker.
///
/// A recoverable `Err` from `unit` is recorded and the worker keeps going; any
/// other `Err` or a panic ends only that worker. Returns after all workers
/// have joined.
pub fn run<F>(workers: NonZeroUsize, unit: F, token: &CancellationToken) -> PoolReport
where
    F: Fn() -> Result<Step, RefScanError> + Sync,
{
    let faults = Mutex::new(Vec::<RefScanError>::new());
    let exhausted = AtomicBool::new(false);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers.get());

        for id in 0..workers.get() {
            let spawned = thread::Builder::new()
                .name(format!("refscan-worker-{id}"))
                .spawn_scoped(scope, || worker_loop(&unit, token, &faults, &exhausted));

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    log::error!("could not spawn worker {id}: {e}");
                    push_fault(&faults, RefScanError::ThreadPool(e.to_string()));
                }
            }
        }

        for handle in handles {
            if let Err(payload) = handle.join() {
                let message = panic_message(payload.as_ref());
                log::error!("worker panicked: {message}");
                push_fault(&faults, RefScanError::WorkerPanic(message));
            }
        }
    });

    let exhausted = exhausted.load(Ordering::SeqCst);
    PoolReport {
        faults: faults.into_inner().unwrap_or_else(PoisonError::into_inner),
        canceled: !exhausted && token.is_cancelled(),
    }
}

fn worker_loop<F>(
    unit: &F,
    token: &CancellationToken,
    faults: &Mutex<Vec<RefScanError>>,
    exhausted: &AtomicBool,
) where
    F: Fn() -> Result<Step, RefScanError>,
{
    loop {
        if token.is_cancelled() {
            return;
        }
        match unit() {
            Ok(Step::Continue) => {}
            Ok(Step::Done) => {
                exhausted.store(true, Ordering::SeqCst);
                return;
            }
            Err(e) if e.is_recoverable() => {
                log::warn!("skipped: {e}");
                push_fault(faults, e);
            }
            Err(e) => {
                log::error!("worker stopped: {e}");
                push_fault(faults, e);
                return;
            }
        }
    }
}

fn push_fault(faults: &Mutex<Vec<RefScanError>>, fault: RefScanError) {
    faults
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(fault);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn workers(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// A unit that claims indices 0..total from a shared cursor.
    fn counting_unit(cursor: &AtomicUsize, total: usize) -> Result<Step, RefScanError> {
        if cursor.fetch_add(1, Ordering::SeqCst) >= total {
            Ok(Step::Done)
        } else {
            Ok(Step::Continue)
        }
    }

    #[test]
    fn runs_until_input_is_exhausted() {
        for n in [1, 2, 4, 8] {
            let cursor = AtomicUsize::new(0);
            let done = AtomicUsize::new(0);
            let report = run(
                workers(n),
                || {
                    let step = counting_unit(&cursor, 100)?;
                    if step == Step::Continue {
                        done.fetch_add(1, Ordering::SeqCst);
                    }
                    Ok(step)
                },
                &CancellationToken::new(),
            );

            assert_eq!(done.load(Ordering::SeqCst), 100, "workers = {n}");
            assert!(report.faults.is_empty());
            assert!(!report.canceled);
        }
    }

    #[test]
    fn recoverable_faults_are_aggregated_and_work_continues() {
        let cursor = AtomicUsize::new(0);
        let report = run(
            workers(3),
            || {
                let i = cursor.fetch_add(1, Ordering::SeqCst);
                if i >= 30 {
                    return Ok(Step::Done);
                }
                if i % 10 == 0 {
                    return Err(RefScanError::io(
                        format!("file-{i}"),
                        std::io::Error::other("locked"),
                    ));
                }
                Ok(Step::Continue)
            },
            &CancellationToken::new(),
        );

        assert_eq!(report.faults.len(), 3);
        assert!(report.fatal().is_none());
        assert!(cursor.load(Ordering::SeqCst) >= 30);
    }

    #[test]
    fn panicking_worker_is_reported_without_stopping_others() {
        let cursor = AtomicUsize::new(0);
        let panicked = AtomicBool::new(false);
        let report = run(
            workers(4),
            || {
                if !panicked.swap(true, Ordering::SeqCst) {
                    panic!("first unit explodes");
                }
                counting_unit(&cursor, 50)
            },
            &CancellationToken::new(),
        );

        assert_eq!(report.faults.len(), 1);
        assert!(matches!(report.fatal(), Some(RefScanError::WorkerPanic(m)) if m.contains("explodes")));
        assert!(cursor.load(Ordering::SeqCst) >= 50);
        assert!(!report.canceled);
    }

    #[test]
    fn cancelled_token_stops_workers() {
        let token = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let report = run(
            workers(4),
            || {
                if calls.fetch_add(1, Ordering::SeqCst) == 10 {
                    token.cancel();
                }
                Ok(Step::Continue)
            },
            &token,
        );

        assert!(report.canceled);
        assert!(calls.load(Ordering::SeqCst) < 10_000, "workers kept going after cancel");
    }

    #[test]
    fn pre_cancelled_token_runs_nothing() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = AtomicUsize::new(0);
        let report = run(
            workers(2),
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Step::Done)
            },
            &token,
        );

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(report.canceled);
    }
}
