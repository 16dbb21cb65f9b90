use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::cancel::CancellationToken;
use crate::error::RefScanError;
use crate::pool::{self, Step};
use crate::record::ContentRecord;
use crate::report::{Dispatcher, WorkProgress};

/// Result of one scan.
#[derive(Debug, Default)]
pub(crate) struct ScanOutcome {
    /// Records whose contents contain the identifier. Partial when canceled.
    pub matches: usize,
    pub scanned: usize,
    pub faults: Vec<RefScanError>,
    pub canceled: bool,
}

/// Count the records in `records` that contain `identifier`, reporting each
/// match through `dispatcher` as it is found.
///
/// Workers share one cursor over `records`. Advancing it is the only thing
/// done under the lock; the containment check and the report happen outside,
/// so workers overlap on the expensive part. Match order is unspecified.
///
/// A canceled scan still returns the count accumulated so far.
pub(crate) fn scan<'a, I>(
    records: I,
    identifier: &str,
    workers: NonZeroUsize,
    token: &CancellationToken,
    dispatcher: &Dispatcher,
) -> ScanOutcome
where
    I: Iterator<Item = &'a ContentRecord> + Send,
{
    let progress = WorkProgress::new(records.size_hint().0);
    let cursor = Mutex::new(records);
    let matches = AtomicUsize::new(0);

    let report = pool::run(
        workers,
        || {
            let next = cursor.lock().unwrap_or_else(PoisonError::into_inner).next();
            let Some(record) = next else {
                return Ok(Step::Done);
            };
            progress.claim(dispatcher);

            if record.references(identifier) {
                matches.fetch_add(1, Ordering::Relaxed);
                dispatcher.matched(record.path().to_path_buf());
            }
            Ok(Step::Continue)
        },
        token,
    );
    if !report.canceled {
        progress.finish(dispatcher);
    }

    ScanOutcome {
        matches: matches.load(Ordering::Relaxed),
        scanned: progress.claimed(),
        faults: report.faults,
        canceled: report.canceled,
    }
}
