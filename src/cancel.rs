//! Cooperative cancellation for builds and scans.
//!
//! A token is created per coordinator operation and cloned into every worker.
//! Workers poll it between units of work; nothing is interrupted mid-unit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A shared, clonable cancellation flag.
///
/// All clones observe the same flag. Cancelling twice is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Returns `true` only for the call that flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// `Err(Canceled)` once cancellation was requested, for use with `?`.
    #[inline]
    pub fn check(&self) -> Result<(), crate::RefScanError> {
        if self.is_cancelled() {
            Err(crate::RefScanError::Canceled)
        } else {
            Ok(())
        }
    }
}
