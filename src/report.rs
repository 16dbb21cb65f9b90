//! The reporting path between workers and the presentation layer.
//!
//! Workers never call the [`EventSink`] directly. They push events into an
//! unbounded channel and go back to work; a per-operation dispatcher thread
//! drains the channel, resolves display names and calls the sink. A slow sink
//! therefore delays only the reporting thread, never a scan.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Sender};

use crate::error::RefScanError;
use crate::results::MatchResult;
use crate::traits::{EventSink, IdentifierResolver};

enum Event {
    Progress(f32),
    Match(PathBuf),
    Log(String),
}

// ---------------------------------------------------------------------------
// ProgressCell
// ---------------------------------------------------------------------------

/// Last reported percent, stored as `f32` bits so readers never see a torn value.
#[derive(Debug, Default)]
pub(crate) struct ProgressCell(AtomicU32);

impl ProgressCell {
    pub fn get(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Acquire))
    }

    fn set(&self, percent: f32) {
        self.0.store(percent.to_bits(), Ordering::Release);
    }

    /// Back to 0 for the next operation. Only called once the dispatcher is gone.
    pub fn reset(&self) {
        self.set(0.0);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Owns the reporting thread for one operation.
///
/// Dropping it closes the channel and waits until every queued event has
/// reached the sink.
pub(crate) struct Dispatcher {
    tx: Option<Sender<Event>>,
    handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn spawn(
        sink: Arc<dyn EventSink>,
        resolver: Arc<dyn IdentifierResolver>,
        progress: Arc<ProgressCell>,
    ) -> Result<Self, RefScanError> {
        let (tx, rx) = unbounded::<Event>();

        let handle = thread::Builder::new()
            .name("refscan-reporter".into())
            .spawn(move || {
                for event in rx {
                    match event {
                        Event::Progress(percent) => {
                            progress.set(percent);
                            sink.on_progress(percent);
                        }
                        Event::Match(path) => {
                            let display_name = resolver.resolve_display_name(&path);
                            sink.on_match(&MatchResult { path, display_name });
                        }
                        Event::Log(message) => sink.on_log(&message),
                    }
                }
            })
            .map_err(|e| RefScanError::ThreadPool(e.to_string()))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn progress(&self, percent: f32) {
        self.send(Event::Progress(percent));
    }

    pub fn matched(&self, path: PathBuf) {
        self.send(Event::Match(path));
    }

    pub fn log(&self, message: impl Into<String>) {
        self.send(Event::Log(message.into()));
    }

    fn send(&self, event: Event) {
        // A closed channel means the sink thread died; events are best-effort.
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("event sink panicked; remaining events were dropped");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// WorkProgress
// ---------------------------------------------------------------------------

/// Claimed/total counter shared by the workers of one build or scan phase.
/// Emits one progress event per whole-percent step below 100; the final 100%
/// comes from [`finish`](WorkProgress::finish) once the workers have joined,
/// so it is always the last progress event of the phase.
pub(crate) struct WorkProgress {
    claimed: AtomicUsize,
    reported: AtomicUsize,
    total: usize,
}

impl WorkProgress {
    pub fn new(total: usize) -> Self {
        Self {
            claimed: AtomicUsize::new(0),
            reported: AtomicUsize::new(0),
            total,
        }
    }

    pub fn claim(&self, dispatcher: &Dispatcher) {
        if self.total == 0 {
            return;
        }
        let claimed = self.claimed.fetch_add(1, Ordering::Relaxed) + 1;
        let whole = claimed * 100 / self.total;
        if whole < 100 && self.reported.fetch_max(whole, Ordering::Relaxed) < whole {
            dispatcher.progress(claimed as f32 * 100.0 / self.total as f32);
        }
    }

    pub fn finish(&self, dispatcher: &Dispatcher) {
        if self.total > 0 && self.claimed() >= self.total {
            dispatcher.progress(100.0);
        }
    }

    pub fn claimed(&self) -> usize {
        self.claimed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MapResolver, RecordingSink};

    #[test]
    fn events_reach_the_sink_in_order_before_drop_returns() {
        let sink = Arc::new(RecordingSink::default());
        let cell = Arc::new(ProgressCell::default());
        let dispatcher =
            Dispatcher::spawn(sink.clone(), Arc::new(MapResolver::default()), cell.clone()).unwrap();

        dispatcher.log("starting");
        dispatcher.matched(PathBuf::from("Assets/Hero.prefab"));
        dispatcher.progress(50.0);
        dispatcher.log("done");
        drop(dispatcher);

        assert_eq!(sink.logs(), vec!["starting".to_string(), "done".to_string()]);
        let matches = sink.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].display_name, "Hero.prefab");
        assert_eq!(cell.get(), 50.0);
    }

    #[test]
    fn progress_is_emitted_once_per_whole_percent() {
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Dispatcher::spawn(
            sink.clone(),
            Arc::new(MapResolver::default()),
            Arc::new(ProgressCell::default()),
        )
        .unwrap();

        let progress = WorkProgress::new(400);
        for _ in 0..400 {
            progress.claim(&dispatcher);
        }
        progress.finish(&dispatcher);
        drop(dispatcher);

        let seen = sink.progress();
        assert_eq!(seen.len(), 100);
        assert_eq!(*seen.last().unwrap(), 100.0);
        assert_eq!(progress.claimed(), 400);
    }
}
