//! In-memory collaborators shared by the unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::cancel::CancellationToken;
use crate::error::RefScanError;
use crate::results::MatchResult;
use crate::traits::{EventSink, FileProvider, IdentifierResolver, ResolvedTarget, Target};

/// Blocks every read until the test releases it.
struct Gate {
    started: Sender<PathBuf>,
    release: Receiver<()>,
}

/// Test side of a gated provider.
pub(crate) struct GateControl {
    pub started: Receiver<PathBuf>,
    /// Drop to let every pending and future read through.
    pub release: Sender<()>,
}

#[derive(Default)]
pub(crate) struct MemoryProvider {
    files: BTreeMap<PathBuf, String>,
    failing: HashSet<PathBuf>,
    fail_enumeration: bool,
    gate: Option<Gate>,
    reads: AtomicUsize,
    enumerations: AtomicUsize,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
}

impl MemoryProvider {
    /// `Assets/Item{i}.prefab` containing `item-{i}` for `i` in `0..n`.
    pub fn with_prefabs(n: usize) -> Self {
        (0..n).fold(Self::default(), |p, i| {
            p.file(format!("Assets/Item{i}.prefab"), format!("item-{i}"))
        })
    }

    pub fn file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }

    pub fn failing(mut self, path: impl Into<PathBuf>) -> Self {
        self.failing.insert(path.into());
        self
    }

    pub fn failing_enumeration(mut self) -> Self {
        self.fail_enumeration = true;
        self
    }

    pub fn gated(mut self) -> (Self, GateControl) {
        let (started_tx, started_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        self.gate = Some(Gate {
            started: started_tx,
            release: release_rx,
        });
        (
            self,
            GateControl {
                started: started_rx,
                release: release_tx,
            },
        )
    }

    pub fn cancel_after_reads(&self, n: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((n, token));
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn enumerations(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }
}

impl FileProvider for MemoryProvider {
    fn enumerate_paths(&self, _root: &Path) -> Result<Vec<PathBuf>, RefScanError> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration {
            return Err(RefScanError::Provider("backing store offline".into()));
        }
        Ok(self.files.keys().cloned().collect())
    }

    fn read_all_text(&self, path: &Path) -> Result<String, RefScanError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if n >= *after {
                token.cancel();
            }
        }
        if let Some(gate) = &self.gate {
            let _ = gate.started.send(path.to_path_buf());
            let _ = gate.release.recv();
        }
        if self.failing.contains(path) {
            return Err(RefScanError::io(path, std::io::Error::other("file is locked")));
        }
        self.files
            .get(path)
            .cloned()
            .ok_or_else(|| RefScanError::NotFound(path.to_path_buf()))
    }
}

#[derive(Default)]
pub(crate) struct MapResolver {
    targets: HashMap<String, ResolvedTarget>,
}

impl MapResolver {
    pub fn with(mut self, target: &str, identifier: &str, display_name: &str) -> Self {
        self.targets.insert(
            target.to_string(),
            ResolvedTarget {
                identifier: identifier.to_string(),
                display_name: display_name.to_string(),
            },
        );
        self
    }
}

impl IdentifierResolver for MapResolver {
    fn resolve_identifier(&self, target: &Target) -> Result<ResolvedTarget, RefScanError> {
        self.targets
            .get(target.as_str())
            .cloned()
            .ok_or_else(|| RefScanError::Resolution {
                target: target.to_string(),
                reason: "unknown target".into(),
            })
    }

    fn resolve_display_name(&self, path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    logs: Mutex<Vec<String>>,
    matches: Mutex<Vec<MatchResult>>,
    progress: Mutex<Vec<f32>>,
}

impl RecordingSink {
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().unwrap().clone()
    }

    pub fn matches(&self) -> Vec<MatchResult> {
        self.matches.lock().unwrap().clone()
    }

    pub fn progress(&self) -> Vec<f32> {
        self.progress.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_progress(&self, percent: f32) {
        self.progress.lock().unwrap().push(percent);
    }

    fn on_match(&self, found: &MatchResult) {
        self.matches.lock().unwrap().push(found.clone());
    }

    fn on_log(&self, message: &str) {
        self.logs.lock().unwrap().push(message.to_string());
    }
}
