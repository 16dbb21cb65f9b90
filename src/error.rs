use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefScanError {
    // Config
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),

    // Coordination
    #[error("an operation is already in flight")]
    OperationInFlight,

    #[error("operation canceled")]
    Canceled,

    // Traversal / IO
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("symlink loop: {}", .0.display())]
    SymlinkLoop(PathBuf),

    #[error("IO error at {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Collaborators
    #[error("could not resolve target `{target}`: {reason}")]
    Resolution { target: String, reason: String },

    #[error("provider error: {0}")]
    Provider(String),

    // Runtime
    #[error("thread pool failure: {0}")]
    ThreadPool(String),

    #[error("worker panicked: {0}")]
    WorkerPanic(String),
}

impl RefScanError {
    /// The path this error occurred at, if applicable.
    /// Callers use this to present "Skipped: <path>" without pattern matching on variants.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::PermissionDenied(p)
            | Self::NotFound(p)
            | Self::SymlinkLoop(p)
            | Self::Io { path: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Whether a worker can keep claiming work after this error.
    ///
    /// Recoverable errors (permission denied, symlink loops, IO on one file)
    /// are recorded and the file is simply missing from the cache.
    ///
    /// Everything else ends the worker that raised it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_) | Self::SymlinkLoop(_) | Self::NotFound(_) | Self::Io { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            _ => Self::Io { path, source },
        }
    }
}
