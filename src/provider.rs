//! Filesystem-backed collaborators.
//!
//! [`DirectoryProvider`] walks real directories in parallel and reads files
//! from disk. [`MetaGuidResolver`] understands the sidecar convention used by
//! game-engine asset trees, where `Hero.prefab` has a `Hero.prefab.meta`
//! carrying a `guid:` line that other assets reference by value.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use ignore::{DirEntry, WalkBuilder, WalkState};

use crate::error::RefScanError;
use crate::traits::{FileProvider, IdentifierResolver, ResolvedTarget, Target};

// ---------------------------------------------------------------------------
// DirectoryProvider
// ---------------------------------------------------------------------------

/// Enumerates files with a parallel directory walk and reads them as text,
/// replacing any invalid UTF-8.
///
/// No ignore files are honoured: an asset referenced from a git-ignored
/// folder is still a reference.
#[derive(Debug, Clone)]
pub struct DirectoryProvider {
    threads: usize,
    follow_links: bool,
    skip_hidden: bool,
}

impl Default for DirectoryProvider {
    fn default() -> Self {
        Self {
            threads: 0,
            follow_links: false,
            skip_hidden: false,
        }
    }
}

impl DirectoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Walker threads. `0` lets the walker pick.
    pub fn threads(mut self, n: usize) -> Self {
        self.threads = n;
        self
    }

    pub fn follow_links(mut self, yes: bool) -> Self {
        self.follow_links = yes;
        self
    }

    pub fn skip_hidden(mut self, yes: bool) -> Self {
        self.skip_hidden = yes;
        self
    }
}

impl FileProvider for DirectoryProvider {
    fn enumerate_paths(&self, root: &Path) -> Result<Vec<PathBuf>, RefScanError> {
        if !root.exists() {
            return Err(RefScanError::NotFound(root.to_path_buf()));
        }

        let mut builder = WalkBuilder::new(root);
        builder
            .standard_filters(false)
            .ignore(false)
            .parents(false)
            .hidden(self.skip_hidden)
            .follow_links(self.follow_links)
            .same_file_system(false)
            .threads(self.threads);

        let paths = Mutex::new(Vec::<PathBuf>::new());

        builder.build_parallel().run(|| {
            let paths = &paths;
            Box::new(move |res: Result<DirEntry, ignore::Error>| -> WalkState {
                let entry = match res {
                    Ok(e) => e,
                    Err(e) => {
                        log::warn!("skipped while enumerating: {}", map_ignore_error(e));
                        return WalkState::Continue;
                    }
                };
                if entry.file_type().is_some_and(|ft| ft.is_file()) {
                    paths
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(entry.into_path());
                }
                WalkState::Continue
            })
        });

        let mut paths = paths.into_inner().unwrap_or_else(PoisonError::into_inner);
        paths.sort();
        log::debug!("enumerated {} files under {}", paths.len(), root.display());
        Ok(paths)
    }

    /// Invalid UTF-8 is replaced rather than rejected; identifiers are ASCII and
    /// still match around a stray byte.
    fn read_all_text(&self, path: &Path) -> Result<String, RefScanError> {
        let bytes = std::fs::read(path).map_err(|e| RefScanError::io(path, e))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn map_ignore_error(e: ignore::Error) -> RefScanError {
    match e {
        ignore::Error::WithPath { path, err } => match *err {
            ignore::Error::Io(io_err) => RefScanError::io(path, io_err),
            other => RefScanError::Provider(format!("{}: {other}", path.display())),
        },
        ignore::Error::WithDepth { err, .. } => map_ignore_error(*err),
        ignore::Error::Loop { child, .. } => RefScanError::SymlinkLoop(child),
        ignore::Error::Io(io_err) => RefScanError::io(PathBuf::new(), io_err),
        other => RefScanError::Provider(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// MetaGuidResolver
// ---------------------------------------------------------------------------

const META_SUFFIX: &str = ".meta";

/// Resolves a target (an asset path, relative to `root` or absolute) to the
/// GUID stored in its `.meta` sidecar.
///
/// Display names are paths relative to `root`, with `/` separators.
#[derive(Debug, Clone)]
pub struct MetaGuidResolver {
    root: PathBuf,
}

impl MetaGuidResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

impl IdentifierResolver for MetaGuidResolver {
    fn resolve_identifier(&self, target: &Target) -> Result<ResolvedTarget, RefScanError> {
        let asset = self.root.join(target.as_str());
        let mut meta = OsString::from(asset.as_os_str());
        meta.push(META_SUFFIX);
        let meta = PathBuf::from(meta);

        let resolution = |reason: String| RefScanError::Resolution {
            target: target.to_string(),
            reason,
        };

        let text = std::fs::read_to_string(&meta)
            .map_err(|e| resolution(format!("cannot read {}: {e}", meta.display())))?;

        let guid = parse_guid(&text)
            .ok_or_else(|| resolution(format!("no guid in {}", meta.display())))?;

        Ok(ResolvedTarget {
            identifier: guid.to_string(),
            display_name: self.resolve_display_name(&asset),
        })
    }

    fn resolve_display_name(&self, path: &Path) -> String {
        self.relative(path).to_string_lossy().replace('\\', "/")
    }
}

/// Value of the first top-level `guid:` line.
fn parse_guid(meta: &str) -> Option<&str> {
    meta.lines()
        .filter_map(|line| line.strip_prefix("guid:"))
        .map(str::trim)
        .find(|guid| !guid.is_empty())
}
