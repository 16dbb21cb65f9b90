use std::path::{Path, PathBuf};

/// A file's path and its full text, captured once while the cache is built.
///
/// Never mutated after creation. Owned by the coordinator's cache collection
/// that created it and dropped when that collection is cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRecord {
    path: PathBuf,
    contents: String,
}

impl ContentRecord {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    /// Ordinal containment: byte-for-byte, no case folding, no normalization.
    pub fn references(&self, identifier: &str) -> bool {
        self.contents.contains(identifier)
    }
}

/// Which logical collection of the cache a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    /// General assets (prefabs, materials, controllers, ...).
    Assets,

    /// Scene-like assets.
    Scenes,
}

/// The subset of the cache an operation builds and scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheScope {
    Assets,
    Scenes,
    #[default]
    Both,
}

impl CacheScope {
    pub fn includes(self, kind: CacheKind) -> bool {
        match self {
            Self::Both => true,
            Self::Assets => kind == CacheKind::Assets,
            Self::Scenes => kind == CacheKind::Scenes,
        }
    }

    /// Kinds in scan order: assets first, then scenes.
    pub fn kinds(self) -> impl Iterator<Item = CacheKind> {
        [CacheKind::Assets, CacheKind::Scenes]
            .into_iter()
            .filter(move |k| self.includes(*k))
    }
}
