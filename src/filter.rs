//! Partition enumerated paths into the cache's two collections.
//!
//! Exclusion rules always run first. A path that matches an exclusion rule is
//! dropped even if an inclusion rule would also accept it, so backing files
//! such as `Hero.prefab.meta` never reach the cache.

use std::path::Path;

use crate::record::CacheKind;

/// A single inclusion rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// File name ends with this suffix (ASCII case-insensitive), e.g. `.prefab`.
    Suffix(String),

    /// Path lies under a directory with this relative prefix, e.g. `Assets/Scenes`.
    DirPrefix(String),
}

impl Rule {
    pub fn suffix(s: impl Into<String>) -> Self {
        Self::Suffix(s.into())
    }

    pub fn dir_prefix(s: impl Into<String>) -> Self {
        Self::DirPrefix(s.into())
    }

    fn matches(&self, normalized: &str) -> bool {
        match self {
            Self::Suffix(s) => ends_with_ignore_case(normalized, s),
            Self::DirPrefix(p) => under_dir(normalized, p),
        }
    }
}

/// Inclusion/exclusion rules for the scene and asset collections.
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude_suffixes: Vec<String>,
    exclude_dirs: Vec<String>,
    scene_rules: Vec<Rule>,
    asset_rules: Vec<Rule>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            exclude_suffixes: vec![".meta".into()],
            exclude_dirs: vec!["Library".into(), "Temp".into(), "obj".into()],
            scene_rules: vec![Rule::suffix(".unity")],
            asset_rules: [
                ".prefab",
                ".asset",
                ".mat",
                ".controller",
                ".overrideController",
                ".anim",
                ".playable",
                ".mask",
                ".spriteatlas",
                ".shadergraph",
                ".physicMaterial",
            ]
            .into_iter()
            .map(Rule::suffix)
            .collect(),
        }
    }
}

impl PathFilter {
    /// A filter with no rules at all. Nothing is classified until rules are added.
    pub fn empty() -> Self {
        Self {
            exclude_suffixes: Vec::new(),
            exclude_dirs: Vec::new(),
            scene_rules: Vec::new(),
            asset_rules: Vec::new(),
        }
    }

    pub fn exclude_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.exclude_suffixes.push(suffix.into());
        self
    }

    /// Exclude any path with a directory component (or component run) equal to `dir`.
    pub fn exclude_dir(mut self, dir: impl Into<String>) -> Self {
        self.exclude_dirs.push(dir.into());
        self
    }

    pub fn scene_rule(mut self, rule: Rule) -> Self {
        self.scene_rules.push(rule);
        self
    }

    pub fn asset_rule(mut self, rule: Rule) -> Self {
        self.asset_rules.push(rule);
        self
    }

    /// Which collection `path` belongs to, or `None` if it is excluded or
    /// matches no inclusion rule. Scene rules win over asset rules.
    pub fn classify(&self, path: &Path) -> Option<CacheKind> {
        let normalized = path.to_string_lossy().replace('\\', "/");

        if self
            .exclude_suffixes
            .iter()
            .any(|s| ends_with_ignore_case(&normalized, s))
        {
            return None;
        }
        if self.exclude_dirs.iter().any(|d| under_dir(&normalized, d)) {
            return None;
        }

        if self.scene_rules.iter().any(|r| r.matches(&normalized)) {
            Some(CacheKind::Scenes)
        } else if self.asset_rules.iter().any(|r| r.matches(&normalized)) {
            Some(CacheKind::Assets)
        } else {
            None
        }
    }
}

fn ends_with_ignore_case(haystack: &str, suffix: &str) -> bool {
    let (h, s) = (haystack.as_bytes(), suffix.as_bytes());
    h.len() >= s.len() && h[h.len() - s.len()..].eq_ignore_ascii_case(s)
}

/// `dir` appears as a whole run of components, anchored at the start or after a `/`.
fn under_dir(normalized: &str, dir: &str) -> bool {
    let dir = dir.trim_matches('/');
    if dir.is_empty() {
        return false;
    }
    let needle = format!("{dir}/");
    normalized.starts_with(&needle) || normalized.contains(&format!("/{needle}"))
}
