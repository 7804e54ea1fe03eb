use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use regex::Regex;

/// Upper bound on memoized decisions before the memo is reset.
const MEMO_LIMIT: usize = 1 << 20;

/// Append-only set of exclusion patterns with memoized decisions.
#[derive(Debug, Default)]
pub struct ExcludeMatcher {
    patterns: RwLock<Vec<Regex>>,
    sources: RwLock<HashSet<String>>,
    memo: RwLock<HashMap<PathBuf, bool>>,
    sub_exclusions: RwLock<HashMap<PathBuf, Vec<PathBuf>>>,
}

impl ExcludeMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and registers `pattern`. Returns `false` if it was already
    /// registered.
    pub fn add_pattern(&self, pattern: &str) -> Result<bool, regex::Error> {
        if self.sources.read().contains(pattern) {
            return Ok(false);
        }
        let regex = Regex::new(pattern)?;

        let mut sources = self.sources.write();
        if !sources.insert(pattern.to_string()) {
            return Ok(false);
        }
        self.patterns.write().push(regex);
        // Memoized exclusions stay valid; memoized inclusions may not.
        self.memo.write().retain(|_, excluded| *excluded);
        tracing::debug!(target = "dirtally.monitor", pattern, "registered exclude pattern");
        Ok(true)
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.read().len()
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        if let Some(excluded) = self.memo.read().get(path) {
            return *excluded;
        }

        let text = path.to_string_lossy();
        // The patterns guard stays alive until the decision is memoized, so
        // `add_pattern` cannot purge in between and leave it stale.
        let patterns = self.patterns.read();
        let excluded = patterns.iter().any(|pattern| pattern.is_match(&text));

        let mut memo = self.memo.write();
        if memo.len() >= MEMO_LIMIT {
            memo.clear();
        }
        memo.insert(path.to_path_buf(), excluded);
        excluded
    }

    /// Records `child` as a known excluded descendant of `parent`.
    pub fn add_sub_exclusion(&self, parent: &Path, child: &Path) {
        let mut subs = self.sub_exclusions.write();
        let children = subs.entry(parent.to_path_buf()).or_default();
        if !children.iter().any(|known| known == child) {
            children.push(child.to_path_buf());
        }
    }

    pub fn is_sub_excluded(&self, parent: &Path, child: &Path) -> bool {
        self.sub_exclusions
            .read()
            .get(parent)
            .is_some_and(|children| children.iter().any(|known| known == child))
    }
}
