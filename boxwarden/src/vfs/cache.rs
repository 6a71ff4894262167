//! Permission decision cache (spec §4.4 "Caching").
//!
//! Decisions are cached per path for the lifetime of a compiled rule set.
//! Because the rule set is immutable for a sandbox's life, the only thing
//! that can invalidate an entry is a delta-layer mutation of the enclosing
//! directory — a rename or removal can change which paths exist, but never
//! which rule applies to a given normalized path. We still invalidate on
//! every mutation under the affected directory to keep the cache honest
//! about existence, not just about rule matching.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use boxwarden_shared::access::AccessLevel;
use parking_lot::RwLock;

#[derive(Default)]
pub struct PermissionCache {
    entries: RwLock<HashMap<PathBuf, AccessLevel>>,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &self,
        path: &Path,
        compute: impl FnOnce() -> AccessLevel,
    ) -> AccessLevel {
        if let Some(level) = self.entries.read().get(path) {
            return *level;
        }
        let level = compute();
        self.entries.write().insert(path.to_path_buf(), level);
        level
    }

    /// Drop every cached entry at or below `dir` — called whenever the
    /// delta layer mutates that directory's contents.
    pub fn invalidate_subtree(&self, dir: &Path) {
        let mut entries = self.entries.write();
        entries.retain(|path, _| !path.starts_with(dir));
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_after_first_computation() {
        let cache = PermissionCache::new();
        let mut calls = 0;
        for _ in 0..3 {
            cache.get_or_insert_with(Path::new("/a"), || {
                calls += 1;
                AccessLevel::Read
            });
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn invalidate_subtree_clears_only_affected_paths() {
        let cache = PermissionCache::new();
        cache.get_or_insert_with(Path::new("/a/x"), || AccessLevel::Read);
        cache.get_or_insert_with(Path::new("/b/y"), || AccessLevel::Read);
        cache.invalidate_subtree(Path::new("/a"));
        assert_eq!(cache.len(), 1);
    }
}
