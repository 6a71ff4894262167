//! Resolving a [`SourceTreeId`] to a host directory. Storage of source
//! trees is owned by an external collaborator (spec §6); this crate only
//! needs *a* path to bind read-only, so the resolution strategy is
//! pluggable behind a trait.

use std::path::PathBuf;

use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::SourceTreeId;

pub trait SourceTreeResolver: Send + Sync {
    fn resolve(&self, id: &SourceTreeId) -> WardenResult<PathBuf>;
}

/// Treats the id as a literal, already-absolute host path. Suitable for a
/// CLI or test harness that doesn't front a real storage service.
#[derive(Debug, Default)]
pub struct PathSourceTreeResolver;

impl SourceTreeResolver for PathSourceTreeResolver {
    fn resolve(&self, id: &SourceTreeId) -> WardenResult<PathBuf> {
        let path = PathBuf::from(id);
        if !path.is_absolute() {
            return Err(WardenError::Validation(format!(
                "source_tree_id {id:?} is not an absolute path"
            )));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_relative_paths() {
        let resolver = PathSourceTreeResolver;
        assert!(resolver.resolve(&"relative/path".to_string()).is_err());
    }

    #[test]
    fn accepts_absolute_paths() {
        let resolver = PathSourceTreeResolver;
        let resolved = resolver.resolve(&"/srv/trees/abc".to_string()).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/trees/abc"));
    }
}
