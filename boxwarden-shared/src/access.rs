//! The four-valued access level that every path evaluates to.

use serde::{Deserialize, Serialize};

/// Effective access granted to a path, totally ordered `None < View < Read < Write`.
///
/// Declaration order doubles as derivation order for `PartialOrd`/`Ord` —
/// do not reorder these variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// The path behaves as if it does not exist: hidden from lookup and listing.
    None,
    /// Metadata lookup and directory enumeration, no content reads.
    View,
    /// Reads and metadata, no mutation.
    Read,
    /// Reads, metadata, content modification, creation, deletion, renames.
    Write,
}

impl AccessLevel {
    /// Whether this level permits a lookup/stat of the path.
    pub fn allows_lookup(self) -> bool {
        self >= AccessLevel::View
    }

    /// Whether this level permits opening the path for reading.
    pub fn allows_read(self) -> bool {
        self >= AccessLevel::Read
    }

    /// Whether this level permits creating, writing, deleting, or renaming.
    pub fn allows_write(self) -> bool {
        self >= AccessLevel::Write
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::None
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AccessLevel::None => "none",
            AccessLevel::View => "view",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_order_matches_spec() {
        assert!(AccessLevel::None < AccessLevel::View);
        assert!(AccessLevel::View < AccessLevel::Read);
        assert!(AccessLevel::Read < AccessLevel::Write);
    }

    #[test]
    fn permission_predicates() {
        assert!(!AccessLevel::None.allows_lookup());
        assert!(AccessLevel::View.allows_lookup());
        assert!(!AccessLevel::View.allows_read());
        assert!(AccessLevel::Read.allows_read());
        assert!(!AccessLevel::Read.allows_write());
        assert!(AccessLevel::Write.allows_write());
    }

    #[test]
    fn default_is_none() {
        assert_eq!(AccessLevel::default(), AccessLevel::None);
    }
}
