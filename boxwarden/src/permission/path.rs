//! Path canonicalization for permission evaluation (spec §3 "Path").
//!
//! Paths handed to the permission engine are always canonicalized the same
//! way the enforcing filesystem observes them: leading `/`, no `.`/`..`
//! components, forward slashes, no trailing separator except for the root.
//! This module operates on strings, not the host filesystem — resolving a
//! virtual path never touches disk.

/// Normalize a virtual path into the engine's canonical form.
///
/// `.` components are dropped, `..` pops the previous component (clamped at
/// the root), and repeated/trailing separators collapse. The result always
/// starts with `/`.
pub fn normalize(path: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => continue,
            ".." => {
                out.pop();
            }
            seg => out.push(seg),
        }
    }
    if out.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out.join("/"))
    }
}

/// Join a normalized parent directory with a single child segment, returning
/// a normalized path. `child` must not itself contain `/`.
pub fn join(parent: &str, child: &str) -> String {
    if parent == "/" {
        format!("/{child}")
    } else {
        format!("{parent}/{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_dot_and_dotdot() {
        assert_eq!(normalize("/a/./b/../c"), "/a/c");
    }

    #[test]
    fn collapses_repeated_separators() {
        assert_eq!(normalize("//a///b/"), "/a/b");
    }

    #[test]
    fn empty_and_root_normalize_to_root() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn dotdot_past_root_clamps() {
        assert_eq!(normalize("/../../a"), "/a");
    }

    #[test]
    fn join_handles_root_parent() {
        assert_eq!(join("/", "secrets"), "/secrets");
        assert_eq!(join("/secrets", "key.pem"), "/secrets/key.pem");
    }
}
