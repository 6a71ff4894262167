//! `evaluate` — the total, pure function from `(CompiledRuleSet, path)` to
//! [`AccessLevel`] (spec §4.1, §4.2).

use boxwarden_shared::access::AccessLevel;

use super::compiled::CompiledRuleSet;
use super::path::normalize;

/// Evaluate the effective access level for `path` against `set`.
///
/// `path` is normalized before matching, so callers may pass a path exactly
/// as observed at the filesystem boundary. Returns [`AccessLevel::None`]
/// when no rule matches — the system is secure-by-default (spec §4.1).
pub fn evaluate(set: &CompiledRuleSet, path: &str) -> AccessLevel {
    let normalized = normalize(path);
    set.first_match(&normalized)
        .map(|rule| rule.access())
        .unwrap_or(AccessLevel::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxwarden_shared::types::{PatternRule, RuleKind};

    fn rules() -> CompiledRuleSet {
        let rules = vec![
            PatternRule {
                pattern: "**".to_string(),
                kind: RuleKind::Glob,
                access: AccessLevel::Read,
                priority: 0,
            },
            PatternRule {
                pattern: "/secrets/**".to_string(),
                kind: RuleKind::Glob,
                access: AccessLevel::None,
                priority: 100,
            },
            PatternRule {
                pattern: "/secrets/public.pem".to_string(),
                kind: RuleKind::File,
                access: AccessLevel::Read,
                priority: 100,
            },
        ];
        CompiledRuleSet::compile(&rules).unwrap()
    }

    #[test]
    fn scenario_a_hidden_secrets() {
        let set = rules();
        assert_eq!(evaluate(&set, "/src/app.py"), AccessLevel::Read);
        assert_eq!(evaluate(&set, "/secrets/key.pem"), AccessLevel::None);
    }

    #[test]
    fn scenario_d_specificity_override() {
        let set = rules();
        assert_eq!(evaluate(&set, "/secrets/public.pem"), AccessLevel::Read);
        assert_eq!(evaluate(&set, "/secrets/private.pem"), AccessLevel::None);
    }

    #[test]
    fn unmatched_path_defaults_to_none() {
        let set = CompiledRuleSet::empty();
        assert_eq!(evaluate(&set, "/anything"), AccessLevel::None);
    }

    #[test]
    fn evaluation_normalizes_the_path_first() {
        let set = rules();
        assert_eq!(
            evaluate(&set, "/src/../secrets/public.pem"),
            AccessLevel::Read
        );
    }

    #[test]
    fn scenario_c_view_only_directory() {
        let rules = vec![
            PatternRule {
                pattern: "/configs/**".to_string(),
                kind: RuleKind::Glob,
                access: AccessLevel::View,
                priority: 0,
            },
            PatternRule {
                pattern: "**".to_string(),
                kind: RuleKind::Glob,
                access: AccessLevel::Read,
                priority: 0,
            },
        ];
        let set = CompiledRuleSet::compile(&rules).unwrap();
        let level = evaluate(&set, "/configs/db.yaml");
        assert_eq!(level, AccessLevel::View);
        assert!(level.allows_lookup());
        assert!(!level.allows_read());
        assert_eq!(evaluate(&set, "/src/app.py"), AccessLevel::Read);
    }
}
