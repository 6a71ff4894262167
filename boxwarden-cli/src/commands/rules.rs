//! Parses `--rule PATTERN:KIND:ACCESS[:PRIORITY]` flags into [`PatternRule`]s.

use anyhow::{anyhow, Context};
use boxwarden_shared::access::AccessLevel;
use boxwarden_shared::types::{PatternRule, RuleKind};

pub fn parse_rule(raw: &str) -> anyhow::Result<PatternRule> {
    let mut parts = raw.splitn(4, ':');
    let pattern = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("rule {raw:?} is missing a pattern"))?
        .to_string();
    let kind = parts
        .next()
        .ok_or_else(|| anyhow!("rule {raw:?} is missing a kind (file|directory|glob)"))?;
    let access = parts
        .next()
        .ok_or_else(|| anyhow!("rule {raw:?} is missing an access level (none|view|read|write)"))?;
    let priority = match parts.next() {
        Some(p) => p
            .parse::<i64>()
            .with_context(|| format!("rule {raw:?} has a non-numeric priority"))?,
        None => 0,
    };

    Ok(PatternRule {
        pattern,
        kind: parse_kind(kind)?,
        access: parse_access(access)?,
        priority,
    })
}

fn parse_kind(raw: &str) -> anyhow::Result<RuleKind> {
    match raw {
        "file" => Ok(RuleKind::File),
        "directory" => Ok(RuleKind::Directory),
        "glob" => Ok(RuleKind::Glob),
        other => Err(anyhow!("unknown rule kind {other:?} (expected file|directory|glob)")),
    }
}

fn parse_access(raw: &str) -> anyhow::Result<AccessLevel> {
    match raw {
        "none" => Ok(AccessLevel::None),
        "view" => Ok(AccessLevel::View),
        "read" => Ok(AccessLevel::Read),
        "write" => Ok(AccessLevel::Write),
        other => Err(anyhow!(
            "unknown access level {other:?} (expected none|view|read|write)"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_rule() {
        let rule = parse_rule("/etc/**:glob:read:10").unwrap();
        assert_eq!(rule.pattern, "/etc/**");
        assert_eq!(rule.kind, RuleKind::Glob);
        assert_eq!(rule.access, AccessLevel::Read);
        assert_eq!(rule.priority, 10);
    }

    #[test]
    fn defaults_priority_to_zero() {
        let rule = parse_rule("/src:directory:write").unwrap();
        assert_eq!(rule.priority, 0);
    }

    #[test]
    fn rejects_unknown_kind() {
        assert!(parse_rule("/src:bogus:write").is_err());
    }

    #[test]
    fn rejects_unknown_access() {
        assert!(parse_rule("/src:directory:bogus").is_err());
    }

    #[test]
    fn rejects_missing_fields() {
        assert!(parse_rule("/src").is_err());
        assert!(parse_rule("/src:directory").is_err());
    }
}
