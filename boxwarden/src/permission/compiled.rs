//! Compiling user-supplied rules into a deterministic evaluation order
//! (spec §4.1 `compile`, §4.2 ordering key, §9 "Rule ordering").

use std::cmp::Ordering;
use std::sync::Arc;

use boxwarden_shared::access::AccessLevel;
use boxwarden_shared::errors::{WardenError, WardenResult};
use boxwarden_shared::types::{PatternRule, RuleKind};
use globset::{GlobBuilder, GlobMatcher};

use super::rule::{normalize_directory_pattern, validate};

/// How a single compiled rule tests a normalized path.
enum Matcher {
    File(String),
    Directory(String),
    Glob(GlobMatcher),
}

impl Matcher {
    fn matches(&self, path: &str) -> bool {
        match self {
            Matcher::File(pattern) => pattern == path,
            Matcher::Directory(pattern) => {
                path == pattern || path.starts_with(&format!("{pattern}/"))
            }
            Matcher::Glob(matcher) => matcher.is_match(path),
        }
    }
}

/// One rule after validation and matcher pre-compilation, annotated with
/// everything needed to recompute its place in the evaluation order.
pub struct CompiledRule {
    pattern: String,
    kind: RuleKind,
    access: AccessLevel,
    priority: i64,
    original_index: usize,
    matcher: Matcher,
}

impl CompiledRule {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> AccessLevel {
        self.access
    }

    pub fn priority(&self) -> i64 {
        self.priority
    }

    fn kind_specificity(&self) -> u8 {
        match self.kind {
            RuleKind::File => 0,
            RuleKind::Directory => 1,
            RuleKind::Glob => 2,
        }
    }

    /// Length of the pattern up to its first wildcard character, and the
    /// total wildcard count — used for the within-kind specificity tie-break
    /// (spec §4.2 point 3).
    fn pattern_specificity(&self) -> (usize, usize) {
        match self.kind {
            RuleKind::File | RuleKind::Directory => (self.pattern.len(), 0),
            RuleKind::Glob => {
                let literal_prefix = self
                    .pattern
                    .find(['*', '?'])
                    .unwrap_or(self.pattern.len());
                let wildcards = self.pattern.chars().filter(|c| *c == '*' || *c == '?').count();
                (literal_prefix, wildcards)
            }
        }
    }

    /// Ordering key comparator implementing spec §4.2's four-level sort:
    /// priority desc, kind specificity asc (file most specific), literal
    /// prefix desc, wildcard count asc, pattern length desc, original
    /// position asc.
    fn cmp_order(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.kind_specificity().cmp(&other.kind_specificity()))
            .then_with(|| {
                let (self_prefix, self_wild) = self.pattern_specificity();
                let (other_prefix, other_wild) = other.pattern_specificity();
                other_prefix
                    .cmp(&self_prefix)
                    .then_with(|| self_wild.cmp(&other_wild))
                    .then_with(|| other.pattern.len().cmp(&self.pattern.len()))
            })
            .then_with(|| self.original_index.cmp(&other.original_index))
    }
}

/// A validated, sorted, matcher-ready sequence of rules. Immutable for the
/// lifetime of the sandbox that owns it. Cheaply cloneable — internally an
/// `Arc` — so a sandbox record can hand copies to the filesystem worker and
/// the permission cache without re-sorting.
#[derive(Clone)]
pub struct CompiledRuleSet {
    rules: Arc<[CompiledRule]>,
}

impl CompiledRuleSet {
    /// Validate, pre-compile, and sort `rules` into evaluation order.
    pub fn compile(rules: &[PatternRule]) -> WardenResult<Self> {
        let mut compiled = Vec::with_capacity(rules.len());
        for (index, rule) in rules.iter().enumerate() {
            validate(rule)?;
            let matcher = match rule.kind {
                RuleKind::File => Matcher::File(rule.pattern.clone()),
                RuleKind::Directory => {
                    Matcher::Directory(normalize_directory_pattern(&rule.pattern))
                }
                RuleKind::Glob => {
                    let glob = GlobBuilder::new(&rule.pattern)
                        .literal_separator(true)
                        .build()
                        .map_err(|e| {
                            WardenError::Validation(format!(
                                "invalid glob pattern {:?}: {e}",
                                rule.pattern
                            ))
                        })?;
                    Matcher::Glob(glob.compile_matcher())
                }
            };
            compiled.push(CompiledRule {
                pattern: rule.pattern.clone(),
                kind: rule.kind,
                access: rule.access,
                priority: rule.priority,
                original_index: index,
                matcher,
            });
        }
        compiled.sort_by(|a, b| a.cmp_order(b));
        Ok(Self {
            rules: compiled.into(),
        })
    }

    /// An empty rule set: every path evaluates to the secure-by-default level.
    pub fn empty() -> Self {
        Self { rules: Arc::from([]) }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first-in-sort-order rule matching `path`, if any.
    pub(crate) fn first_match(&self, path: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.matcher.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(pattern: &str, kind: RuleKind, access: AccessLevel, priority: i64) -> PatternRule {
        PatternRule {
            pattern: pattern.to_string(),
            kind,
            access,
            priority,
        }
    }

    #[test]
    fn higher_priority_wins_regardless_of_kind() {
        let rules = vec![
            rule("/secrets/**", RuleKind::Glob, AccessLevel::None, 100),
            rule("/secrets/public.pem", RuleKind::File, AccessLevel::Read, 0),
        ];
        let set = CompiledRuleSet::compile(&rules).unwrap();
        let m = set.first_match("/secrets/public.pem").unwrap();
        assert_eq!(m.access(), AccessLevel::None);
    }

    #[test]
    fn equal_priority_file_beats_glob() {
        let rules = vec![
            rule("/secrets/**", RuleKind::Glob, AccessLevel::None, 100),
            rule("/secrets/public.pem", RuleKind::File, AccessLevel::Read, 100),
        ];
        let set = CompiledRuleSet::compile(&rules).unwrap();
        let m = set.first_match("/secrets/public.pem").unwrap();
        assert_eq!(m.access(), AccessLevel::Read);
    }

    #[test]
    fn deterministic_regardless_of_insertion_order() {
        let forward = vec![
            rule("**", RuleKind::Glob, AccessLevel::Read, 0),
            rule("/secrets/**", RuleKind::Glob, AccessLevel::None, 100),
        ];
        let backward = vec![
            rule("/secrets/**", RuleKind::Glob, AccessLevel::None, 100),
            rule("**", RuleKind::Glob, AccessLevel::Read, 0),
        ];
        let a = CompiledRuleSet::compile(&forward).unwrap();
        let b = CompiledRuleSet::compile(&backward).unwrap();
        assert_eq!(
            a.first_match("/secrets/key.pem").unwrap().access(),
            b.first_match("/secrets/key.pem").unwrap().access()
        );
    }

    #[test]
    fn empty_set_matches_nothing() {
        let set = CompiledRuleSet::empty();
        assert!(set.first_match("/anything").is_none());
    }

    #[test]
    fn rejects_invalid_glob() {
        let rules = vec![rule("[", RuleKind::Glob, AccessLevel::Read, 0)];
        assert!(CompiledRuleSet::compile(&rules).is_err());
    }
}
