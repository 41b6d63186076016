//! Trigger rules: deciding whether an event starts a run.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TriggerError;
use crate::event::{Event, EventKind};

/// A single trigger rule.
///
/// An event starts a run iff some rule accepts it: the event kind is one
/// of the rule's kinds, the branch matches one of the branch patterns,
/// and at least one changed path matches at least one path pattern.
/// OR semantics apply across rules, branches, paths and patterns.
///
/// An empty pattern list means "match everything" for that dimension, so
/// a rule with no `paths` fires for any change set — including an empty
/// one. A rule that does declare path patterns never fires for an event
/// with zero changed paths.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TriggerRule {
    /// Event kinds this rule applies to.
    pub kinds: Vec<EventKind>,

    /// Branch patterns, exact or glob (e.g. "main", "release/**").
    #[serde(default)]
    pub branches: Vec<String>,

    /// Changed-path glob patterns (e.g. "**.rs", "Cargo.lock").
    #[serde(default)]
    pub paths: Vec<String>,
}

impl TriggerRule {
    /// Rule for a single event kind.
    pub fn new(kind: EventKind, branches: Vec<String>, paths: Vec<String>) -> Self {
        Self {
            kinds: vec![kind],
            branches,
            paths,
        }
    }
}

/// Compiled form of one rule: glob sets ready for matching.
#[derive(Debug)]
struct CompiledRule {
    kinds: Vec<EventKind>,
    /// `None` means every branch matches.
    branches: Option<GlobSet>,
    /// `None` means every change set matches, even an empty one.
    paths: Option<GlobSet>,
}

impl CompiledRule {
    fn matches(&self, event: &Event) -> bool {
        if !self.kinds.contains(&event.kind) {
            return false;
        }
        if let Some(branches) = &self.branches {
            if !branches.is_match(event.branch.as_str()) {
                return false;
            }
        }
        match &self.paths {
            None => true,
            Some(paths) => event.changed_paths.iter().any(|p| paths.is_match(p)),
        }
    }
}

/// The full set of trigger rules for a workflow.
pub struct TriggerSet {
    rules: Vec<CompiledRule>,
}

impl TriggerSet {
    /// Compile rules into matchable glob sets.
    pub fn compile(rules: &[TriggerRule]) -> Result<Self, TriggerError> {
        let compiled = rules
            .iter()
            .map(|rule| {
                Ok(CompiledRule {
                    kinds: rule.kinds.clone(),
                    branches: build_globset(&rule.branches)?,
                    paths: build_globset(&rule.paths)?,
                })
            })
            .collect::<Result<Vec<_>, TriggerError>>()?;
        Ok(Self { rules: compiled })
    }

    /// Whether the event should start a run.
    ///
    /// `false` means the run is not created at all — distinct from a run
    /// that is created and then skipped.
    pub fn matches(&self, event: &Event) -> bool {
        let matched = self.rules.iter().any(|rule| rule.matches(event));
        debug!(
            kind = %event.kind,
            branch = %event.branch,
            changed = event.changed_paths.len(),
            matched,
            "Evaluated trigger rules"
        );
        matched
    }

    /// Number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules (matches nothing).
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Build a glob set from patterns; empty input yields `None` ("match all").
fn build_globset(patterns: &[String]) -> Result<Option<GlobSet>, TriggerError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(&normalize_pattern(pattern))
            .build()
            .map_err(|source| TriggerError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|source| TriggerError::InvalidPattern {
            pattern: patterns.join(", "),
            source,
        })?;
    Ok(Some(set))
}

/// Rewrite `**` sequences that do not form a whole path component into `*`.
///
/// The hosting platform's filter syntax allows `**.rs` ("any .rs file at
/// any depth"), while globset only recognizes `**` as a full component.
/// The globs here are built without a literal separator, so a single `*`
/// crosses `/` and the rewritten pattern keeps the original meaning.
fn normalize_pattern(pattern: &str) -> String {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] != '*' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        let run_start = i;
        while i < chars.len() && chars[i] == '*' {
            i += 1;
        }
        let at_start = run_start == 0 || chars[run_start - 1] == '/';
        let at_end = i == chars.len() || chars[i] == '/';
        if i - run_start >= 2 && at_start && at_end {
            out.push_str("**");
        } else {
            out.push('*');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quality_rule(kind: EventKind) -> TriggerRule {
        TriggerRule::new(
            kind,
            vec!["main".to_string()],
            vec![
                "**.rs".to_string(),
                "Cargo.toml".to_string(),
                "Cargo.lock".to_string(),
            ],
        )
    }

    #[test]
    fn test_push_to_main_with_manifest_change_matches() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::Push, "main", ["Cargo.toml"]);
        assert!(set.matches(&event));
    }

    #[test]
    fn test_push_with_unrelated_change_does_not_match() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::Push, "main", ["README.md"]);
        assert!(!set.matches(&event));
    }

    #[test]
    fn test_kind_must_have_a_rule() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::PullRequest, "main", ["Cargo.toml"]);
        assert!(!set.matches(&event));
    }

    #[test]
    fn test_branch_must_match() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::Push, "feature/foo", ["Cargo.toml"]);
        assert!(!set.matches(&event));
    }

    #[test]
    fn test_nested_rust_file_matches_double_star_pattern() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::Push, "main", ["src/engine/runner.rs"]);
        assert!(set.matches(&event));
    }

    #[test]
    fn test_one_matching_path_among_many_is_enough() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(
            EventKind::Push,
            "main",
            ["docs/guide.md", "Cargo.lock", "LICENSE"],
        );
        assert!(set.matches(&event));
    }

    #[test]
    fn test_zero_changed_paths_never_match_declared_path_filters() {
        let set = TriggerSet::compile(&[quality_rule(EventKind::Push)]).unwrap();
        let event = Event::new(EventKind::Push, "main", Vec::<String>::new());
        assert!(!set.matches(&event));
    }

    #[test]
    fn test_empty_path_patterns_match_any_change_set() {
        let rule = TriggerRule::new(EventKind::Push, vec!["main".to_string()], vec![]);
        let set = TriggerSet::compile(&[rule]).unwrap();
        assert!(set.matches(&Event::new(EventKind::Push, "main", ["anything.txt"])));
        assert!(set.matches(&Event::new(EventKind::Push, "main", Vec::<String>::new())));
    }

    #[test]
    fn test_branch_glob_patterns() {
        let rule = TriggerRule::new(
            EventKind::Push,
            vec!["release/**".to_string()],
            vec![],
        );
        let set = TriggerSet::compile(&[rule]).unwrap();
        assert!(set.matches(&Event::new(EventKind::Push, "release/1.2", ["x"])));
        assert!(!set.matches(&Event::new(EventKind::Push, "main", ["x"])));
    }

    #[test]
    fn test_any_rule_matching_is_enough() {
        let rules = vec![
            quality_rule(EventKind::Push),
            TriggerRule::new(EventKind::Push, vec!["docs".to_string()], vec![]),
        ];
        let set = TriggerSet::compile(&rules).unwrap();
        assert!(set.matches(&Event::new(EventKind::Push, "docs", ["README.md"])));
    }

    #[test]
    fn test_empty_set_matches_nothing() {
        let set = TriggerSet::compile(&[]).unwrap();
        assert!(set.is_empty());
        assert!(!set.matches(&Event::new(EventKind::Push, "main", ["Cargo.toml"])));
    }

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(normalize_pattern("**.rs"), "*.rs");
        assert_eq!(normalize_pattern("Cargo.toml"), "Cargo.toml");
        assert_eq!(normalize_pattern("release/**"), "release/**");
        assert_eq!(normalize_pattern("**/fixtures"), "**/fixtures");
        assert_eq!(normalize_pattern("src/**/gen*.rs"), "src/**/gen*.rs");
        assert_eq!(normalize_pattern("foo**bar"), "foo*bar");
    }
}
