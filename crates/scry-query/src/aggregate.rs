//! Per-file grouping of a ranked hit list.
//!
//! Every file keeps a single representative hit, chosen greedily in one pass,
//! and lands in one [`Tier`]. Groups are ordered by tier first and penalized
//! effective score second; ties keep retrieval order.

use scry_core::constants::{DEFAULT_GRAPH_ONLY_PENALTY, DEFAULT_SINGLE_SIGNAL_PENALTY};
use scry_core::types::{FileGroup, SearchResult, SymbolKind, Tier};
use std::collections::{BTreeSet, HashMap};

/// Classification tables for representative choice and tiering.
#[derive(Debug, Clone, PartialEq)]
pub struct TierRules {
    /// Kinds preferred as a file's representative.
    pub specific_kinds: Vec<SymbolKind>,
    /// Names that lose to any other specific-kind name.
    pub generic_names: Vec<String>,
    /// A file whose members are all of these kinds is low value.
    pub low_value_kinds: Vec<SymbolKind>,
    /// Re-export files, always low value.
    pub init_file_suffix: String,
    /// Path segments that mark test code.
    pub test_markers: Vec<String>,
    pub test_segment_prefix: String,
    pub test_file_suffix: String,
}

impl Default for TierRules {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            specific_kinds: vec![SymbolKind::Function, SymbolKind::Method],
            generic_names: strings(&["__call__", "__init__", "__new__", "__enter__", "__exit__"]),
            low_value_kinds: vec![SymbolKind::Constant, SymbolKind::Variable, SymbolKind::Module],
            init_file_suffix: "__init__.py".to_string(),
            test_markers: strings(&["test", "tests", "test_", "_test", "spec", "specs", "__tests__"]),
            test_segment_prefix: "test_".to_string(),
            test_file_suffix: "_test.py".to_string(),
        }
    }
}

impl TierRules {
    fn is_specific(&self, kind: SymbolKind) -> bool {
        self.specific_kinds.contains(&kind)
    }

    fn is_generic_name(&self, name: &str) -> bool {
        self.generic_names.iter().any(|generic| generic == name)
    }

    fn is_low_value(&self, kind: SymbolKind) -> bool {
        self.low_value_kinds.contains(&kind)
    }

    /// A path segment equals a test marker, starts with `test_`, or the file ends in `_test.py`.
    /// Backslashes count as separators and matching ignores case.
    pub fn is_test_path(&self, path: &str) -> bool {
        let normalized = path.replace('\\', "/").to_lowercase();
        normalized.split('/').any(|segment| {
            self.test_markers.iter().any(|marker| marker == segment)
                || segment.starts_with(&self.test_segment_prefix)
                || segment.ends_with(&self.test_file_suffix)
        })
    }

    /// Replace-if-better: a specific kind beats any other kind, and among specific
    /// kinds a real name beats a generic one.
    fn should_replace(&self, current: &SearchResult, candidate: &SearchResult) -> bool {
        if !self.is_specific(candidate.kind) {
            return false;
        }
        if !self.is_specific(current.kind) {
            return true;
        }
        self.is_generic_name(&current.name) && !self.is_generic_name(&candidate.name)
    }

    fn classify(&self, file_path: &str, members: &[SearchResult]) -> Tier {
        let all_low_value = members.iter().all(|member| self.is_low_value(member.kind));
        if all_low_value || file_path.ends_with(&self.init_file_suffix) {
            Tier::LowValue
        } else if self.is_test_path(file_path) {
            Tier::Test
        } else {
            Tier::Source
        }
    }
}

/// Multipliers applied to a hit's effective score when grouping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScorePenalties {
    /// Every signal is a graph-expansion marker.
    pub graph_only: f64,
    /// Exactly one distinct signal.
    pub single_signal: f64,
}

impl Default for ScorePenalties {
    fn default() -> Self {
        Self {
            graph_only: DEFAULT_GRAPH_ONLY_PENALTY,
            single_signal: DEFAULT_SINGLE_SIGNAL_PENALTY,
        }
    }
}

impl ScorePenalties {
    pub fn apply(&self, result: &SearchResult) -> f64 {
        let base = result.effective_score();
        if result.is_graph_only() {
            base * self.graph_only
        } else if result.distinct_signal_count() == 1 {
            base * self.single_signal
        } else {
            base
        }
    }
}

/// Default-rules test path check.
pub fn is_test_file(path: &str) -> bool {
    TierRules::default().is_test_path(path)
}

struct PendingGroup {
    members: Vec<SearchResult>,
    representative: usize,
}

pub fn aggregate_by_file(
    results: Vec<SearchResult>,
    rules: &TierRules,
    penalties: &ScorePenalties,
) -> Vec<FileGroup> {
    let mut order: Vec<String> = Vec::new();
    let mut pending: HashMap<String, PendingGroup> = HashMap::new();

    for result in results {
        match pending.get_mut(&result.file_path) {
            Some(group) => {
                if rules.should_replace(&group.members[group.representative], &result) {
                    group.representative = group.members.len();
                }
                group.members.push(result);
            }
            None => {
                order.push(result.file_path.clone());
                pending.insert(
                    result.file_path.clone(),
                    PendingGroup {
                        members: vec![result],
                        representative: 0,
                    },
                );
            }
        }
    }

    let mut groups: Vec<FileGroup> = order
        .into_iter()
        .filter_map(|file_path| {
            let PendingGroup {
                mut members,
                representative,
            } = pending.remove(&file_path)?;
            let tier = rules.classify(&file_path, &members);
            let signals: BTreeSet<_> = members
                .iter()
                .flat_map(|member| member.match_signals.iter().copied())
                .collect();
            let rep = members.remove(representative);
            let effective_score = penalties.apply(&rep);
            members.insert(0, rep);
            Some(FileGroup {
                file_path,
                results: members,
                effective_score,
                tier,
                signals,
            })
        })
        .collect();

    groups.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| b.effective_score.total_cmp(&a.effective_score))
    });
    groups
}

/// Each group's representative, in group order.
pub fn flatten_representatives(groups: Vec<FileGroup>) -> Vec<SearchResult> {
    groups
        .into_iter()
        .filter_map(|group| group.results.into_iter().next())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scry_core::types::MatchSignal;

    fn hit(file: &str, name: &str, kind: SymbolKind, score: f64, signals: &[MatchSignal]) -> SearchResult {
        SearchResult {
            symbol_id: format!("{file}::{name}"),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind,
            file_path: file.to_string(),
            line_start: 1,
            line_end: 2,
            score,
            rerank_score: None,
            match_signals: signals.to_vec(),
            snippet: None,
            related_symbols: Vec::new(),
            chunk_info: None,
        }
    }

    const BOTH: &[MatchSignal] = &[MatchSignal::Bm25, MatchSignal::Vector];

    fn aggregate(results: Vec<SearchResult>) -> Vec<FileGroup> {
        aggregate_by_file(results, &TierRules::default(), &ScorePenalties::default())
    }

    #[test]
    fn function_replaces_class_and_named_method_replaces_dunder() {
        let groups = aggregate(vec![
            hit("a.py", "Parser", SymbolKind::Class, 0.9, BOTH),
            hit("a.py", "__init__", SymbolKind::Method, 0.8, BOTH),
            hit("a.py", "feed", SymbolKind::Method, 0.5, BOTH),
            hit("a.py", "close", SymbolKind::Method, 0.7, BOTH),
        ]);
        assert_eq!(groups.len(), 1);
        let rep = groups[0].representative().unwrap();
        assert_eq!(rep.name, "feed");
        assert_eq!(groups[0].effective_score, 0.5);
        assert_eq!(groups[0].results.len(), 4);
        assert_eq!(groups[0].results[1].name, "Parser");
    }

    #[test]
    fn class_is_kept_when_no_specific_kind_appears() {
        let groups = aggregate(vec![
            hit("b.py", "Config", SymbolKind::Class, 0.4, BOTH),
            hit("b.py", "Other", SymbolKind::Struct, 0.9, BOTH),
        ]);
        assert_eq!(groups[0].representative().unwrap().name, "Config");
    }

    #[test]
    fn tiers_order_source_then_test_then_low_value() {
        let groups = aggregate(vec![
            hit("pkg/consts.py", "LIMIT", SymbolKind::Constant, 0.99, BOTH),
            hit("tests/test_parser.py", "test_parse", SymbolKind::Function, 0.95, BOTH),
            hit("pkg/__init__.py", "setup", SymbolKind::Function, 0.9, BOTH),
            hit("pkg/parser.py", "parse", SymbolKind::Function, 0.1, BOTH),
        ]);
        let files: Vec<_> = groups.iter().map(|g| g.file_path.as_str()).collect();
        assert_eq!(
            files,
            vec!["pkg/parser.py", "tests/test_parser.py", "pkg/consts.py", "pkg/__init__.py"]
        );
        let tiers: Vec<_> = groups.iter().map(|g| g.tier).collect();
        assert_eq!(tiers, vec![Tier::Source, Tier::Test, Tier::LowValue, Tier::LowValue]);
    }

    #[test]
    fn mixed_low_value_file_is_not_demoted() {
        let groups = aggregate(vec![
            hit("cfg.py", "DEFAULTS", SymbolKind::Constant, 0.9, BOTH),
            hit("cfg.py", "load", SymbolKind::Function, 0.3, BOTH),
        ]);
        assert_eq!(groups[0].tier, Tier::Source);
    }

    #[test]
    fn penalties_and_signal_union() {
        let groups = aggregate(vec![
            hit("g.py", "walk", SymbolKind::Function, 1.0, &[MatchSignal::GraphCallers]),
            hit("s.py", "one", SymbolKind::Function, 1.0, &[MatchSignal::Bm25]),
            hit("m.py", "many", SymbolKind::Function, 1.0, BOTH),
            hit("m.py", "other", SymbolKind::Method, 0.2, &[MatchSignal::Exact]),
        ]);
        let by_file: HashMap<_, _> = groups.iter().map(|g| (g.file_path.as_str(), g)).collect();
        assert!((by_file["g.py"].effective_score - 0.7).abs() < 1e-12);
        assert!((by_file["s.py"].effective_score - 0.85).abs() < 1e-12);
        assert_eq!(by_file["m.py"].effective_score, 1.0);
        assert_eq!(
            by_file["m.py"].signals,
            BTreeSet::from([MatchSignal::Bm25, MatchSignal::Vector, MatchSignal::Exact])
        );
        let files: Vec<_> = groups.iter().map(|g| g.file_path.as_str()).collect();
        assert_eq!(files, vec!["m.py", "s.py", "g.py"]);
    }

    #[test]
    fn rerank_score_drives_group_score() {
        let mut reranked = hit("r.py", "f", SymbolKind::Function, 0.1, BOTH);
        reranked.rerank_score = Some(4.0);
        let groups = aggregate(vec![hit("q.py", "g", SymbolKind::Function, 3.0, BOTH), reranked]);
        assert_eq!(groups[0].file_path, "r.py");
    }

    #[test]
    fn equal_scores_keep_first_seen_order() {
        let groups = aggregate(vec![
            hit("z.py", "a", SymbolKind::Function, 0.5, BOTH),
            hit("a.py", "b", SymbolKind::Function, 0.5, BOTH),
            hit("m.py", "c", SymbolKind::Function, 0.5, BOTH),
        ]);
        let reps: Vec<_> = flatten_representatives(groups)
            .into_iter()
            .map(|r| r.file_path)
            .collect();
        assert_eq!(reps, vec!["z.py", "a.py", "m.py"]);
    }

    #[test]
    fn test_path_heuristic() {
        for path in [
            "tests/unit/parser.py",
            "src/test_utils.py",
            "pkg/parser_test.py",
            "Web\\Specs\\login.js",
            "app/__tests__/view.tsx",
            "TEST/case.py",
        ] {
            assert!(is_test_file(path), "{path}");
        }
        for path in ["src/parser.py", "src/contest/run.py", "src/attest.py", "latest/spec_runner.py"] {
            assert!(!is_test_file(path), "{path}");
        }
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(aggregate(Vec::new()).is_empty());
    }
}
