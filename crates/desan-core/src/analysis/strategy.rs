//! Cost-based ranking of removal candidates.
//!
//! The analyzer's default decision removes every redundant check. Ranking lets a caller remove
//! only the most valuable ones: expensive runtimes first, then checks whose operands overlap many
//! others.

use super::dependency::CheckSubgraph;
use super::sanitizer::{CheckKey, SanitizerKind};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckNode {
    pub key: CheckKey,
    pub subgraph: CheckSubgraph,
    pub cost: u32,
    pub overlap_count: usize,
    /// Optional block or instruction distance from the function entry.
    pub distance: Option<usize>,
}

impl CheckNode {
    pub fn new(key: CheckKey, subgraph: CheckSubgraph) -> Self {
        let cost = cost_for(subgraph.kind());
        Self {
            key,
            subgraph,
            cost,
            overlap_count: 0,
            distance: None,
        }
    }

    pub fn with_distance(mut self, distance: usize) -> Self {
        self.distance = Some(distance);
        self
    }

    /// Higher is a better removal candidate.
    pub fn score(&self) -> f64 {
        let mut score = self.cost as f64 + self.overlap_count as f64;
        if let Some(distance) = self.distance {
            score += 1.0 / (1.0 + distance as f64);
        }
        score
    }
}

/// Relative runtime cost of one check.
pub fn cost_for(kind: Option<SanitizerKind>) -> u32 {
    match kind {
        Some(SanitizerKind::Memory) => 3,
        Some(SanitizerKind::Address | SanitizerKind::Thread | SanitizerKind::Leak) => 2,
        Some(SanitizerKind::UndefinedBehavior) | None => 1,
    }
}

pub fn wrap_subgraphs(subgraphs: &IndexMap<CheckKey, CheckSubgraph>) -> Vec<CheckNode> {
    subgraphs
        .iter()
        .map(|(key, sg)| CheckNode::new(key.clone(), sg.clone()))
        .collect()
}

/// For every pair of nodes, add the number of intersecting operand pairs to both.
pub fn compute_overlap_counts(nodes: &mut [CheckNode]) {
    for i in 0..nodes.len() {
        for j in i + 1..nodes.len() {
            let overlaps = nodes[i].subgraph.overlap_count(&nodes[j].subgraph);
            if overlaps > 0 {
                nodes[i].overlap_count += overlaps;
                nodes[j].overlap_count += overlaps;
            }
        }
    }
}

/// `(key, score)` from highest to lowest score; ties keep extraction order.
pub fn rank_nodes(nodes: &mut [CheckNode]) -> Vec<(CheckKey, f64)> {
    compute_overlap_counts(nodes);
    let mut scores: Vec<(CheckKey, f64)> = nodes
        .iter()
        .map(|node| (node.key.clone(), node.score()))
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scores
}

/// Keys of checks with no write-aliased operand, best candidates first.
///
/// Overlap counts are computed among the candidates only.
pub fn select_redundant_keys(subgraphs: &IndexMap<CheckKey, CheckSubgraph>) -> Vec<CheckKey> {
    let mut candidates: Vec<CheckNode> = wrap_subgraphs(subgraphs)
        .into_iter()
        .filter(|node| !node.subgraph.has_write_alias())
        .collect();
    rank_nodes(&mut candidates)
        .into_iter()
        .map(|(key, _)| key)
        .collect()
}

/// The ranked keys that the analyzer also found redundant, at most `limit` of them.
pub fn bounded_removal(
    redundant: &IndexSet<CheckKey>,
    ranked: &[CheckKey],
    limit: usize,
) -> IndexSet<CheckKey> {
    ranked
        .iter()
        .filter(|key| redundant.contains(*key))
        .take(limit)
        .cloned()
        .collect()
}

/// How many of the redundant checks actually get removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RemovalStrategy {
    #[default]
    All,
    Ranked { limit: usize },
}

impl RemovalStrategy {
    pub fn apply(
        &self,
        redundant: IndexSet<CheckKey>,
        subgraphs: &IndexMap<CheckKey, CheckSubgraph>,
    ) -> IndexSet<CheckKey> {
        match self {
            RemovalStrategy::All => redundant,
            RemovalStrategy::Ranked { limit } => {
                let ranked = select_redundant_keys(subgraphs);
                let selected = bounded_removal(&redundant, &ranked, *limit);
                debug!(
                    redundant = redundant.len(),
                    selected = selected.len(),
                    limit,
                    "bounded removal"
                );
                selected
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dependency::OperandInfo;
    use crate::symbols::Symbol;
    use pretty_assertions::assert_eq;

    fn subgraph(function: &str, callee: &str, ops: &[(&str, &[u32], bool)]) -> CheckSubgraph {
        CheckSubgraph {
            function: function.to_string(),
            callee: callee.to_string(),
            operands: ops.iter().map(|(name, _, _)| name.to_string()).collect(),
            details: ops
                .iter()
                .map(|(name, set, is_write)| {
                    let info = OperandInfo {
                        is_write: *is_write,
                        alias_set: set.iter().map(|s| Symbol(*s)).collect(),
                    };
                    (name.to_string(), info)
                })
                .collect(),
        }
    }

    fn subgraphs() -> IndexMap<CheckKey, CheckSubgraph> {
        let mut map = IndexMap::new();
        map.insert(
            CheckKey::new("@f", 0),
            subgraph("@f", "@__ubsan_handle_x", &[("%a", &[1], false)]),
        );
        map.insert(
            CheckKey::new("@f", 1),
            subgraph("@f", "@__asan_load8", &[("%b", &[1, 2], false)]),
        );
        map.insert(
            CheckKey::new("@f", 2),
            subgraph("@f", "@__msan_check", &[("%c", &[2], true)]),
        );
        map.insert(
            CheckKey::new("@f", 3),
            subgraph("@f", "@__asan_load8", &[("%d", &[9], false)]),
        );
        map
    }

    #[test]
    fn test_costs() {
        assert_eq!(cost_for(Some(SanitizerKind::Memory)), 3);
        assert_eq!(cost_for(Some(SanitizerKind::Leak)), 2);
        assert_eq!(cost_for(Some(SanitizerKind::UndefinedBehavior)), 1);
        assert_eq!(cost_for(None), 1);
    }

    #[test]
    fn test_overlap_counts_are_symmetric() {
        let mut nodes = wrap_subgraphs(&subgraphs());
        compute_overlap_counts(&mut nodes);
        let counts: Vec<usize> = nodes.iter().map(|n| n.overlap_count).collect();
        assert_eq!(counts, vec![1, 2, 1, 0]);
    }

    #[test]
    fn test_ranking_is_descending_and_stable() {
        let mut nodes = wrap_subgraphs(&subgraphs());
        let ranked = rank_nodes(&mut nodes);
        let scores: Vec<f64> = ranked.iter().map(|(_, s)| *s).collect();
        assert_eq!(scores, vec![4.0, 4.0, 2.0, 2.0]);
        assert_eq!(ranked[0].0, CheckKey::new("@f", 1));
        assert_eq!(ranked[1].0, CheckKey::new("@f", 2));
        assert_eq!(ranked[2].0, CheckKey::new("@f", 0));
    }

    #[test]
    fn test_selection_skips_written_checks() {
        let keys = select_redundant_keys(&subgraphs());
        assert_eq!(
            keys,
            vec![
                CheckKey::new("@f", 1),
                CheckKey::new("@f", 0),
                CheckKey::new("@f", 3)
            ]
        );
    }

    #[test]
    fn test_bounded_removal_intersects_and_truncates() {
        let redundant: IndexSet<CheckKey> =
            [CheckKey::new("@f", 1), CheckKey::new("@f", 0)].into_iter().collect();
        let ranked = select_redundant_keys(&subgraphs());
        let chosen = bounded_removal(&redundant, &ranked, 1);
        assert_eq!(chosen.into_iter().collect::<Vec<_>>(), vec![CheckKey::new("@f", 1)]);

        let all = RemovalStrategy::Ranked { limit: 10 }.apply(redundant.clone(), &subgraphs());
        assert_eq!(all.len(), 2);
        assert_eq!(RemovalStrategy::All.apply(redundant.clone(), &subgraphs()), redundant);
    }

    #[test]
    fn test_distance_bonus() {
        let key = CheckKey::new("@f", 0);
        let node = CheckNode::new(key, subgraph("@f", "@__asan_x", &[])).with_distance(1);
        assert_eq!(node.score(), 2.5);
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&RemovalStrategy::Ranked { limit: 3 }).unwrap();
        assert_eq!(json, r#"{"mode":"ranked","limit":3}"#);
        let all: RemovalStrategy = serde_json::from_str(r#"{"mode":"all"}"#).unwrap();
        assert_eq!(all, RemovalStrategy::All);
    }
}
