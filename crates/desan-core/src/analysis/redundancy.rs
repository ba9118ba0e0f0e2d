use super::call_graph::propagate_globals;
use super::context::AnalysisContext;
use super::dependency::{CheckSubgraph, SubgraphBuilder};
use super::rewrite::rewrite_ir_text;
use super::sanitizer::{CheckKey, SanitizerCall};
use super::strategy::RemovalStrategy;
use crate::{module::Module, AnalysisError, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// How a check that is already redundant participates in later decisions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkingPolicy {
    /// A redundant check may still justify removing later ones.
    #[default]
    Transitive,
    /// Only checks that stay in the program justify removals.
    StrictPairwise,
}

impl fmt::Display for MarkingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkingPolicy::Transitive => f.write_str("transitive"),
            MarkingPolicy::StrictPairwise => f.write_str("strict-pairwise"),
        }
    }
}

/// A veto over candidate pairs that the alias test alone would accept.
pub trait RedundancyGuard {
    fn allows(&self, a: &CheckSubgraph, b: &CheckSubgraph) -> bool;
}

/// Rejects pairs spanning two functions when either one touches global state, directly or
/// through its direct callees.
#[derive(Debug, Clone, Default)]
pub struct GlobalEffectsGuard {
    touches_globals: IndexMap<String, bool>,
}

impl GlobalEffectsGuard {
    pub fn from_module(module: &Module) -> Self {
        Self {
            touches_globals: propagate_globals(module),
        }
    }

    pub fn touches_globals(&self, function: &str) -> bool {
        self.touches_globals.get(function).copied().unwrap_or(false)
    }
}

impl RedundancyGuard for GlobalEffectsGuard {
    fn allows(&self, a: &CheckSubgraph, b: &CheckSubgraph) -> bool {
        a.function == b.function
            || !(self.touches_globals(&a.function) || self.touches_globals(&b.function))
    }
}

/// Everything one optimisation run produced.
#[derive(Debug)]
pub struct Optimized {
    pub text: String,
    pub redundant: IndexSet<CheckKey>,
    pub subgraphs: IndexMap<CheckKey, CheckSubgraph>,
    pub context: AnalysisContext,
}

#[derive(Default)]
pub struct RedundancyAnalyzer {
    policy: MarkingPolicy,
    strategy: RemovalStrategy,
    guard: Option<Box<dyn RedundancyGuard>>,
}

impl RedundancyAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: MarkingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_strategy(mut self, strategy: RemovalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_guard(mut self, guard: impl RedundancyGuard + 'static) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }

    pub fn policy(&self) -> MarkingPolicy {
        self.policy
    }

    pub fn strategy(&self) -> RemovalStrategy {
        self.strategy
    }

    /// `b` is redundant given `a`: no operand of either may reach a written value, and some
    /// operand alias sets must intersect.
    pub fn is_redundant_pair(&self, a: &CheckSubgraph, b: &CheckSubgraph) -> bool {
        if a.has_write_alias() || b.has_write_alias() {
            return false;
        }
        if !a.overlaps(b) {
            return false;
        }
        self.guard.as_ref().map_or(true, |guard| guard.allows(a, b))
    }

    /// Redundant keys in extraction order. Pairs are taken across the whole module.
    pub fn analyze(&self, subgraphs: &IndexMap<CheckKey, CheckSubgraph>) -> IndexSet<CheckKey> {
        let entries: Vec<(&CheckKey, &CheckSubgraph)> = subgraphs.iter().collect();
        let mut redundant: IndexSet<CheckKey> = IndexSet::new();
        for (i, (key_a, a)) in entries.iter().enumerate() {
            if self.policy == MarkingPolicy::StrictPairwise && redundant.contains(*key_a) {
                continue;
            }
            for (key_b, b) in &entries[i + 1..] {
                if redundant.contains(*key_b) {
                    continue;
                }
                if self.is_redundant_pair(a, b) {
                    debug!(kept = %key_a, removed = %key_b, "redundant pair");
                    redundant.insert((*key_b).clone());
                }
            }
        }
        subgraphs
            .keys()
            .filter(|key| redundant.contains(*key))
            .cloned()
            .collect()
    }

    /// Analysis followed by the configured removal strategy.
    pub fn select(&self, subgraphs: &IndexMap<CheckKey, CheckSubgraph>) -> IndexSet<CheckKey> {
        let redundant = self.analyze(subgraphs);
        let selected = self.strategy.apply(redundant, subgraphs);
        info!(
            checks = subgraphs.len(),
            removed = selected.len(),
            policy = %self.policy,
            "redundancy analysis finished"
        );
        selected
    }

    /// Analyse `module` and drop its redundant checks from `text`, the source it was parsed from.
    pub fn optimize_ir_text(&self, module: &Module, text: &str) -> Result<Optimized> {
        let mut context = AnalysisContext::new();
        let builder = SubgraphBuilder::new(module, &mut context);
        let subgraphs = builder.build_all(&mut context);
        let redundant = self.select(&subgraphs);
        let text = remove_checks(text, &redundant, builder.calls())?;
        Ok(Optimized {
            text,
            redundant,
            subgraphs,
            context,
        })
    }
}

/// Rewrite `text` without the `redundant` checks, failing when the lines the rewriter recognises
/// disagree with the extracted `calls`.
pub fn remove_checks(
    text: &str,
    redundant: &IndexSet<CheckKey>,
    calls: &[SanitizerCall],
) -> Result<String> {
    let outcome = rewrite_ir_text(text, redundant);

    let mut extracted: IndexMap<&str, usize> = IndexMap::new();
    for call in calls {
        *extracted.entry(call.function.as_str()).or_insert(0) += 1;
    }
    for (function, &seen) in &outcome.seen_per_function {
        let expected = extracted.get(function.as_str()).copied().unwrap_or(0);
        if seen != expected {
            return Err(AnalysisError::OrdinalMismatch {
                function: function.clone(),
                seen,
                extracted: expected,
            });
        }
    }
    for (function, &count) in &extracted {
        if !outcome.seen_per_function.contains_key(*function) {
            return Err(AnalysisError::OrdinalMismatch {
                function: function.to_string(),
                seen: 0,
                extracted: count,
            });
        }
    }

    if outcome.removed.len() != redundant.len() {
        return Err(AnalysisError::RewriteMismatch {
            expected: redundant.len(),
            removed: outcome.removed.len(),
        });
    }
    Ok(outcome.text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dependency::OperandInfo;
    use crate::symbols::Symbol;
    use crate::{
        block::BasicBlock,
        function::Function,
        instructions::{Callee, Instruction},
        values::Value,
    };
    use pretty_assertions::assert_eq;

    fn subgraph(function: &str, sets: &[&[u32]], is_write: bool) -> CheckSubgraph {
        CheckSubgraph {
            function: function.to_string(),
            callee: "@__asan_load8".to_string(),
            operands: (0..sets.len()).map(|i| format!("%op{i}")).collect(),
            details: sets
                .iter()
                .enumerate()
                .map(|(i, set)| {
                    let info = OperandInfo {
                        is_write,
                        alias_set: set.iter().map(|s| Symbol(*s)).collect(),
                    };
                    (format!("%op{i}"), info)
                })
                .collect(),
        }
    }

    fn map(entries: Vec<CheckSubgraph>) -> IndexMap<CheckKey, CheckSubgraph> {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, sg)| (CheckKey::new(sg.function.clone(), i), sg))
            .collect()
    }

    fn keys(set: &IndexSet<CheckKey>) -> Vec<String> {
        set.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_pair_requires_overlap_and_no_writes() {
        let analyzer = RedundancyAnalyzer::new();
        let a = subgraph("@f", &[&[1, 2]], false);
        let b = subgraph("@f", &[&[2]], false);
        let c = subgraph("@f", &[&[3]], false);
        let w = subgraph("@f", &[&[2]], true);
        assert!(analyzer.is_redundant_pair(&a, &b));
        assert!(!analyzer.is_redundant_pair(&a, &c));
        assert!(!analyzer.is_redundant_pair(&a, &w));
        assert!(!analyzer.is_redundant_pair(&w, &b));
    }

    #[test]
    fn test_policies_differ_on_a_chain() {
        // Only the middle check overlaps both ends.
        let subgraphs = map(vec![
            subgraph("@f", &[&[1]], false),
            subgraph("@f", &[&[1, 2]], false),
            subgraph("@f", &[&[2]], false),
        ]);
        let transitive = RedundancyAnalyzer::new().analyze(&subgraphs);
        assert_eq!(keys(&transitive), vec!["@f:call1", "@f:call2"]);

        let strict = RedundancyAnalyzer::new()
            .with_policy(MarkingPolicy::StrictPairwise)
            .analyze(&subgraphs);
        assert_eq!(keys(&strict), vec!["@f:call1"]);
    }

    #[test]
    fn test_empty_input() {
        assert!(RedundancyAnalyzer::new().analyze(&IndexMap::new()).is_empty());
    }

    struct DenyAll;

    impl RedundancyGuard for DenyAll {
        fn allows(&self, _a: &CheckSubgraph, _b: &CheckSubgraph) -> bool {
            false
        }
    }

    #[test]
    fn test_guard_vetoes_pairs() {
        let subgraphs = map(vec![
            subgraph("@f", &[&[1]], false),
            subgraph("@f", &[&[1]], false),
        ]);
        assert!(RedundancyAnalyzer::new()
            .with_guard(DenyAll)
            .analyze(&subgraphs)
            .is_empty());
    }

    fn global_module() -> Module {
        let check = |f: &str| {
            Function::new(f).with_block(BasicBlock::new("entry").with_instructions(vec![
                Instruction::call(
                    Callee::Direct("@__asan_load4".into()),
                    vec![Value::Global("@buf".into())],
                ),
                Instruction::load(Value::Local("%v".into()), Value::Global("@buf".into())),
            ]))
        };
        Module::new().with_function(check("@f")).with_function(check("@g"))
    }

    #[test]
    fn test_global_effects_guard() {
        let module = global_module();
        let guard = GlobalEffectsGuard::from_module(&module);
        assert!(guard.touches_globals("@f"));
        assert!(!guard.touches_globals("@missing"));

        let a = subgraph("@f", &[&[1]], false);
        let same = subgraph("@f", &[&[1]], false);
        let other = subgraph("@g", &[&[1]], false);
        assert!(guard.allows(&a, &same));
        assert!(!guard.allows(&a, &other));
    }

    const TEXT: &str = "\
@buf = global [8 x i8] zeroinitializer
define void @f() {
  call void @__asan_load4(ptr @buf)
  %v = load i8, ptr @buf
}
define void @g() {
  call void @__asan_load4(ptr @buf)
  %v = load i8, ptr @buf
}
";

    #[test]
    fn test_optimize_across_functions() {
        let module = global_module();
        let optimized = RedundancyAnalyzer::new()
            .optimize_ir_text(&module, TEXT)
            .unwrap();
        assert_eq!(keys(&optimized.redundant), vec!["@g:call0"]);
        assert_eq!(optimized.text.matches("@__asan_load4").count(), 1);
        assert_eq!(optimized.subgraphs.len(), 2);

        let guarded = RedundancyAnalyzer::new()
            .with_guard(GlobalEffectsGuard::from_module(&module))
            .optimize_ir_text(&module, TEXT)
            .unwrap();
        assert!(guarded.redundant.is_empty());
        assert_eq!(guarded.text, TEXT);
    }

    #[test]
    fn test_mismatched_text_is_rejected() {
        let module = global_module();
        let text = TEXT.replace("define void @g() {\n  call void @__asan_load4(ptr @buf)\n", "define void @g() {\n");
        let err = RedundancyAnalyzer::new()
            .optimize_ir_text(&module, &text)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::OrdinalMismatch { ref function, seen: 0, extracted: 1 } if function == "@g"
        ));
    }

    #[test]
    fn test_removed_count_must_match() {
        let calls = vec![SanitizerCall {
            function: "@f".into(),
            ordinal: 0,
            callee: "@__asan_load4".into(),
            operands: vec![],
            line: 3,
        }];
        let redundant: IndexSet<CheckKey> = [CheckKey::new("@f", 5)].into_iter().collect();
        let err = remove_checks("define void @f() {\n  call void @__asan_load4()\n}\n", &redundant, &calls)
            .unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::RewriteMismatch { expected: 1, removed: 0 }
        ));
    }

    #[test]
    fn test_policy_display_and_serde() {
        assert_eq!(MarkingPolicy::StrictPairwise.to_string(), "strict-pairwise");
        let policy: MarkingPolicy = serde_json::from_str("\"strict-pairwise\"").unwrap();
        assert_eq!(policy, MarkingPolicy::StrictPairwise);
    }
}
