/*! Decide which sanitizer checks are redundant.
 *
 * A check can go only if an earlier check already covers a location that no store ever touches.
 * These passes derive pointer relationships from a single walk over the IR, collect the sanitizer
 * calls, attach alias information to every check operand, and pick the checks that can be removed
 * from the text.
 */

pub mod alias;
pub mod call_graph;
pub mod context;
pub mod dependency;
pub mod redundancy;
pub mod rewrite;
pub mod sanitizer;
pub mod strategy;
pub mod visitor;

pub use alias::{DerivationGraph, PointerNode};
pub use call_graph::{
    build_reverse_call_graph, collect_function_summaries, propagate_globals, CallGraph,
    FunctionSummary,
};
pub use context::AnalysisContext;
pub use dependency::{CheckReport, CheckSubgraph, OperandInfo, OperandReport, SubgraphBuilder};
pub use redundancy::{
    remove_checks, GlobalEffectsGuard, MarkingPolicy, Optimized, RedundancyAnalyzer, RedundancyGuard,
};
pub use rewrite::{defined_function, rewrite_ir_text, RewriteOutcome};
pub use sanitizer::{find_sanitizer_calls, CheckKey, SanitizerCall, SanitizerKind};
pub use strategy::{bounded_removal, select_redundant_keys, CheckNode, RemovalStrategy};
pub use visitor::{walk_module, InstructionVisitor};
