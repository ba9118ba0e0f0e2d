//! Direct call graph and per-function summaries.
//!
//! Only calls through a named global callee are recorded. Calls through function pointers are
//! invisible here, so the graph under-approximates the real one and "touches globals" can be
//! missed for code reached only indirectly.

use super::visitor::{walk_module, InstructionVisitor};
use crate::{function::Function, instructions::Instruction, module::Module, values::is_global_name};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallGraph {
    calls: IndexMap<String, IndexSet<String>>,
    reverse_calls: IndexMap<String, IndexSet<String>>,
}

impl CallGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(module: &Module) -> Self {
        let mut graph = CallGraph::new();
        for (_, summary) in collect_function_summaries(module) {
            for callee in &summary.called_functions {
                graph.add_call(&summary.name, callee);
            }
        }
        graph
    }

    pub fn add_call(&mut self, caller: &str, callee: &str) {
        self.calls
            .entry(caller.to_string())
            .or_default()
            .insert(callee.to_string());
        self.reverse_calls
            .entry(callee.to_string())
            .or_default()
            .insert(caller.to_string());
    }

    pub fn callees(&self, caller: &str) -> impl Iterator<Item = &String> {
        self.calls.get(caller).into_iter().flatten()
    }

    pub fn callers(&self, callee: &str) -> impl Iterator<Item = &String> {
        self.reverse_calls.get(callee).into_iter().flatten()
    }

    pub fn reverse(&self) -> &IndexMap<String, IndexSet<String>> {
        &self.reverse_calls
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSummary {
    pub name: String,
    pub num_instructions: usize,
    pub num_calls: usize,
    pub num_stores: usize,
    pub num_loads: usize,
    pub uses_globals: bool,
    pub called_functions: IndexSet<String>,
}

impl FunctionSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for FunctionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Function {}: instr={}, calls={}, stores={}, loads={}, globals={}",
            self.name,
            self.num_instructions,
            self.num_calls,
            self.num_stores,
            self.num_loads,
            self.uses_globals
        )
    }
}

#[derive(Default)]
struct SummaryCollector {
    summaries: IndexMap<String, FunctionSummary>,
}

impl SummaryCollector {
    fn current(&mut self, function: &Function) -> &mut FunctionSummary {
        self.summaries
            .entry(function.name.clone())
            .or_insert_with(|| FunctionSummary::new(function.name.clone()))
    }
}

impl InstructionVisitor for SummaryCollector {
    fn enter_function(&mut self, function: &Function) {
        self.current(function);
    }

    fn visit_store(&mut self, function: &Function, inst: &Instruction) {
        let summary = self.current(function);
        summary.num_instructions += 1;
        summary.num_stores += 1;
        if inst.store_destination().is_some_and(|d| is_global_name(d.name())) {
            summary.uses_globals = true;
        }
    }

    fn visit_load(&mut self, function: &Function, inst: &Instruction) {
        let summary = self.current(function);
        summary.num_instructions += 1;
        summary.num_loads += 1;
        if inst.operands.first().is_some_and(|p| is_global_name(p.name())) {
            summary.uses_globals = true;
        }
    }

    fn visit_call(&mut self, function: &Function, inst: &Instruction) {
        let summary = self.current(function);
        summary.num_instructions += 1;
        summary.num_calls += 1;
        if let Some(callee) = inst.callee.as_ref().and_then(|c| c.direct_name()) {
            summary.called_functions.insert(callee.to_string());
        }
    }

    fn visit_default(&mut self, function: &Function, _inst: &Instruction) {
        self.current(function).num_instructions += 1;
    }
}

pub fn collect_function_summaries(module: &Module) -> IndexMap<String, FunctionSummary> {
    let mut collector = SummaryCollector::default();
    walk_module(module, &mut collector);
    collector.summaries
}

/// Callee name to the set of functions calling it directly.
pub fn build_reverse_call_graph(module: &Module) -> IndexMap<String, IndexSet<String>> {
    CallGraph::build(module).reverse_calls
}

/// Whether each function, or anything it transitively calls directly, touches a global.
///
/// Fixed point over the reverse call graph; flags only ever go from false to true.
pub fn propagate_globals(module: &Module) -> IndexMap<String, bool> {
    let summaries = collect_function_summaries(module);
    let reverse = build_reverse_call_graph(module);
    let mut uses: IndexMap<String, bool> = summaries
        .iter()
        .map(|(name, summary)| (name.clone(), summary.uses_globals))
        .collect();

    let mut rounds = 0;
    let mut changed = true;
    while changed {
        changed = false;
        rounds += 1;
        for (callee, callers) in &reverse {
            if !uses.get(callee).copied().unwrap_or(false) {
                continue;
            }
            for caller in callers {
                let flag = uses.entry(caller.clone()).or_insert(false);
                if !*flag {
                    *flag = true;
                    changed = true;
                }
            }
        }
    }
    debug!(rounds, "global usage propagation converged");
    uses
}
