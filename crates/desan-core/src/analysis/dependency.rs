use super::alias::DerivationGraph;
use super::context::AnalysisContext;
use super::sanitizer::{find_sanitizer_calls, CheckKey, SanitizerCall, SanitizerKind};
use crate::{module::Module, symbols::Symbol, values::Value, Result};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Alias information for one operand of a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandInfo {
    /// Some value in `alias_set` is a store destination.
    pub is_write: bool,
    /// Forward alias closure of the operand, the operand included.
    pub alias_set: IndexSet<Symbol>,
}

impl OperandInfo {
    pub fn overlaps(&self, other: &OperandInfo) -> bool {
        !self.alias_set.is_disjoint(&other.alias_set)
    }
}

/// The dependency subgraph of one sanitizer call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSubgraph {
    pub function: String,
    pub callee: String,
    pub operands: Vec<String>,
    pub details: IndexMap<String, OperandInfo>,
}

impl CheckSubgraph {
    pub fn kind(&self) -> Option<SanitizerKind> {
        SanitizerKind::of_callee(&self.callee)
    }

    pub fn has_write_alias(&self) -> bool {
        self.details.values().any(|info| info.is_write)
    }

    /// Number of operand pairs `(a, b)` whose alias sets intersect.
    pub fn overlap_count(&self, other: &CheckSubgraph) -> usize {
        self.details
            .values()
            .map(|a| other.details.values().filter(|b| a.overlaps(b)).count())
            .sum()
    }

    pub fn overlaps(&self, other: &CheckSubgraph) -> bool {
        self.details
            .values()
            .any(|a| other.details.values().any(|b| a.overlaps(b)))
    }

    pub fn to_report(&self, ctx: &AnalysisContext) -> CheckReport {
        CheckReport {
            function: self.function.clone(),
            check: self.callee.clone(),
            operands: self.operands.clone(),
            aliases: self
                .details
                .iter()
                .map(|(op, info)| {
                    let report = OperandReport {
                        is_write: info.is_write,
                        alias_set: info.alias_set.iter().map(|s| ctx.name_of(*s)).collect(),
                    };
                    (op.clone(), report)
                })
                .collect(),
        }
    }
}

/// Serialisable per-check dependency data, names in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub function: String,
    pub check: String,
    pub operands: Vec<String>,
    pub aliases: IndexMap<String, OperandReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperandReport {
    pub is_write: bool,
    pub alias_set: Vec<String>,
}

/// Attaches alias information to every sanitizer call of a module.
pub struct SubgraphBuilder {
    graph: DerivationGraph,
    calls: Vec<SanitizerCall>,
}

impl SubgraphBuilder {
    pub fn new(module: &Module, ctx: &mut AnalysisContext) -> Self {
        let graph = DerivationGraph::build(module, ctx);
        let calls = find_sanitizer_calls(module);
        Self { graph, calls }
    }

    pub fn graph(&self) -> &DerivationGraph {
        &self.graph
    }

    pub fn calls(&self) -> &[SanitizerCall] {
        &self.calls
    }

    pub fn build_for_call(&self, call: &SanitizerCall, ctx: &mut AnalysisContext) -> CheckSubgraph {
        let mut details = IndexMap::new();
        for (index, operand) in call.operands.iter().enumerate() {
            let symbol = self.operand_symbol(call, index, operand, ctx);
            let closure = self.graph.alias_symbols(symbol);
            let is_write = closure.iter().any(|s| self.graph.is_written(*s));
            details.insert(
                operand.name().to_string(),
                OperandInfo {
                    is_write,
                    alias_set: closure,
                },
            );
        }
        CheckSubgraph {
            function: call.function.clone(),
            callee: call.callee.clone(),
            operands: call.operands.iter().map(|op| op.name().to_string()).collect(),
            details,
        }
    }

    /// Operands without a name get a private symbol, so they alias nothing but themselves.
    fn operand_symbol(
        &self,
        call: &SanitizerCall,
        index: usize,
        operand: &Value,
        ctx: &mut AnalysisContext,
    ) -> Symbol {
        if operand.is_empty() {
            debug!(check = %call.key(), index, "unnamed check operand, treated as isolated");
            let placeholder = Value::Local(format!("<unnamed:{}:{}>", call.ordinal, index));
            return ctx.intern(&call.function, &placeholder);
        }
        ctx.intern(&call.function, operand)
    }

    /// One subgraph per call, in extraction order.
    pub fn build_all(&self, ctx: &mut AnalysisContext) -> IndexMap<CheckKey, CheckSubgraph> {
        let subgraphs: IndexMap<CheckKey, CheckSubgraph> = self
            .calls
            .iter()
            .map(|call| (call.key(), self.build_for_call(call, ctx)))
            .collect();
        info!(checks = subgraphs.len(), "built dependency subgraphs");
        subgraphs
    }
}

pub fn summary(subgraphs: &IndexMap<CheckKey, CheckSubgraph>) -> String {
    subgraphs
        .iter()
        .map(|(key, sg)| {
            format!(
                "{}: {} in {} with {} ops",
                key,
                sg.callee,
                sg.function,
                sg.operands.len()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn to_reports(
    subgraphs: &IndexMap<CheckKey, CheckSubgraph>,
    ctx: &AnalysisContext,
) -> IndexMap<String, CheckReport> {
    subgraphs
        .iter()
        .map(|(key, sg)| (key.to_string(), sg.to_report(ctx)))
        .collect()
}

pub fn save_json(
    subgraphs: &IndexMap<CheckKey, CheckSubgraph>,
    ctx: &AnalysisContext,
    path: impl AsRef<Path>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_reports(subgraphs, ctx))?;
    std::fs::write(path, json)?;
    Ok(())
}
