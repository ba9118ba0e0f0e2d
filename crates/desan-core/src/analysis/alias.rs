use super::context::AnalysisContext;
use super::visitor::{walk_module, InstructionVisitor};
use crate::{function::Function, instructions::Instruction, module::Module, symbols::Symbol};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A pointer value in the derivation graph.
///
/// The write tag is part of the identity: `(%p, read)` and `(%p, write)` are distinct nodes, and
/// the write-tagged one exists only when `%p` is the destination of some store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PointerNode {
    pub symbol: Symbol,
    pub is_write: bool,
}

impl PointerNode {
    pub fn read(symbol: Symbol) -> Self {
        Self {
            symbol,
            is_write: false,
        }
    }

    pub fn write(symbol: Symbol) -> Self {
        Self {
            symbol,
            is_write: true,
        }
    }
}

/// Flow-insensitive graph of pointer derivations.
///
/// An edge `src -> dst` means `dst` is computed from `src` by a load, a pointer/integer
/// conversion, or an address computation. Every node referenced by an edge is also a key.
#[derive(Debug, Clone, Default)]
pub struct DerivationGraph {
    edges: IndexMap<PointerNode, IndexSet<PointerNode>>,
}

impl DerivationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// One pass over every instruction of the module.
    pub fn build(module: &Module, ctx: &mut AnalysisContext) -> Self {
        let mut collector = DerivationCollector {
            ctx,
            graph: DerivationGraph::new(),
        };
        walk_module(module, &mut collector);
        let graph = collector.graph;
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "built derivation graph"
        );
        graph
    }

    pub fn add_node(&mut self, node: PointerNode) {
        self.edges.entry(node).or_default();
    }

    pub fn add_edge(&mut self, src: PointerNode, dst: PointerNode) {
        self.add_node(dst);
        self.edges.entry(src).or_default().insert(dst);
    }

    pub fn contains(&self, node: &PointerNode) -> bool {
        self.edges.contains_key(node)
    }

    pub fn successors(&self, node: &PointerNode) -> impl Iterator<Item = &PointerNode> {
        self.edges.get(node).into_iter().flatten()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &PointerNode> {
        self.edges.keys()
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexSet::len).sum()
    }

    /// Forward transitive closure of `node`, including `node` itself.
    ///
    /// Only values derived *from* `node` are reached, never the values it was derived from.
    /// A node that was never inserted yields just itself.
    pub fn get_aliases(&self, node: PointerNode) -> IndexSet<PointerNode> {
        let mut visited = IndexSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for succ in self.successors(&current) {
                if !visited.contains(succ) {
                    stack.push(*succ);
                }
            }
        }
        visited
    }

    /// Symbols reachable from the read node of `symbol`.
    pub fn alias_symbols(&self, symbol: Symbol) -> IndexSet<Symbol> {
        self.get_aliases(PointerNode::read(symbol))
            .into_iter()
            .map(|node| node.symbol)
            .collect()
    }

    /// Direct predecessors of `target`. Not transitive.
    pub fn reverse_aliases(&self, target: PointerNode) -> IndexSet<PointerNode> {
        self.edges
            .iter()
            .filter(|(_, dests)| dests.contains(&target))
            .map(|(src, _)| *src)
            .collect()
    }

    /// Whether `symbol` is ever a store destination.
    pub fn is_written(&self, symbol: Symbol) -> bool {
        self.contains(&PointerNode::write(symbol))
    }

    /// Whether any of `symbols`, or anything derived from them, is ever written.
    pub fn any_write_alias(&self, symbols: impl IntoIterator<Item = Symbol>) -> bool {
        symbols.into_iter().any(|symbol| {
            self.get_aliases(PointerNode::read(symbol))
                .iter()
                .any(|node| node.is_write || self.is_written(node.symbol))
        })
    }

    /// Whether some operand in `a` and some operand in `b` have overlapping alias closures.
    pub fn alias_intersection(&self, a: &[Symbol], b: &[Symbol]) -> bool {
        a.iter().any(|&sa| {
            let set_a = self.alias_symbols(sa);
            b.iter()
                .any(|&sb| !set_a.is_disjoint(&self.alias_symbols(sb)))
        })
    }

    pub fn points_to_sets(&self) -> IndexMap<PointerNode, IndexSet<PointerNode>> {
        self.nodes()
            .map(|node| (*node, self.get_aliases(*node)))
            .collect()
    }

    /// One line per node: `name (R|W) -> [succ, ...]`.
    pub fn render(&self, ctx: &AnalysisContext) -> String {
        self.edges
            .iter()
            .map(|(node, succs)| {
                let names: Vec<String> = succs.iter().map(|s| ctx.name_of(s.symbol)).collect();
                format!(
                    "{} ({}) -> [{}]",
                    ctx.name_of(node.symbol),
                    if node.is_write { "W" } else { "R" },
                    names.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

struct DerivationCollector<'a> {
    ctx: &'a mut AnalysisContext,
    graph: DerivationGraph,
}

impl DerivationCollector<'_> {
    fn add_derivation(&mut self, function: &Function, inst: &Instruction) {
        match (inst.derivation_source(), inst.result.as_ref()) {
            (Some(src), Some(dst)) if !src.is_empty() && !dst.is_empty() => {
                let src = PointerNode::read(self.ctx.intern(&function.name, src));
                let dst = PointerNode::read(self.ctx.intern(&function.name, dst));
                self.graph.add_edge(src, dst);
            }
            _ => debug!(
                function = %function.name,
                line = inst.line,
                opcode = %inst.opcode,
                "derivation without a named source or result, skipped"
            ),
        }
    }
}

impl InstructionVisitor for DerivationCollector<'_> {
    fn visit_store(&mut self, function: &Function, inst: &Instruction) {
        match inst.store_destination() {
            Some(dest) if !dest.is_empty() => {
                let symbol = self.ctx.intern(&function.name, dest);
                self.graph.add_node(PointerNode::write(symbol));
            }
            _ => debug!(
                function = %function.name,
                line = inst.line,
                "store without a named destination, skipped"
            ),
        }
    }

    fn visit_load(&mut self, function: &Function, inst: &Instruction) {
        self.add_derivation(function, inst);
    }

    fn visit_conversion(&mut self, function: &Function, inst: &Instruction) {
        self.add_derivation(function, inst);
    }

    fn visit_gep(&mut self, function: &Function, inst: &Instruction) {
        self.add_derivation(function, inst);
    }
}
