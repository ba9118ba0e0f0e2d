use crate::function::Function;
use crate::instructions::{Instruction, Opcode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One translation unit (or a linked set of them) in memory.
///
/// Functions are kept in definition order; every analysis walks them in this order, and the
/// text rewriter relies on it matching the order of `define` lines in the source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub source_name: Option<String>,
    pub functions: IndexMap<String, Function>,
    pub globals: Vec<String>,
    pub declarations: Vec<String>,
}

impl Module {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn with_function(mut self, function: Function) -> Self {
        self.add_function(function);
        self
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    /// `(function, instruction)` pairs in program order.
    pub fn instructions(&self) -> impl Iterator<Item = (&Function, &Instruction)> {
        self.functions
            .values()
            .flat_map(|function| function.instructions().map(move |inst| (function, inst)))
    }

    pub fn block_count(&self) -> usize {
        self.functions.values().map(|f| f.blocks.len()).sum()
    }

    pub fn instruction_count(&self) -> usize {
        self.functions.values().map(Function::instruction_count).sum()
    }

    /// Instruction counts keyed by mnemonic, sorted by mnemonic.
    pub fn opcode_histogram(&self) -> IndexMap<String, usize> {
        let mut counts: IndexMap<String, usize> = IndexMap::new();
        for (_, inst) in self.instructions() {
            *counts.entry(inst.opcode.mnemonic().to_string()).or_default() += 1;
        }
        counts.sort_keys();
        counts
    }

    pub fn instructions_of(&self, opcode: &Opcode) -> Vec<&Instruction> {
        self.instructions()
            .filter(|(_, inst)| &inst.opcode == opcode)
            .map(|(_, inst)| inst)
            .collect()
    }

    /// How many times `callee` is called directly anywhere in the module.
    pub fn count_calls_to(&self, callee: &str) -> usize {
        self.instructions()
            .filter(|(_, inst)| inst.opcode.is_call())
            .filter(|(_, inst)| inst.callee.as_ref().and_then(|c| c.direct_name()) == Some(callee))
            .count()
    }
}
