use crate::block::BasicBlock;
use crate::instructions::Instruction;
use crate::values::Value;
use serde::{Deserialize, Serialize};

/// A function definition. Blocks keep their program order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    /// Name including the `@` sigil, as it appears on the `define` line.
    pub name: String,
    pub params: Vec<Value>,
    pub blocks: Vec<BasicBlock>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            blocks: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_block(&mut self, block: BasicBlock) {
        self.blocks.push(block);
    }

    pub fn with_block(mut self, block: BasicBlock) -> Self {
        self.blocks.push(block);
        self
    }

    /// The block new instructions go to; opens an unnamed entry block when there is none.
    pub fn current_block_mut(&mut self) -> &mut BasicBlock {
        if self.blocks.is_empty() {
            self.blocks.push(BasicBlock::new(""));
        }
        let last = self.blocks.len() - 1;
        &mut self.blocks[last]
    }

    /// Every instruction in block order, then instruction order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|block| block.instructions.iter())
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(BasicBlock::len).sum()
    }
}
