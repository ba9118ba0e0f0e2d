/*! Core IR model and redundancy analysis for sanitizer check elimination.
 *
 * Sanitizer instrumentation guards every memory access, even when an earlier check already covered
 * the same never-written location through an equivalent pointer derivation. This crate models the
 * parts of LLVM IR those checks live in, derives which checks are redundant, and rewrites the
 * textual IR without them.
 */

pub mod analysis;
pub mod block;
pub mod function;
pub mod instructions;
pub mod module;
pub mod symbols;
pub mod values;

pub use analysis::{
    AnalysisContext, CheckKey, CheckSubgraph, DerivationGraph, MarkingPolicy, OperandInfo,
    PointerNode, RedundancyAnalyzer, RemovalStrategy, SanitizerCall, SanitizerKind,
    SubgraphBuilder,
};
pub use block::BasicBlock;
pub use function::Function;
pub use instructions::{Callee, Instruction, Opcode};
pub use module::Module;
pub use symbols::{Scope, Symbol, SymbolTable, ValueKey};
pub use values::Value;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error(
        "Rewrite diverged from extraction: expected to remove {expected} call line(s), removed {removed}"
    )]
    RewriteMismatch { expected: usize, removed: usize },
    #[error("Rewrite saw {seen} sanitizer call line(s) in {function}, extraction found {extracted}")]
    OrdinalMismatch {
        function: String,
        seen: usize,
        extracted: usize,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
