/*! Remove redundant sanitizer checks from LLVM IR.
 *
 * One import for the whole flow: parse instrumented text IR, decide which checks are covered by
 * earlier ones, rewrite the text without them, and report what happened. The pipeline module also
 * drives clang and the LLVM tools around that core for a complete project build.
 */

pub mod pipeline;

pub use desan_core as core;
pub use desan_emit as emit;
pub use desan_parser as parser;
pub use desan_toolchain as toolchain;

pub use desan_core::{
    AnalysisContext, CheckKey, CheckSubgraph, MarkingPolicy, Module, RedundancyAnalyzer,
    RemovalStrategy, SanitizerCall, SanitizerKind, SubgraphBuilder,
};

pub use desan_emit::{DependencyReport, ModuleReport, RedundancyReport, Report};

pub use desan_parser::{parse_file, parse_module};

pub use desan_toolchain::{Compiler, CompilerConfig};

pub use pipeline::{
    optimize_ir_file, optimize_text, run_pipeline, AnalysisConfig, Optimization, PipelineConfig,
    PipelineError, PipelineOutputs,
};
