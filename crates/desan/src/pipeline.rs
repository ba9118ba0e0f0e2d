//! From instrumented sources or text IR to an optimised program.

use desan_core::analysis::GlobalEffectsGuard;
use desan_core::{
    AnalysisError, CheckKey, CheckSubgraph, MarkingPolicy, Module, RedundancyAnalyzer,
    RemovalStrategy,
};
use desan_emit::{DependencyReport, RedundancyReport};
use desan_parser::{parse_module, ParseError};
use desan_toolchain::{Compiler, CompilerConfig, ToolchainError};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub policy: MarkingPolicy,
    pub strategy: RemovalStrategy,
    /// Refuse cross-function pairs involving functions that touch globals.
    pub interprocedural_guard: bool,
}

impl AnalysisConfig {
    pub fn analyzer(&self, module: &Module) -> RedundancyAnalyzer {
        let analyzer = RedundancyAnalyzer::new()
            .with_policy(self.policy)
            .with_strategy(self.strategy);
        if self.interprocedural_guard {
            analyzer.with_guard(GlobalEffectsGuard::from_module(module))
        } else {
            analyzer
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub compiler: CompilerConfig,
    pub analysis: AnalysisConfig,
    pub build_dir: PathBuf,
    /// Compile each source on its own and link the bitcode.
    pub split: bool,
    pub verify: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            compiler: CompilerConfig::default(),
            analysis: AnalysisConfig::default(),
            build_dir: PathBuf::from("build"),
            split: false,
            verify: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PipelineError::MissingFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Result of one in-memory optimisation.
#[derive(Debug, Clone)]
pub struct Optimization {
    pub text: String,
    pub redundant: IndexSet<CheckKey>,
    pub subgraphs: IndexMap<CheckKey, CheckSubgraph>,
    pub dependencies: DependencyReport,
    pub report: RedundancyReport,
}

impl Optimization {
    pub fn removed(&self) -> usize {
        self.redundant.len()
    }
}

/// Parse, analyse and rewrite `text` without touching the filesystem.
pub fn optimize_text(text: &str, config: &AnalysisConfig) -> Result<Optimization> {
    let module = parse_module(text)?;
    let analyzer = config.analyzer(&module);
    let optimized = analyzer.optimize_ir_text(&module, text)?;
    let dependencies = DependencyReport::from_subgraphs(&optimized.subgraphs, &optimized.context);
    let report = RedundancyReport::new(
        &optimized.subgraphs,
        &optimized.redundant,
        config.policy,
        config.strategy,
    );
    Ok(Optimization {
        text: optimized.text,
        redundant: optimized.redundant,
        subgraphs: optimized.subgraphs,
        dependencies,
        report,
    })
}

pub fn optimize_ir_file(input: &Path, output: &Path, config: &AnalysisConfig) -> Result<Optimization> {
    if !input.exists() {
        return Err(PipelineError::MissingFile(input.to_path_buf()));
    }
    let text = std::fs::read_to_string(input)?;
    let mut optimization = optimize_text(&text, config)?;
    optimization.report = optimization
        .report
        .with_source(input.display().to_string());

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &optimization.text)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        removed = optimization.removed(),
        "wrote optimised IR"
    );
    Ok(optimization)
}

/// Paths produced by [`run_pipeline`], plus the analysis summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutputs {
    pub bitcode: PathBuf,
    pub ir: PathBuf,
    pub optimized_ir: PathBuf,
    pub dependencies: PathBuf,
    pub binary: PathBuf,
    pub report: RedundancyReport,
}

/// Build the project, drop its redundant checks, and compile the optimised IR.
///
/// With `verify` set, both the disassembled and the optimised IR must pass the verifier; an
/// optimised file that fails is deleted so only the original IR remains.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineOutputs> {
    let compiler = Compiler::new(config.compiler.clone());
    let build_dir = config.build_dir.as_path();

    let bitcode = compiler.build_bitcode(build_dir, config.split)?;
    let ir = compiler.to_text_ir(&bitcode, Some(&build_dir.join("program.ll")))?;
    if config.verify {
        compiler.verify(&ir)?;
    }

    let optimized_ir = build_dir.join("program_optimized.ll");
    let optimization = optimize_ir_file(&ir, &optimized_ir, &config.analysis)?;

    let dependencies = build_dir.join("dependencies.json");
    std::fs::write(
        &dependencies,
        serde_json::to_string_pretty(&optimization.dependencies)?,
    )?;

    if config.verify {
        if let Err(err) = compiler.verify(&optimized_ir) {
            if let Err(remove) = std::fs::remove_file(&optimized_ir) {
                warn!(error = %remove, path = %optimized_ir.display(), "could not remove unverified IR");
            }
            return Err(err.into());
        }
    }

    let binary = compiler.compile_ir(&optimized_ir, &build_dir.join("program_optimized"), &[])?;
    info!(
        checks = optimization.report.total_checks,
        removed = optimization.removed(),
        binary = %binary.display(),
        "pipeline finished"
    );
    Ok(PipelineOutputs {
        bitcode,
        ir,
        optimized_ir,
        dependencies,
        binary,
        report: optimization.report,
    })
}
