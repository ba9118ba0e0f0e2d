/*! Drive clang and the LLVM tools around the analysis.
 *
 * The analysis itself only ever sees text IR. Getting that text out of a C or C++ project, and
 * turning the rewritten text back into a binary, is the job of the external toolchain: clang with
 * the requested sanitizers, `llvm-link`, `llvm-dis`, `llvm-as` and `opt`. Every invocation is a
 * synchronous subprocess with a timeout.
 */

pub mod compiler;
pub mod config;
pub mod runner;

pub use compiler::{BuildArtifacts, Compiler};
pub use config::{CompilerConfig, ToolNames};
pub use runner::{ToolOutput, ToolRunner};

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolchainError {
    #[error("No source files found in {}", .0.display())]
    NoSourcesFound(PathBuf),
    #[error("No bitcode files provided for linking")]
    NoInputsProvided,
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("IR verification failed for {}: {diagnostics}", .path.display())]
    VerificationFailed { path: PathBuf, diagnostics: String },
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{tool} timed out after {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },
    #[error("Failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ToolchainError>;
