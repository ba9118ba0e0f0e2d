use crate::{Result, ToolchainError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const SANITIZER_FLAGS: &[(&str, &str)] = &[
    ("asan", "-fsanitize=address"),
    ("ubsan", "-fsanitize=undefined"),
    ("msan", "-fsanitize=memory"),
    ("tsan", "-fsanitize=thread"),
    ("lsan", "-fsanitize=leak"),
];

pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Executable names, resolved through `PATH` unless given as paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolNames {
    pub clang: String,
    pub llvm_link: String,
    pub llvm_dis: String,
    pub llvm_as: String,
    pub opt: String,
}

impl Default for ToolNames {
    fn default() -> Self {
        Self {
            clang: "clang".to_string(),
            llvm_link: "llvm-link".to_string(),
            llvm_dis: "llvm-dis".to_string(),
            llvm_as: "llvm-as".to_string(),
            opt: "opt".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub project_path: PathBuf,
    pub sanitizers: Vec<String>,
    pub opt_level: String,
    pub include_cpp: bool,
    pub defines: Vec<String>,
    pub include_paths: Vec<String>,
    pub extra_flags: Vec<String>,
    pub tools: ToolNames,
    pub timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            project_path: PathBuf::from("."),
            sanitizers: vec!["asan".to_string()],
            opt_level: "O0".to_string(),
            include_cpp: false,
            defines: Vec::new(),
            include_paths: Vec::new(),
            extra_flags: Vec::new(),
            tools: ToolNames::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CompilerConfig {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            ..Self::default()
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ToolchainError::MissingFile(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// One `-fsanitize=` flag per known sanitizer, in first-seen order.
    pub fn sanitize_flags(&self) -> Vec<String> {
        let mut flags: Vec<String> = Vec::new();
        for name in &self.sanitizers {
            let name = name.trim();
            match SANITIZER_FLAGS.iter().find(|(short, _)| *short == name) {
                Some((_, flag)) => {
                    if !flags.iter().any(|f| f == flag) {
                        flags.push(flag.to_string());
                    }
                }
                None => warn!(sanitizer = name, "ignoring unknown sanitizer"),
            }
        }
        flags
    }

    pub fn optimization_flag(&self) -> String {
        let level = self.opt_level.trim();
        if level.starts_with('O') {
            format!("-{}", level)
        } else {
            "-O0".to_string()
        }
    }

    pub fn define_flags(&self) -> Vec<String> {
        self.defines.iter().map(|d| format!("-D{}", d)).collect()
    }

    pub fn include_flags(&self) -> Vec<String> {
        self.include_paths.iter().map(|p| format!("-I{}", p)).collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Split a delimited command-line list, dropping empty entries.
pub fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
