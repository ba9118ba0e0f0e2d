/*! Parse textual LLVM IR into the desan IR model.
 *
 * Sanitizer instrumentation is easiest to inspect in the `.ll` form that `llvm-dis` prints. This
 * parser reads that text back into a [`desan_core::Module`], keeping only the structure the
 * redundancy analysis needs: function bodies, labels, and instruction operands. Globals, metadata,
 * attributes and any line it does not understand pass through without failing the parse.
 */

#![allow(unreachable_patterns)]

use desan_core::Module;
use pest::Parser;
use pest_derive::Parser;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

pub mod builder;

pub use builder::build_module;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct LlvmIrParser;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<pest::error::Error<Rule>>),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;

pub fn parse(input: &str) -> ParseResult<pest::iterators::Pairs<'_, Rule>> {
    LlvmIrParser::parse(Rule::module, input).map_err(|e| ParseError::Syntax(Box::new(e)))
}

pub fn check(input: &str) -> bool {
    parse(input).is_ok()
}

pub fn parse_module(input: &str) -> ParseResult<Module> {
    let mut pairs = parse(input)?;
    Ok(pairs.next().map(build_module).unwrap_or_default())
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Module> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ParseError::MissingFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path)?;
    Ok(parse_module(&text)?.with_source_name(path.display().to_string()))
}

/// Every `.ll` file under `dir`, sorted by path.
pub fn parse_dir<P: AsRef<Path>>(dir: P) -> ParseResult<Vec<(PathBuf, Module)>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Err(ParseError::MissingFile(dir.to_path_buf()));
    }
    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "ll"))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|path| parse_file(&path).map(|module| (path, module)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_module() {
        assert!(check(""));
        assert!(check("\n\n"));
    }

    #[test]
    fn test_simple_function() {
        let input = r"
define i32 @add(i32 %a, i32 %b) {
entry:
  %sum = add nsw i32 %a, %b
  ret i32 %sum
}
";
        assert!(check(input));
    }

    #[test]
    fn test_module_header_lines() {
        let input = r#"; ModuleID = 'demo.c'
source_filename = "demo.c"
target datalayout = "e-m:e-p270:32:32-i64:64-n8:16:32:64-S128"
target triple = "x86_64-pc-linux-gnu"

@.str = private unnamed_addr constant [4 x i8] c"%d\0A\00", align 1
%struct.S = type { i32, ptr }

declare i32 @printf(ptr noundef, ...) #1

attributes #0 = { noinline nounwind optnone uwtable "frame-pointer"="all" }
!llvm.module.flags = !{!0}
!0 = !{i32 1, !"wchar_size", i32 4}
"#;
        match parse(input) {
            Ok(_) => {}
            Err(e) => panic!("Parse error: {}", e),
        }
    }

    #[test]
    fn test_unknown_body_lines_are_tolerated() {
        let input = r"
define void @f(i32 %x) {
entry:
  switch i32 %x, label %d [
    i32 0, label %a
    i32 1, label %b
  ]
a:
  ret void
}
";
        assert!(check(input));
    }

    #[test]
    fn test_missing_file() {
        let err = parse_file("/definitely/not/here.ll").unwrap_err();
        assert!(matches!(err, ParseError::MissingFile(_)));
    }
}
