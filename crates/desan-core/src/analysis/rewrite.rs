//! Line-level removal of sanitizer calls from textual IR.
//!
//! The rewriter never parses: it recognises function boundaries and call lines lexically and
//! numbers the sanitizer calls of each function in order, which must reproduce the ordinals the
//! extractor assigned on the parsed module.

use super::sanitizer::{is_sanitizer_function, CheckKey};
use indexmap::{IndexMap, IndexSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteOutcome {
    pub text: String,
    /// Keys of the dropped lines, in text order.
    pub removed: Vec<CheckKey>,
    /// Sanitizer call lines seen in each function, whether dropped or kept.
    pub seen_per_function: IndexMap<String, usize>,
}

/// Drop every sanitizer call line whose key is in `redundant`. Other lines, including their line
/// endings, are copied through unchanged.
pub fn rewrite_ir_text(text: &str, redundant: &IndexSet<CheckKey>) -> RewriteOutcome {
    let mut outcome = RewriteOutcome::default();
    let mut current: Option<String> = None;

    for line in text.split_inclusive('\n') {
        let trimmed = line.trim();
        if let Some(name) = defined_function(trimmed) {
            outcome.seen_per_function.entry(name.clone()).or_insert(0);
            current = Some(name);
        } else if trimmed == "}" {
            current = None;
        } else if let Some(function) = &current {
            if let Some(callee) = sanitizer_callee(trimmed) {
                let seen = outcome
                    .seen_per_function
                    .entry(function.clone())
                    .or_insert(0);
                let key = CheckKey::new(function.clone(), *seen);
                *seen += 1;
                if redundant.contains(&key) {
                    debug!(%key, callee, "removing redundant check");
                    outcome.removed.push(key);
                    continue;
                }
            }
        }
        outcome.text.push_str(line);
    }
    outcome
}

/// Name of the function a trimmed `define` line opens, `@` included.
pub fn defined_function(line: &str) -> Option<String> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("define") {
        return None;
    }
    tokens
        .find(|token| token.starts_with('@'))
        .map(|token| token.split('(').next().unwrap_or(token).to_string())
}

/// The callee of a sanitizer call line: the first `@name` directly followed by `(` after the
/// `call` token. Comments are ignored.
fn sanitizer_callee(line: &str) -> Option<&str> {
    let line = line.split(';').next().unwrap_or(line);
    let after_call = after_call_token(line)?;
    let callee = direct_callee(after_call)?;
    is_sanitizer_function(callee).then_some(callee)
}

fn after_call_token(line: &str) -> Option<&str> {
    let mut offset = 0;
    for token in line.split_whitespace() {
        let start = offset + line[offset..].find(token)?;
        offset = start + token.len();
        if token == "call" {
            return Some(&line[offset..]);
        }
    }
    None
}

fn direct_callee(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut search = 0;
    while let Some(pos) = text[search..].find('@') {
        let start = search + pos;
        let end = start
            + 1
            + text[start + 1..]
                .find(|c: char| !is_name_char(c))
                .unwrap_or(text.len() - start - 1);
        if end > start + 1 && bytes.get(end) == Some(&b'(') {
            return Some(&text[start..end]);
        }
        search = start + 1;
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$' | '-')
}
