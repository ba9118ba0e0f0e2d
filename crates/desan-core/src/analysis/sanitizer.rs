use super::visitor::{walk_module, InstructionVisitor};
use crate::{
    function::Function,
    instructions::{Callee, Instruction, Opcode},
    module::Module,
    values::Value,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Sanitizer runtimes, recognised by the name fragment their entry points share.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizerKind {
    Address,
    UndefinedBehavior,
    Memory,
    Thread,
    Leak,
}

impl SanitizerKind {
    pub const ALL: [SanitizerKind; 5] = [
        SanitizerKind::Address,
        SanitizerKind::UndefinedBehavior,
        SanitizerKind::Memory,
        SanitizerKind::Thread,
        SanitizerKind::Leak,
    ];

    pub fn fragment(&self) -> &'static str {
        match self {
            SanitizerKind::Address => "__asan",
            SanitizerKind::UndefinedBehavior => "__ubsan",
            SanitizerKind::Memory => "__msan",
            SanitizerKind::Thread => "__tsan",
            SanitizerKind::Leak => "__lsan",
        }
    }

    /// Short name used on the command line and in `-fsanitize` mapping.
    pub fn short_name(&self) -> &'static str {
        match self {
            SanitizerKind::Address => "asan",
            SanitizerKind::UndefinedBehavior => "ubsan",
            SanitizerKind::Memory => "msan",
            SanitizerKind::Thread => "tsan",
            SanitizerKind::Leak => "lsan",
        }
    }

    pub fn from_short_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.short_name() == name)
    }

    /// The runtime a callee belongs to, if any.
    pub fn of_callee(callee: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| callee.contains(kind.fragment()))
    }
}

impl fmt::Display for SanitizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

pub fn is_sanitizer_function(name: &str) -> bool {
    SanitizerKind::of_callee(name).is_some()
}

pub fn list_sanitizer_names() -> Vec<&'static str> {
    SanitizerKind::ALL.iter().map(SanitizerKind::fragment).collect()
}

/// Identity of a check within one run: the containing function and the call's position among
/// that function's sanitizer calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CheckKey {
    pub function: String,
    pub ordinal: usize,
}

impl CheckKey {
    pub fn new(function: impl Into<String>, ordinal: usize) -> Self {
        Self {
            function: function.into(),
            ordinal,
        }
    }
}

impl fmt::Display for CheckKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:call{}", self.function, self.ordinal)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanitizerCall {
    pub function: String,
    pub ordinal: usize,
    pub callee: String,
    pub operands: Vec<Value>,
    pub line: usize,
}

impl SanitizerCall {
    pub fn key(&self) -> CheckKey {
        CheckKey::new(self.function.clone(), self.ordinal)
    }

    pub fn kind(&self) -> Option<SanitizerKind> {
        SanitizerKind::of_callee(&self.callee)
    }
}

impl fmt::Display for SanitizerCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ops: Vec<&str> = self.operands.iter().map(Value::name).collect();
        write!(f, "{} -> {}({})", self.key(), self.callee, ops.join(", "))
    }
}

#[derive(Default)]
struct CallCollector {
    calls: Vec<SanitizerCall>,
    ordinal: usize,
}

impl InstructionVisitor for CallCollector {
    fn enter_function(&mut self, _function: &Function) {
        self.ordinal = 0;
    }

    fn visit_call(&mut self, function: &Function, inst: &Instruction) {
        // `invoke` is a terminator and is never dropped.
        if inst.opcode != Opcode::Call {
            return;
        }
        // Only named callees: the text rewriter recognises calls by their `@name(` token.
        let Some(callee) = inst.callee.as_ref().and_then(Callee::direct_name) else {
            debug!(function = %function.name, line = inst.line, "indirect call, not a check");
            return;
        };
        if !is_sanitizer_function(callee) {
            return;
        }
        self.calls.push(SanitizerCall {
            function: function.name.clone(),
            ordinal: self.ordinal,
            callee: callee.to_string(),
            operands: inst.operands.clone(),
            line: inst.line,
        });
        self.ordinal += 1;
    }
}

/// Every sanitizer call in the module, in program order.
pub fn find_sanitizer_calls(module: &Module) -> Vec<SanitizerCall> {
    let mut collector = CallCollector::default();
    walk_module(module, &mut collector);
    debug!(calls = collector.calls.len(), "collected sanitizer calls");
    collector.calls
}

pub fn call_summary<'a>(calls: impl IntoIterator<Item = &'a SanitizerCall>) -> String {
    calls
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
