use serde::{Deserialize, Serialize};
use std::fmt;

/// An operand or result as it appears in the textual IR.
///
/// Names keep their sigil: `%x` for function-local values, `@g` for globals. Everything
/// else (integers, `null`, constant expressions, metadata) is a constant, written with its type
/// when the parser knows it (`i64 0`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Value {
    Local(String),
    Global(String),
    Constant(String),
}

impl Value {
    /// Classify a rendered operand by its leading sigil.
    pub fn from_text(text: &str) -> Self {
        let text = text.trim();
        if text.starts_with('%') {
            Value::Local(text.to_string())
        } else if text.starts_with('@') {
            Value::Global(text.to_string())
        } else {
            Value::Constant(text.to_string())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Value::Local(name) | Value::Global(name) | Value::Constant(name) => name,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Value::Local(_))
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Value::Global(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    /// A value with no textual name at all cannot be keyed.
    pub fn is_empty(&self) -> bool {
        self.name().is_empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether a name carries the global-value sigil.
pub fn is_global_name(name: &str) -> bool {
    name.starts_with('@')
}
