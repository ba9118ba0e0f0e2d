//! Interned value identity.
//!
//! Local names such as `%0` repeat in every function, so the textual name alone does not identify
//! a value. A [`ValueKey`] pairs the name with the scope it is visible in, and the [`SymbolTable`]
//! hands out one [`Symbol`] per distinct key: two operands share a symbol exactly when they have
//! the same name and the same scope.

use crate::values::Value;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Globals and literal constants, shared by every function.
    Module,
    /// Values local to the named function.
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValueKey {
    pub scope: Scope,
    pub name: String,
}

impl ValueKey {
    pub fn new(scope: Scope, name: impl Into<String>) -> Self {
        Self {
            scope,
            name: name.into(),
        }
    }

    /// Key a value as seen from inside `function`.
    pub fn for_value(function: &str, value: &Value) -> Self {
        match value {
            Value::Local(name) => Self::new(Scope::Function(function.to_string()), name.clone()),
            Value::Global(name) | Value::Constant(name) => Self::new(Scope::Module, name.clone()),
        }
    }

    /// `@f:%x` for locals, the bare name otherwise.
    pub fn canonical_name(&self) -> String {
        match &self.scope {
            Scope::Module => self.name.clone(),
            Scope::Function(function) => format!("{}:{}", function, self.name),
        }
    }
}

impl fmt::Display for ValueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(pub u32);

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sym{}", self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    keys: IndexSet<ValueKey>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, key: ValueKey) -> Symbol {
        let (index, _) = self.keys.insert_full(key);
        Symbol(index as u32)
    }

    pub fn intern_value(&mut self, function: &str, value: &Value) -> Symbol {
        self.intern(ValueKey::for_value(function, value))
    }

    pub fn lookup(&self, key: &ValueKey) -> Option<Symbol> {
        self.keys.get_index_of(key).map(|index| Symbol(index as u32))
    }

    pub fn lookup_value(&self, function: &str, value: &Value) -> Option<Symbol> {
        self.lookup(&ValueKey::for_value(function, value))
    }

    pub fn resolve(&self, symbol: Symbol) -> Option<&ValueKey> {
        self.keys.get_index(symbol.0 as usize)
    }

    /// Canonical name of a symbol; symbols from another table render as `sym<n>`.
    pub fn name_of(&self, symbol: Symbol) -> String {
        self.resolve(symbol)
            .map(ValueKey::canonical_name)
            .unwrap_or_else(|| symbol.to_string())
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
