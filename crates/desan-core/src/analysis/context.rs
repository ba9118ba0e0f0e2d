use crate::symbols::{Symbol, SymbolTable};
use crate::values::Value;

/// State owned by one analysis run.
///
/// Every component that needs value identity borrows the context instead of keeping its own
/// table, so symbols from the derivation graph and from the check operands always agree. A new
/// run starts from a new context; nothing carries over.
#[derive(Debug, Default)]
pub struct AnalysisContext {
    symbols: SymbolTable,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, function: &str, value: &Value) -> Symbol {
        self.symbols.intern_value(function, value)
    }

    pub fn lookup(&self, function: &str, value: &Value) -> Option<Symbol> {
        self.symbols.lookup_value(function, value)
    }

    pub fn name_of(&self, symbol: Symbol) -> String {
        self.symbols.name_of(symbol)
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
}
