use crate::values::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opcodes the analyses distinguish. Everything else lands in `Other` with its mnemonic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Store,
    Load,
    BitCast,
    IntToPtr,
    PtrToInt,
    GetElementPtr,
    Call,
    Invoke,
    Alloca,
    Other(String),
}

impl Opcode {
    pub fn mnemonic(&self) -> &str {
        match self {
            Opcode::Store => "store",
            Opcode::Load => "load",
            Opcode::BitCast => "bitcast",
            Opcode::IntToPtr => "inttoptr",
            Opcode::PtrToInt => "ptrtoint",
            Opcode::GetElementPtr => "getelementptr",
            Opcode::Call => "call",
            Opcode::Invoke => "invoke",
            Opcode::Alloca => "alloca",
            Opcode::Other(name) => name,
        }
    }

    /// Conversions that carry a pointer value from their operand to their result.
    pub fn is_pointer_conversion(&self) -> bool {
        matches!(self, Opcode::BitCast | Opcode::IntToPtr | Opcode::PtrToInt)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Opcode::Call | Opcode::Invoke)
    }
}

impl From<&str> for Opcode {
    fn from(mnemonic: &str) -> Self {
        match mnemonic {
            "store" => Opcode::Store,
            "load" => Opcode::Load,
            "bitcast" => Opcode::BitCast,
            "inttoptr" => Opcode::IntToPtr,
            "ptrtoint" => Opcode::PtrToInt,
            "getelementptr" => Opcode::GetElementPtr,
            "call" => Opcode::Call,
            "invoke" => Opcode::Invoke,
            "alloca" => Opcode::Alloca,
            other => Opcode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    /// A named function, `@name`.
    Direct(String),
    /// A function pointer, inline asm, or anything else without a global name.
    Indirect(Value),
}

impl Callee {
    pub fn name(&self) -> &str {
        match self {
            Callee::Direct(name) => name,
            Callee::Indirect(value) => value.name(),
        }
    }

    pub fn direct_name(&self) -> Option<&str> {
        match self {
            Callee::Direct(name) => Some(name),
            Callee::Indirect(_) => None,
        }
    }
}

/// One instruction of a basic block.
///
/// For calls, `operands` holds the call arguments only; the callee is kept apart in `callee`.
/// For stores, `operands` is `[value, destination]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub result: Option<Value>,
    pub opcode: Opcode,
    pub operands: Vec<Value>,
    pub callee: Option<Callee>,
    /// One-based line of the instruction in its source text, 0 when built in memory.
    pub line: usize,
}

impl Instruction {
    pub fn new(opcode: Opcode, operands: Vec<Value>) -> Self {
        Self {
            result: None,
            opcode,
            operands,
            callee: None,
            line: 0,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_callee(mut self, callee: Callee) -> Self {
        self.callee = Some(callee);
        self
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    pub fn store(value: Value, destination: Value) -> Self {
        Self::new(Opcode::Store, vec![value, destination])
    }

    pub fn load(result: Value, pointer: Value) -> Self {
        Self::new(Opcode::Load, vec![pointer]).with_result(result)
    }

    pub fn gep(result: Value, base: Value, indices: Vec<Value>) -> Self {
        let mut operands = vec![base];
        operands.extend(indices);
        Self::new(Opcode::GetElementPtr, operands).with_result(result)
    }

    pub fn call(callee: Callee, args: Vec<Value>) -> Self {
        Self::new(Opcode::Call, args).with_callee(callee)
    }

    /// The destination pointer of a store.
    pub fn store_destination(&self) -> Option<&Value> {
        match self.opcode {
            Opcode::Store => self.operands.get(1),
            _ => None,
        }
    }

    /// The value a derivation edge starts from: the pointer operand of loads and conversions,
    /// the base of an address computation.
    pub fn derivation_source(&self) -> Option<&Value> {
        match self.opcode {
            Opcode::Load | Opcode::GetElementPtr => self.operands.first(),
            ref op if op.is_pointer_conversion() => self.operands.first(),
            _ => None,
        }
    }

    pub fn callee_name(&self) -> Option<&str> {
        self.callee.as_ref().map(Callee::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_roundtrip() {
        for name in ["store", "load", "bitcast", "getelementptr", "call", "alloca"] {
            assert_eq!(Opcode::from(name).mnemonic(), name);
        }
        assert_eq!(Opcode::from("icmp"), Opcode::Other("icmp".into()));
    }

    #[test]
    fn test_store_destination_is_second_operand() {
        let inst = Instruction::store(Value::Constant("0".into()), Value::Local("%p".into()));
        assert_eq!(inst.store_destination(), Some(&Value::Local("%p".into())));
        assert_eq!(inst.derivation_source(), None);
    }

    #[test]
    fn test_derivation_source() {
        let gep = Instruction::gep(
            Value::Local("%q".into()),
            Value::Local("%p".into()),
            vec![Value::Constant("1".into())],
        );
        assert_eq!(gep.derivation_source(), Some(&Value::Local("%p".into())));

        let cast = Instruction::new(Opcode::PtrToInt, vec![Value::Local("%p".into())])
            .with_result(Value::Local("%i".into()));
        assert_eq!(cast.derivation_source(), Some(&Value::Local("%p".into())));
    }
}
