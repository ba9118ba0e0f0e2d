use crate::function::Function;
use crate::instructions::{Instruction, Opcode};
use crate::module::Module;

/// Per-opcode hooks over a module walk. Unhandled opcodes fall through to `visit_default`.
///
/// The walk order is fixed: functions in definition order, blocks in order, instructions in order.
/// Sanitizer call ordinals depend on it.
pub trait InstructionVisitor {
    fn enter_function(&mut self, _function: &Function) {}

    fn exit_function(&mut self, _function: &Function) {}

    fn visit_store(&mut self, function: &Function, inst: &Instruction) {
        self.visit_default(function, inst);
    }

    fn visit_load(&mut self, function: &Function, inst: &Instruction) {
        self.visit_default(function, inst);
    }

    fn visit_conversion(&mut self, function: &Function, inst: &Instruction) {
        self.visit_default(function, inst);
    }

    fn visit_gep(&mut self, function: &Function, inst: &Instruction) {
        self.visit_default(function, inst);
    }

    fn visit_call(&mut self, function: &Function, inst: &Instruction) {
        self.visit_default(function, inst);
    }

    fn visit_default(&mut self, _function: &Function, _inst: &Instruction) {}
}

pub fn walk_module<V: InstructionVisitor + ?Sized>(module: &Module, visitor: &mut V) {
    for function in module.functions.values() {
        walk_function(function, visitor);
    }
}

pub fn walk_function<V: InstructionVisitor + ?Sized>(function: &Function, visitor: &mut V) {
    visitor.enter_function(function);
    for inst in function.instructions() {
        match inst.opcode {
            Opcode::Store => visitor.visit_store(function, inst),
            Opcode::Load => visitor.visit_load(function, inst),
            Opcode::BitCast | Opcode::IntToPtr | Opcode::PtrToInt => {
                visitor.visit_conversion(function, inst)
            }
            Opcode::GetElementPtr => visitor.visit_gep(function, inst),
            Opcode::Call | Opcode::Invoke => visitor.visit_call(function, inst),
            Opcode::Alloca | Opcode::Other(_) => visitor.visit_default(function, inst),
        }
    }
    visitor.exit_function(function);
}
