use crate::Rule;
use desan_core::{BasicBlock, Callee, Function, Instruction, Module, Opcode, Value};
use pest::iterators::Pair;
use tracing::debug;

/// Cast mnemonics whose pointer-carrying operand is the atom before `to`.
const CASTS: &[&str] = &[
    "bitcast",
    "inttoptr",
    "ptrtoint",
    "addrspacecast",
    "trunc",
    "zext",
    "sext",
    "fptrunc",
    "fpext",
    "fptoui",
    "fptosi",
    "uitofp",
    "sitofp",
];

/// Build a module from the `module` pair.
pub fn build_module(pair: Pair<Rule>) -> Module {
    let mut module = Module::new();
    for item in pair.into_inner() {
        match item.as_rule() {
            Rule::function_def => module.add_function(build_function(item)),
            Rule::declaration => {
                if let Some(name) = first_inner(&item, Rule::global_name) {
                    module.declarations.push(name);
                }
            }
            Rule::global_def => {
                if let Some(name) = first_inner(&item, Rule::global_name) {
                    module.globals.push(name);
                }
            }
            _ => {}
        }
    }
    debug!(
        functions = module.functions.len(),
        globals = module.globals.len(),
        declarations = module.declarations.len(),
        "built module"
    );
    module
}

fn first_inner(pair: &Pair<Rule>, rule: Rule) -> Option<String> {
    pair.clone()
        .into_inner()
        .find(|p| p.as_rule() == rule)
        .map(|p| p.as_str().to_string())
}

fn line_of(pair: &Pair<Rule>) -> usize {
    pair.as_span().start_pos().line_col().0
}

pub fn build_function(pair: Pair<Rule>) -> Function {
    let mut function = Function::new("");
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::define_header => {
                for header in part.into_inner() {
                    match header.as_rule() {
                        Rule::global_name => function.name = header.as_str().to_string(),
                        Rule::paren_group => {
                            function.params = group_args(header)
                                .iter()
                                .filter_map(|arg| last_value(arg))
                                .filter(Value::is_local)
                                .collect();
                        }
                        _ => {}
                    }
                }
            }
            Rule::label => {
                let label = first_inner(&part, Rule::label_name).unwrap_or_default();
                function.add_block(BasicBlock::new(label));
            }
            Rule::instruction => {
                let inst = build_instruction(part);
                function.current_block_mut().add_instruction(inst);
            }
            Rule::unknown_line => debug!(
                function = %function.name,
                line = line_of(&part),
                text = part.as_str(),
                "skipping unrecognised line"
            ),
            _ => {}
        }
    }
    function
}

type Arg<'i> = Vec<Pair<'i, Rule>>;

fn atoms(arg: Pair<'_, Rule>) -> Arg<'_> {
    arg.into_inner().collect()
}

fn group_args(group: Pair<'_, Rule>) -> Vec<Arg<'_>> {
    group
        .into_inner()
        .filter(|p| p.as_rule() == Rule::arg)
        .map(atoms)
        .collect()
}

fn atom_value(atom: &Pair<Rule>) -> Value {
    match atom.as_rule() {
        Rule::local_name => Value::Local(atom.as_str().to_string()),
        Rule::global_name => Value::Global(atom.as_str().to_string()),
        _ => Value::Constant(atom.as_str().trim().to_string()),
    }
}

fn is_group(atom: &Pair<Rule>) -> bool {
    matches!(
        atom.as_rule(),
        Rule::paren_group | Rule::bracket_group | Rule::brace_group | Rule::angle_group
    )
}

/// The value at `index` of an argument. Literals keep the argument's leading type, so `i32 1`
/// and `i64 1` stay apart; a constant expression keeps its operator.
fn typed_value(arg: &[Pair<'_, Rule>], index: usize) -> Value {
    let atom = &arg[index];
    if is_name(atom) || index == 0 {
        return atom_value(atom);
    }
    let start = if is_group(atom) && index >= 2 && arg[index - 1].as_rule() == Rule::word {
        index - 1
    } else {
        index
    };
    let text = std::iter::once(&arg[0])
        .chain(&arg[start..=index])
        .map(|atom| atom.as_str().trim())
        .collect::<Vec<_>>()
        .join(" ");
    Value::Constant(text)
}

fn last_value(arg: &Arg<'_>) -> Option<Value> {
    arg.len().checked_sub(1).map(|index| typed_value(arg, index))
}

fn is_name(atom: &Pair<Rule>) -> bool {
    matches!(atom.as_rule(), Rule::local_name | Rule::global_name)
}

pub fn build_instruction(pair: Pair<Rule>) -> Instruction {
    let line = line_of(&pair);
    let mut result = None;
    let mut opcode = Opcode::Other(String::new());
    let mut args: Vec<Arg<'_>> = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::local_name => result = Some(Value::Local(part.as_str().to_string())),
            Rule::opcode => opcode = Opcode::from(part.as_str()),
            Rule::arg => args.push(atoms(part)),
            _ => {}
        }
    }

    let is_cast = CASTS.iter().any(|cast| *cast == opcode.mnemonic());
    let mut inst = match opcode {
        Opcode::Store => {
            let operands = args.iter().take(2).filter_map(last_value).collect();
            Instruction::new(opcode, operands)
        }
        Opcode::Load => {
            let pointer = args.get(1).or(args.first()).and_then(last_value);
            Instruction::new(opcode, pointer.into_iter().collect())
        }
        Opcode::GetElementPtr => {
            let operands = args.iter().skip(1).filter_map(last_value).collect();
            Instruction::new(opcode, operands)
        }
        Opcode::Call | Opcode::Invoke => build_call(opcode, &args),
        _ if is_cast => {
            let source = args.first().and_then(|arg| {
                arg.iter()
                    .position(|atom| atom.as_str() == "to")
                    .and_then(|to| to.checked_sub(1))
                    .map(|index| typed_value(arg, index))
            });
            Instruction::new(opcode, source.into_iter().collect())
        }
        _ => {
            let operands = args.iter().filter_map(last_value).collect();
            Instruction::new(opcode, operands)
        }
    };
    if let Some(result) = result {
        inst = inst.with_result(result);
    }
    inst.at_line(line)
}

/// The callee is the first name immediately followed by the argument list.
fn build_call(opcode: Opcode, args: &[Arg<'_>]) -> Instruction {
    for arg in args {
        for pair in arg.windows(2) {
            let (name, group) = (&pair[0], &pair[1]);
            if is_name(name)
                && group.as_rule() == Rule::paren_group
                && name.as_span().end() == group.as_span().start()
            {
                let callee = match atom_value(name) {
                    Value::Global(global) => Callee::Direct(global),
                    other => Callee::Indirect(other),
                };
                let operands = group_args(group.clone())
                    .iter()
                    .filter_map(last_value)
                    .collect();
                return Instruction::new(opcode, operands).with_callee(callee);
            }
        }
    }
    let text = args
        .iter()
        .map(|arg| arg.iter().map(Pair::as_str).collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(", ");
    debug!(text = %text, "call without an identifiable callee");
    Instruction::new(opcode, Vec::new()).with_callee(Callee::Indirect(Value::Constant(text)))
}

#[cfg(test)]
mod tests {
    use crate::parse_module;
    use desan_core::{Callee, Opcode, Value};
    use pretty_assertions::assert_eq;

    fn local(name: &str) -> Value {
        Value::Local(name.to_string())
    }

    fn single_function(body: &str) -> desan_core::Function {
        let text = format!("define void @f(ptr %p, i32 %n) {{\nentry:\n{body}\n}}\n");
        let module = parse_module(&text).unwrap();
        module.functions["@f"].clone()
    }

    #[test]
    fn test_function_header() {
        let f = single_function("  ret void");
        assert_eq!(f.name, "@f");
        assert_eq!(f.params, vec![local("%p"), local("%n")]);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].label, "entry");
    }

    #[test]
    fn test_store_and_load_operands() {
        let f = single_function(
            "  store i32 %n, ptr %p, align 4\n  %v = load volatile i32, ptr %p, align 4",
        );
        let insts: Vec<_> = f.instructions().collect();
        assert_eq!(insts[0].opcode, Opcode::Store);
        assert_eq!(insts[0].operands, vec![local("%n"), local("%p")]);
        assert_eq!(insts[1].opcode, Opcode::Load);
        assert_eq!(insts[1].result, Some(local("%v")));
        assert_eq!(insts[1].operands, vec![local("%p")]);
        assert_eq!(insts[1].line, 4);
    }

    #[test]
    fn test_gep_and_casts() {
        let f = single_function(
            "  %q = getelementptr inbounds [10 x i32], ptr %p, i64 0, i64 %i\n  %a = ptrtoint ptr %q to i64\n  %b = bitcast ptr %q to ptr",
        );
        let insts: Vec<_> = f.instructions().collect();
        assert_eq!(
            insts[0].operands,
            vec![local("%p"), Value::Constant("i64 0".into()), local("%i")]
        );
        assert_eq!(insts[1].opcode, Opcode::PtrToInt);
        assert_eq!(insts[1].operands, vec![local("%q")]);
        assert_eq!(insts[2].operands, vec![local("%q")]);
    }

    #[test]
    fn test_calls() {
        let f = single_function(
            "  call void @__asan_load8(i64 %a)\n  %r = tail call i32 (ptr, ...) @printf(ptr noundef @.str, i32 noundef %n) #3\n  call void %fp(i32 1)\n  call void asm sideeffect \"\", \"~{memory}\"()",
        );
        let insts: Vec<_> = f.instructions().collect();
        assert_eq!(insts[0].callee, Some(Callee::Direct("@__asan_load8".into())));
        assert_eq!(insts[0].operands, vec![local("%a")]);
        assert_eq!(insts[1].callee_name(), Some("@printf"));
        assert_eq!(
            insts[1].operands,
            vec![Value::Global("@.str".into()), local("%n")]
        );
        assert_eq!(insts[2].callee, Some(Callee::Indirect(local("%fp"))));
        assert!(matches!(
            insts[3].callee,
            Some(Callee::Indirect(Value::Constant(_)))
        ));
        assert!(insts[3].operands.is_empty());
    }

    #[test]
    fn test_constants_keep_their_type() {
        let f = single_function(
            "  store i32 1, ptr %p, align 4\n  store i64 1, ptr %p, align 8\n  call void @__asan_store4(i64 noundef ptrtoint (ptr @buf to i64))\n  %z = ptrtoint ptr null to i64",
        );
        let insts: Vec<_> = f.instructions().collect();
        assert_eq!(insts[0].operands[0], Value::Constant("i32 1".into()));
        assert_eq!(insts[1].operands[0], Value::Constant("i64 1".into()));
        assert_eq!(
            insts[2].operands,
            vec![Value::Constant("i64 ptrtoint (ptr @buf to i64)".into())]
        );
        assert_eq!(insts[3].operands, vec![Value::Constant("ptr null".into())]);
    }

    #[test]
    fn test_blocks_and_comments() {
        let f = single_function(
            "  br label %next ; jump\n\nnext:                                 ; preds = %entry\n  ret void",
        );
        assert_eq!(f.blocks.len(), 2);
        assert_eq!(f.blocks[1].label, "next");
        assert_eq!(f.blocks[1].instructions[0].opcode, Opcode::Other("ret".into()));
    }

    #[test]
    fn test_module_level_names() {
        let module = parse_module(
            "@buf = global [8 x i8] zeroinitializer, align 1\ndeclare void @__asan_init()\n",
        )
        .unwrap();
        assert_eq!(module.globals, vec!["@buf".to_string()]);
        assert_eq!(module.declarations, vec!["@__asan_init".to_string()]);
        assert!(module.functions.is_empty());
    }
}
