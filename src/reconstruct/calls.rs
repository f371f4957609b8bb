//! Engine actions, subroutine calls and default arguments.

use crate::{
    bytecode::{CmdId, Instruction},
    reconstruct::{SubScript, UNKNOWN_OPERAND},
    script::{AstId, ExpressionFormatter, Node, VarId, VarKind},
    types::{StackEntry, SubroutineState, Type},
    Error, Result,
};

impl SubScript<'_> {
    /// `ACTION`: pops the arguments, parameter 0 first, and pushes or emits the call.
    pub(super) fn action(&mut self, instruction: &Instruction) -> Result<()> {
        let Some((id, argc)) = instruction.action_operand() else {
            return Err(malformed_error!("ACTION at {} without operands", self.position));
        };
        let catalog = self.ctx.catalog;
        let name = catalog
            .name(id)
            .map_or_else(|| format!("__action_{id}"), str::to_string);
        let params: Vec<Type> = match catalog.param_types(id) {
            Some(params) => params.iter().take(usize::from(argc)).cloned().collect(),
            None => {
                log::debug!(
                    "{}: unknown action {id} at {}, assuming {argc} one-slot arguments",
                    self.ast.signature.name,
                    self.position
                );
                vec![Type::INT; usize::from(argc)]
            }
        };

        let mut args = Vec::with_capacity(params.len());
        for param in &params {
            let arg = if *param == Type::ACTION {
                match self.closures.pop() {
                    Some(closure) => closure,
                    None => self.placeholder(UNKNOWN_OPERAND),
                }
            } else {
                self.take_value(param.slots().max(1))?
            };
            args.push(arg);
        }

        let call = self.ast.add(Node::ActionCall { id, name, args });
        let returns = catalog.return_type(id).cloned().unwrap_or(Type::VOID);
        if returns.slots() == 0 {
            let statement = self.ast.add(Node::ExprStmt(call));
            self.emit(statement);
        } else {
            let width = returns.slots();
            self.push_value(returns, call, width);
        }
        Ok(())
    }

    /// `JSR`
    pub(super) fn call(&mut self, cmd: CmdId) -> Result<()> {
        let Some(callee) = self.ctx.graph.target(cmd) else {
            return Err(Error::Unclassified {
                position: self.position,
                message: "call without a resolved target".into(),
            });
        };
        let state = self.ctx.states.get(callee.index());
        let ranges = state.map(SubroutineState::param_ranges).unwrap_or_default();

        let mut args = Vec::with_capacity(ranges.len());
        for (index, (_, width)) in ranges.iter().enumerate() {
            if self.stack.height() < *width as usize {
                let missing = self.placeholder(&format!("__unresolved_param{index}"));
                args.push(missing);
                continue;
            }
            args.push(self.take_value(*width)?);
        }

        let name = self
            .ctx
            .names
            .get(callee.index())
            .cloned()
            .unwrap_or_else(|| format!("sub{}", callee.index()));
        let call = self.ast.add(Node::SubCall {
            sub: callee,
            name,
            args,
        });

        let returns = state.map_or(0, SubroutineState::return_slots);
        if returns == 0 {
            let statement = self.ast.add(Node::ExprStmt(call));
            self.emit(statement);
            return Ok(());
        }
        self.attach_return(call, returns);
        Ok(())
    }

    /// Records a call result in the declaration of the slot reserved for it.
    ///
    /// The declaration keeps the call until the slot is used: a use moves the call into
    /// the using expression, popping the slot unused turns the declaration into a call
    /// statement.
    fn attach_return(&mut self, call: AstId, width: u32) {
        let height = self.stack.height();
        let width = width as usize;
        let mut slots: Vec<VarId> = Vec::with_capacity(width);
        if height >= width {
            for entry in self.stack.slice(height - width..height) {
                match *entry {
                    StackEntry::Variable(var) if self.is_fresh_slot(var) && !slots.contains(&var) => {
                        slots.push(var);
                    }
                    _ => break,
                }
            }
        }
        if slots.len() != width {
            log::debug!(
                "{}: result of the call at {} has no reserved slot",
                self.ast.signature.name,
                self.position
            );
            let statement = self.ast.add(Node::ExprStmt(call));
            self.emit(statement);
            return;
        }

        let target = match slots.as_slice() {
            [single] => *single,
            members => {
                let Some(aggregate) = self.ast.vars.group(members) else {
                    let statement = self.ast.add(Node::ExprStmt(call));
                    self.emit(statement);
                    return;
                };
                let decls: Vec<AstId> = members
                    .iter()
                    .filter_map(|m| self.ast.vars.get(*m).and_then(|v| v.decl))
                    .collect();
                let decl = self.ast.add(Node::VarDecl {
                    var: aggregate,
                    init: None,
                    fcn_return: false,
                });
                if let Some(first) = decls.first() {
                    self.ast.replace(*first, decl);
                }
                for other in decls.iter().skip(1) {
                    self.ast.detach(*other);
                }
                for member in members {
                    if let Some(var) = self.ast.vars.get_mut(*member) {
                        var.decl = None;
                    }
                }
                if let Some(var) = self.ast.vars.get_mut(aggregate) {
                    var.decl = Some(decl);
                }
                aggregate
            }
        };

        let Some(decl) = self.ast.vars.get(target).and_then(|v| v.decl) else {
            return;
        };
        if let Node::VarDecl {
            init, fcn_return, ..
        } = self.ast.node_mut(decl)
        {
            *init = Some(call);
            *fcn_return = true;
        }
        self.ast.adopt(decl, call);
    }

    /// A local whose declaration is in the current scope and still has no initializer.
    fn is_fresh_slot(&self, var: VarId) -> bool {
        let Some(slot) = self.ast.vars.get(var) else {
            return false;
        };
        if slot.kind != VarKind::Local || slot.parent.is_some() {
            return false;
        }
        let Some(decl) = slot.decl else {
            return false;
        };
        self.ast.parent(decl) == Some(self.current())
            && matches!(self.ast.node(decl), Node::VarDecl { init: None, .. })
    }

    /// Drops trailing action arguments that spell their parameter's default value.
    pub(super) fn omit_default_args(&mut self) {
        let catalog = self.ctx.catalog;
        let formatter = ExpressionFormatter::new(&self.ast);
        let mut trims = Vec::new();
        for id in self.ast.walk() {
            let Node::ActionCall { id: action, args, .. } = self.ast.node(id) else {
                continue;
            };
            let Some(defaults) = catalog.default_values(*action) else {
                continue;
            };
            let mut keep = args.len();
            while keep > 0 {
                let Some(Some(default)) = defaults.get(keep - 1) else {
                    break;
                };
                if formatter.render(args[keep - 1]) != *default {
                    break;
                }
                keep -= 1;
            }
            if keep < args.len() {
                trims.push((id, keep));
            }
        }
        for (id, keep) in trims {
            if let Node::ActionCall { args, .. } = self.ast.node_mut(id) {
                args.truncate(keep);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bytecode::{Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode},
        config::DecompilerConfig,
        reconstruct::tests::{rebuild, rebuild_with},
    };

    fn speak() -> ParseTreeBuilder {
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::constant(Constant::Int(0)))
            .emit(Instruction::constant(Constant::String("hi".into())))
            .emit(Instruction::action(39, 2))
            .simple(Opcode::Retn);
        b
    }

    #[test]
    fn test_default_arguments_omitted() {
        let tree = speak().finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    SpeakString(\"hi\");\n}\n"
        );
    }

    #[test]
    fn test_default_arguments_kept_when_disabled() {
        let tree = speak().finish().unwrap();
        let config = DecompilerConfig {
            omit_default_args: false,
            ..DecompilerConfig::default()
        };
        assert_eq!(
            rebuild_with(&tree, 0, &config).unwrap(),
            "void main() {\n    SpeakString(\"hi\", 0);\n}\n"
        );
    }

    #[test]
    fn test_unknown_action_placeholder_name() {
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::constant(Constant::Int(3)))
            .emit(Instruction::action(900, 1))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    __action_900(3);\n}\n"
        );
    }

    #[test]
    fn test_call_result_moves_into_use() {
        // void main() { PrintString(GetTag(sub1(5))) } with object sub1(int)
        let mut b = ParseTreeBuilder::new();
        let callee = b.label();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Object))
            .emit(Instruction::constant(Constant::Int(5)))
            .jsr(callee)
            .emit(Instruction::action(168, 1))
            .emit(Instruction::action(1, 1))
            .simple(Opcode::Retn);
        b.subroutine_at(callee)
            .emit(Instruction::constant(Constant::Object(0)))
            .emit(Instruction::cpdownsp(-12, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    PrintString(GetTag(sub1(5)));\n}\n"
        );
    }

    #[test]
    fn test_unused_call_result_becomes_statement() {
        let mut b = ParseTreeBuilder::new();
        let callee = b.label();
        b.subroutine()
            .emit(Instruction::constant(Constant::String("x".into())))
            .emit(Instruction::action(1, 1))
            .emit(Instruction::rsadd(TypeCode::Int))
            .jsr(callee)
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        b.subroutine_at(callee)
            .emit(Instruction::constant(Constant::Int(1)))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    PrintString(\"x\");\n    sub1();\n}\n"
        );
        assert_eq!(
            rebuild(&tree, 1).unwrap(),
            "int sub1() {\n    return 1;\n}\n"
        );
    }

    #[test]
    fn test_delayed_action_argument() {
        // DelayCommand(1.0, PrintString("later"));
        let mut b = ParseTreeBuilder::new();
        let after = b.label();
        b.subroutine()
            .emit(Instruction::store_state(0, 0))
            .jmp(after)
            .emit(Instruction::constant(Constant::String("later".into())))
            .emit(Instruction::action(1, 1))
            .simple(Opcode::Retn)
            .place(after)
            .emit(Instruction::constant(Constant::Float(1.0)))
            .emit(Instruction::action(7, 2))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    DelayCommand(1.0, PrintString(\"later\"));\n}\n"
        );
    }
}
