//! Conditional and unconditional jumps.
//!
//! The compiler emits few jump shapes, all of them recognised here:
//!
//! - `c; JZ else; A; JMP end; else: B; end:` for `if`/`else`
//! - `top: c; JZ end; S; JMP top; end:` for `while`
//! - `top: S; c; JZ +12; JMP top; end:` for `do`/`while`
//! - `e; {CPTOPSP -4 4; CONST k; EQUAL; JNZ case}*; JMP default; cases; end: MOVSP -4` for
//!   `switch`
//! - `STORE_STATE; JMP after; body; RETN; after:` for a deferred action argument
//!
//! Anything else is reported as unclassified.

use crate::{
    analysis::stack_effect,
    bytecode::{CmdId, Opcode, SKIP_ONE},
    reconstruct::{
        state::{Dispatch, Scope},
        ReconstructState, SubScript,
    },
    script::{AstId, Body, Node},
    types::StackEntry,
    Error, Result,
};

const UNRESOLVED_JUMP: &str = "__unresolved_jump";

impl SubScript<'_> {
    fn unclassified(&self, message: impl Into<String>) -> Error {
        Error::Unclassified {
            position: self.position,
            message: message.into(),
        }
    }

    fn range(&self, node: AstId) -> (u32, u32) {
        self.ast
            .node(node)
            .body()
            .map_or((0, u32::MAX), |b| (b.start, b.end))
    }

    /// Index into `scopes` of the innermost open loop.
    fn innermost_loop(&self) -> Option<usize> {
        self.scopes.iter().rposition(|s| {
            matches!(
                self.ast.node(s.node),
                Node::WhileLoop { .. } | Node::DoLoop { .. }
            )
        })
    }

    /// Innermost open loop or switch.
    fn nearest_breakable(&self) -> Option<AstId> {
        self.scopes
            .iter()
            .rev()
            .map(|s| s.node)
            .find(|node| {
                matches!(
                    self.ast.node(*node),
                    Node::WhileLoop { .. } | Node::DoLoop { .. } | Node::Switch { .. }
                )
            })
    }

    fn open(&mut self, node: Node) -> AstId {
        let height = self.stack.height();
        let id = self.ast.add(node);
        self.emit(id);
        self.scopes.push(Scope { node: id, height });
        id
    }

    /// `true` for a `JZ +12` directly before `jmp`, the tail of a do-while loop.
    fn is_do_tail(&self, jmp: CmdId) -> Result<bool> {
        let tree = self.ctx.tree;
        let Some(prev) = tree.prev_in_sub(jmp) else {
            return Ok(false);
        };
        Ok(tree.kind(prev) == Opcode::Jz
            && tree.instruction(prev).jump_offset() == Some(SKIP_ONE)
            && !self.ctx.data.is_dead(prev)?)
    }

    /// Opens the loops whose backward jumps target `cmd`.
    ///
    /// The farthest backward jump is the latch of the outermost loop; further do-while
    /// tails targeting the same instruction open nested do-while loops. Other backward
    /// jumps are `continue` statements.
    pub(super) fn open_loops(&mut self, cmd: CmdId, position: u32) -> Result<()> {
        let tree = self.ctx.tree;
        let mut latches = Vec::new();
        for &origin in self.ctx.data.origins(cmd)? {
            if tree.kind(origin) == Opcode::Jmp
                && tree.position(origin) > position
                && !self.ctx.data.is_dead(origin)?
            {
                latches.push(origin);
            }
        }
        latches.sort_by_key(|c| std::cmp::Reverse(tree.position(*c)));
        let Some((&outer, inner)) = latches.split_first() else {
            return Ok(());
        };

        let parent_end = self.range(self.current()).1;
        let end = tree.position(outer) + tree.instruction(outer).size();
        if self.scopes.len() > 1 && end > parent_end {
            return Err(self.unclassified(format!(
                "loop ending at {end} escapes its enclosing block"
            )));
        }
        if self.is_do_tail(outer)? {
            self.open(Node::DoLoop {
                condition: None,
                body: Body::new(position, end),
            });
        } else {
            let node = self.open(Node::WhileLoop {
                condition: None,
                body: Body::new(position, end),
            });
            self.awaiting_condition = Some(node);
            self.state = ReconstructState::InWhileCondition;
        }

        for &latch in inner {
            if self.is_do_tail(latch)? {
                let end = tree.position(latch) + tree.instruction(latch).size();
                self.open(Node::DoLoop {
                    condition: None,
                    body: Body::new(position, end),
                });
            }
        }
        Ok(())
    }

    /// `JZ` and `JNZ`.
    pub(super) fn conditional(&mut self, cmd: CmdId) -> Result<()> {
        let tree = self.ctx.tree;
        let position = self.position;
        let Some(destination) = self.ctx.data.destination(cmd)? else {
            return Err(self.unclassified("conditional jump without a destination"));
        };
        let target = tree.position(destination);

        if tree.kind(cmd) == Opcode::Jnz {
            return self.case_dispatch(target);
        }

        if let Some(node) = self.awaiting_condition {
            if self.range(node).1 == target {
                let condition = self.take_value(1)?;
                if let Node::WhileLoop { condition: slot, .. } = self.ast.node_mut(node) {
                    *slot = Some(condition);
                }
                self.ast.adopt(node, condition);
                self.awaiting_condition = None;
                self.state = self.resting_state();
                return Ok(());
            }
        }

        if let Some(index) = self.innermost_loop() {
            let node = self.scopes[index].node;
            let end = self.range(node).1;
            let is_tail = matches!(self.ast.node(node), Node::DoLoop { condition: None, .. })
                && position + SKIP_ONE as u32 == end
                && target == end;
            if is_tail {
                let condition = self.take_value(1)?;
                if let Node::DoLoop { condition: slot, .. } = self.ast.node_mut(node) {
                    *slot = Some(condition);
                }
                self.ast.adopt(node, condition);
                return Ok(());
            }
        }

        let start = position + tree.instruction(cmd).size();
        if target < start {
            return Err(self.unclassified(format!("conditional jump backwards to {target}")));
        }
        let parent_end = self.range(self.current()).1;
        if self.scopes.len() > 1 && target > parent_end {
            return Err(self.unclassified(format!(
                "branch ending at {target} escapes its enclosing block"
            )));
        }
        let condition = self.take_value(1)?;
        self.open(Node::If {
            condition: Some(condition),
            body: Body::new(start, target),
            skip: None,
        });
        Ok(())
    }

    /// `JNZ` of a switch dispatch: compares the subject against one case literal.
    fn case_dispatch(&mut self, target: u32) -> Result<()> {
        let Some(compare) = self.compare.take() else {
            return Err(self.unclassified("JNZ on a non-constant comparison"));
        };
        let matches = self.stack.peek(1) == Some(&StackEntry::Variable(compare.result))
            && self.stack.peek(2) == Some(&compare.subject);
        if !matches {
            return Err(self.unclassified("JNZ on a non-constant comparison"));
        }
        self.stack.pop();
        self.consume(StackEntry::Variable(compare.result));

        let same_subject = self.dispatch.as_ref().map(|d| d.subject == compare.subject);
        match (same_subject, self.dispatch.as_mut()) {
            (Some(true), Some(dispatch)) => dispatch.cases.push((compare.label, target)),
            (Some(_), _) => return Err(self.unclassified("switch dispatch changes its subject")),
            (None, _) => {
                self.dispatch = Some(Dispatch {
                    subject: compare.subject,
                    cases: vec![(compare.label, target)],
                });
            }
        }
        self.state = ReconstructState::InSwitchCases;
        Ok(())
    }

    /// `JMP`
    pub(super) fn jump(&mut self, cmd: CmdId) -> Result<()> {
        let tree = self.ctx.tree;
        let position = self.position;
        let Some(destination) = self.ctx.data.destination(cmd)? else {
            return Err(self.unclassified("jump without a destination"));
        };
        let target = tree.position(destination);
        let next = position + tree.instruction(cmd).size();

        let after_store = tree
            .prev_in_sub(cmd)
            .is_some_and(|prev| matches!(tree.kind(prev), Opcode::StoreState | Opcode::StoreStateAll));
        if after_store {
            let height = self.stack.height();
            let closure = self.ast.add(Node::ActionArg(Body::new(next, target)));
            self.scopes.push(Scope {
                node: closure,
                height,
            });
            self.state = ReconstructState::InActionArgCapture;
            return Ok(());
        }

        if let Some(dispatch) = self.dispatch.take() {
            return self.finish_dispatch(cmd, dispatch, target);
        }

        if target < position {
            return self.backward_jump(target, next);
        }
        if target == next {
            return Ok(());
        }
        self.forward_jump(destination, target, next)
    }

    fn backward_jump(&mut self, target: u32, next: u32) -> Result<()> {
        let Some(index) = self.innermost_loop() else {
            return Err(self.unclassified(format!("backward jump to {target} outside a loop")));
        };
        let node = self.scopes[index].node;
        let (start, end) = self.range(node);
        if target == start && next == end {
            return Ok(());
        }
        if target == start && matches!(self.ast.node(node), Node::WhileLoop { .. }) {
            let statement = self.ast.add(Node::Continue);
            self.emit(statement);
            return Ok(());
        }
        let enclosing = self.scopes[..index]
            .iter()
            .any(|s| self.is_loop(s.node) && self.range(s.node).0 == target);
        if enclosing {
            let comment = self.ast.add(Node::ErrorComment(UNRESOLVED_JUMP.into()));
            self.emit(comment);
            return Ok(());
        }
        Err(self.unclassified(format!("backward jump to {target}")))
    }

    /// End of the body enclosing the innermost open node.
    fn enclosing_end(&self) -> u32 {
        self.scopes
            .len()
            .checked_sub(2)
            .and_then(|index| self.scopes.get(index))
            .map_or(u32::MAX, |scope| self.range(scope.node).1)
    }

    fn is_loop(&self, node: AstId) -> bool {
        matches!(
            self.ast.node(node),
            Node::WhileLoop { .. } | Node::DoLoop { .. }
        )
    }

    fn forward_jump(&mut self, destination: CmdId, target: u32, next: u32) -> Result<()> {
        let breakable = self.nearest_breakable();
        if let Some(node) = breakable {
            if matches!(self.ast.node(node), Node::Switch { .. }) && self.range(node).1 == target {
                let statement = self.ast.add(Node::Break);
                self.emit(statement);
                return Ok(());
            }
        }

        let returns = self.is_return_target(destination);
        if returns && self.pending_return.is_some() {
            let value = self.pending_return.take();
            let statement = self.ast.add(Node::Return(value));
            self.emit(statement);
            return Ok(());
        }

        if let Some(node) = breakable {
            if self.is_loop(node) && self.range(node).1 == target {
                let statement = self.ast.add(Node::Break);
                self.emit(statement);
                return Ok(());
            }
        }

        // An if/else ending the subroutine joins at the epilogue, so its skip jump is
        // return-shaped too. It stays a skip while the else fits the enclosing block.
        let current = self.current();
        let current_end = self.range(current).1;
        let opens_else = current_end == next
            && target > current_end
            && (!returns || target <= self.enclosing_end());
        if opens_else {
            if let Node::If { skip, .. } = self.ast.node_mut(current) {
                if skip.is_none() {
                    *skip = Some(target);
                    return Ok(());
                }
            }
        }

        if returns {
            let statement = self.ast.add(Node::Return(None));
            self.emit(statement);
            return Ok(());
        }

        if let Some(index) = self.innermost_loop() {
            let node = self.scopes[index].node;
            let (start, end) = self.range(node);
            let is_do = matches!(self.ast.node(node), Node::DoLoop { .. });
            if is_do && target > self.position && target + SKIP_ONE as u32 <= end {
                let statement = self.ast.add(Node::Continue);
                self.emit(statement);
                return Ok(());
            }
            let escapes = self.scopes[..=index].iter().any(|s| {
                self.is_loop(s.node) && {
                    let (s_start, s_end) = self.range(s.node);
                    target == s_start || target == s_end
                }
            });
            if escapes || (start < target && target < end) {
                let comment = self.ast.add(Node::ErrorComment(UNRESOLVED_JUMP.into()));
                self.emit(comment);
                return Ok(());
            }
        }
        Err(self.unclassified(format!("forward jump to {target}")))
    }

    /// `true` for a `RETN`, or a `MOVSP` directly before one.
    fn is_return_target(&self, destination: CmdId) -> bool {
        let tree = self.ctx.tree;
        match tree.kind(destination) {
            Opcode::Retn => true,
            Opcode::MovSp => tree
                .next_in_sub(destination)
                .is_some_and(|next| tree.kind(next) == Opcode::Retn),
            _ => false,
        }
    }

    /// Builds the switch once the dispatch ends with its jump to the default case, or to
    /// the end when there is none.
    fn finish_dispatch(&mut self, cmd: CmdId, dispatch: Dispatch, target: u32) -> Result<()> {
        let tree = self.ctx.tree;
        let starts: Vec<u32> = dispatch.cases.iter().map(|(_, start)| *start).collect();
        let Some(end_cmd) = self.switch_end(cmd, &starts, target)? else {
            return Err(self.unclassified("switch without a recognisable end"));
        };
        let end = tree.position(end_cmd);

        let subject = self.peek_expression(dispatch.subject);
        self.consume(dispatch.subject);
        let start = self.position + tree.instruction(cmd).size();
        let switch = self.ast.add(Node::Switch {
            subject,
            body: Body::new(start, end),
        });

        let mut cases: Vec<(Option<AstId>, u32)> = Vec::with_capacity(dispatch.cases.len() + 1);
        for (label, case_start) in dispatch.cases {
            let literal = self.ast.add(Node::Const(label));
            cases.push((Some(literal), case_start));
        }
        if target < end {
            cases.push((None, target));
        }
        cases.sort_by_key(|(_, case_start)| *case_start);
        for (index, (label, case_start)) in cases.iter().enumerate() {
            let case_end = cases
                .iter()
                .skip(index + 1)
                .map(|(_, s)| *s)
                .find(|s| *s > *case_start)
                .unwrap_or(end);
            let case_end = if cases.get(index + 1).is_some_and(|(_, s)| s == case_start) {
                *case_start
            } else {
                case_end
            };
            let case = self.ast.add(Node::SwitchCase {
                label: *label,
                body: Body::new(*case_start, case_end),
            });
            self.ast.append(switch, case);
        }

        self.emit(switch);
        let height = self.stack.height();
        self.scopes.push(Scope {
            node: switch,
            height,
        });
        self.state = self.resting_state();
        Ok(())
    }

    /// The `MOVSP` popping the switch subject.
    ///
    /// Scans forward from the dispatch jump tracking the stack height relative to the
    /// subject. A pop at relative height zero that leads into a return is only a
    /// candidate, since returning from inside a case pops the subject too; the first pop
    /// that does not return wins, otherwise the last candidate.
    fn switch_end(&self, jump: CmdId, starts: &[u32], default: u32) -> Result<Option<CmdId>> {
        let tree = self.ctx.tree;
        let data = self.ctx.data;
        let mut relative: i64 = 0;
        let mut candidate = None;
        let mut cursor = tree.next_in_sub(jump);
        while let Some(cmd) = cursor {
            cursor = tree.next_in_sub(cmd);
            if data.is_dead(cmd)? {
                continue;
            }
            let position = tree.position(cmd);
            if starts.contains(&position) || position == default {
                relative = 0;
            }
            let instruction = tree.instruction(cmd);
            match instruction.opcode {
                Opcode::MovSp if relative == 0 => {
                    let returns = match cursor.map(|next| (next, tree.kind(next))) {
                        Some((_, Opcode::Retn)) => true,
                        Some((next, Opcode::Jmp)) => data
                            .destination(next)?
                            .is_some_and(|d| self.is_return_target(d)),
                        _ => false,
                    };
                    if !returns {
                        return Ok(Some(cmd));
                    }
                    candidate = Some(cmd);
                }
                Opcode::Jmp
                    if tree.prev_in_sub(cmd).is_some_and(|prev| {
                        matches!(tree.kind(prev), Opcode::StoreState | Opcode::StoreStateAll)
                    }) =>
                {
                    cursor = data.destination(cmd)?;
                    continue;
                }
                _ => {}
            }
            let callee_params = match instruction.opcode {
                Opcode::Jsr => self
                    .ctx
                    .graph
                    .target(cmd)
                    .and_then(|sub| self.ctx.states.get(sub.index()))
                    .map(|state| state.param_slot_count()),
                _ => None,
            };
            if let Some(effect) = stack_effect(instruction, self.ctx.catalog, callee_params) {
                relative += effect.net();
            }
        }
        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bytecode::{Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode},
        reconstruct::tests::rebuild,
        Error,
    };

    fn print(b: &mut ParseTreeBuilder, text: &str) {
        b.emit(Instruction::constant(Constant::String(text.into())))
            .emit(Instruction::action(1, 1));
    }

    fn random(b: &mut ParseTreeBuilder) {
        b.emit(Instruction::constant(Constant::Int(2)))
            .emit(Instruction::action(0, 1));
    }

    #[test]
    fn test_if_else() {
        let mut b = ParseTreeBuilder::new();
        let (other, end) = (b.label(), b.label());
        b.subroutine();
        random(&mut b);
        b.jz(other);
        print(&mut b, "a");
        b.jmp(end).place(other);
        print(&mut b, "b");
        b.place(end);
        print(&mut b, "c");
        b.simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    if (Random(2)) {\n        PrintString(\"a\");\n    } else {\n        PrintString(\"b\");\n    }\n    PrintString(\"c\");\n}\n"
        );
    }

    #[test]
    fn test_if_else_at_subroutine_end() {
        let mut b = ParseTreeBuilder::new();
        let (other, end) = (b.label(), b.label());
        b.subroutine();
        random(&mut b);
        b.jz(other);
        print(&mut b, "a");
        b.jmp(end).place(other);
        print(&mut b, "b");
        b.place(end).simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    if (Random(2)) {\n        PrintString(\"a\");\n    } else {\n        PrintString(\"b\");\n    }\n}\n"
        );
    }

    #[test]
    fn test_while_with_break() {
        let mut b = ParseTreeBuilder::new();
        let (top, end) = (b.label(), b.label());
        b.subroutine().place(top);
        random(&mut b);
        b.jz(end);
        print(&mut b, "loop");
        random(&mut b);
        let skip = b.label();
        b.jz(skip).jmp(end).place(skip);
        b.jmp(top).place(end);
        b.simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    while (Random(2)) {\n        PrintString(\"loop\");\n        if (Random(2)) {\n            break;\n        }\n    }\n}\n"
        );
    }

    #[test]
    fn test_do_while() {
        let mut b = ParseTreeBuilder::new();
        let (top, end) = (b.label(), b.label());
        b.subroutine().place(top);
        print(&mut b, "once");
        random(&mut b);
        b.jz(end).jmp(top).place(end);
        b.simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    do {\n        PrintString(\"once\");\n    } while (Random(2));\n}\n"
        );
    }

    #[test]
    fn test_short_circuit_condition() {
        let mut b = ParseTreeBuilder::new();
        let (rhs_done, end) = (b.label(), b.label());
        b.subroutine();
        random(&mut b);
        b.emit(Instruction::cptopsp(-4, 4)).jz(rhs_done);
        b.emit(Instruction::constant(Constant::Int(1)));
        b.emit(Instruction::simple(Opcode::LogAnd, TypeCode::IntInt))
            .place(rhs_done);
        b.jz(end);
        print(&mut b, "both");
        b.place(end).simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    if (Random(2) && 1) {\n        PrintString(\"both\");\n    }\n}\n"
        );
    }

    #[test]
    fn test_switch_with_default() {
        let mut b = ParseTreeBuilder::new();
        let (one, two, three) = (b.label(), b.label(), b.label());
        let (default, end) = (b.label(), b.label());
        b.subroutine();
        random(&mut b);
        for (value, label) in [(1, one), (2, two), (3, three)] {
            b.emit(Instruction::cptopsp(-4, 4))
                .emit(Instruction::constant(Constant::Int(value)))
                .emit(Instruction::simple(Opcode::Equal, TypeCode::IntInt))
                .jnz(label);
        }
        b.jmp(default).place(one);
        print(&mut b, "one");
        b.jmp(end).place(two);
        print(&mut b, "two");
        b.place(three);
        print(&mut b, "three");
        b.jmp(end).place(default);
        print(&mut b, "other");
        b.place(end).emit(Instruction::movsp(-4));
        print(&mut b, "done");
        b.simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    switch (Random(2)) {\n        case 1:\n            PrintString(\"one\");\n            break;\n        case 2:\n            PrintString(\"two\");\n        case 3:\n            PrintString(\"three\");\n            break;\n        default:\n            PrintString(\"other\");\n    }\n    PrintString(\"done\");\n}\n"
        );
    }

    #[test]
    fn test_jump_into_nowhere_is_unclassified() {
        let mut b = ParseTreeBuilder::new();
        let (middle, end) = (b.label(), b.label());
        b.subroutine();
        random(&mut b);
        b.jz(end);
        print(&mut b, "a");
        b.jmp(middle);
        print(&mut b, "b");
        b.place(end);
        print(&mut b, "c");
        b.place(middle);
        print(&mut b, "d");
        b.simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert!(matches!(
            rebuild(&tree, 0),
            Err(Error::Unclassified { .. })
        ));
    }
}
