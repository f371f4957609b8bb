//! Stack bookkeeping: literals, copies, assignments, pops and operators.
//!
//! Every value on the reconstructor stack is a [`StackEntry`]. Named variables (locals,
//! parameters, globals, the return slot) stay on the stack for their whole lifetime;
//! intermediate values are temporaries holding the expression that produced them. A value
//! wider than one slot occupies consecutive slots holding the same entry, or the member
//! variables of one aggregate.

use crate::{
    analysis::{binary_operand_slots, binary_result_slots},
    bytecode::{CmdId, Instruction, Opcode, Operand, TypeCode},
    reconstruct::{state::StepTracking, ReconstructState, SubScript, UNKNOWN_OPERAND},
    script::{AstId, BinaryOp, Body, LogicalOp, Node, StepOp, UnaryOp, VarId, VarKind, VarTable, Variable},
    types::{StackEntry, Type},
    Error, Result,
};

use super::state::Compare;

impl SubScript<'_> {
    /// A synthesized stand-in expression.
    pub(super) fn placeholder(&mut self, name: &str) -> AstId {
        self.ast.add(Node::Placeholder(name.to_string()))
    }

    /// Pushes a temporary holding `value` over `width` slots.
    pub(super) fn push_value(&mut self, ty: Type, value: AstId, width: u32) -> VarId {
        let var = self.ast.vars.add(Variable::temp(ty, value));
        for _ in 0..width.max(1) {
            self.stack.push(StackEntry::Variable(var));
        }
        var
    }

    fn is_named(&self, entry: StackEntry) -> bool {
        match entry {
            StackEntry::Variable(var) => self.ast.vars.kind(var) != VarKind::Temp,
            StackEntry::Const { .. } => false,
        }
    }

    /// Type of the value an entry stands for.
    pub(super) fn entry_type(&self, entry: StackEntry) -> Type {
        match entry {
            StackEntry::Const { expr } => match self.ast.node(expr) {
                Node::Const(value) => Type::Simple(value.type_code()),
                _ => Type::INVALID,
            },
            StackEntry::Variable(var) => self
                .ast
                .vars
                .get(var)
                .map_or(Type::INVALID, |v| v.ty.clone()),
        }
    }

    /// Aggregate whose members are exactly `entries`, in slot order.
    fn whole_aggregate(&self, entries: &[StackEntry]) -> Option<VarId> {
        let StackEntry::Variable(first) = *entries.first()? else {
            return None;
        };
        let parent = self.ast.vars.get(first)?.parent?;
        let members = &self.ast.vars.get(parent)?.members;
        let matches = members.len() == entries.len()
            && members
                .iter()
                .zip(entries)
                .all(|(m, e)| *e == StackEntry::Variable(*m));
        matches.then_some(parent)
    }

    /// Groups loose named variables of one storage class into a new aggregate.
    fn group_loose(&mut self, entries: &[StackEntry]) -> Result<Option<VarId>> {
        let mut members = Vec::with_capacity(entries.len());
        for entry in entries {
            let StackEntry::Variable(var) = *entry else {
                return Ok(None);
            };
            if !self.is_named(*entry) || members.contains(&var) {
                return Ok(None);
            }
            members.push(var);
        }
        let Some(first) = members.first() else {
            return Ok(None);
        };
        let kind = self.ast.vars.kind(*first);
        if members.iter().any(|m| self.ast.vars.kind(*m) != kind) {
            return Ok(None);
        }
        let parents: Vec<Option<VarId>> = members
            .iter()
            .map(|m| self.ast.vars.get(*m).and_then(|v| v.parent))
            .collect();
        if parents.iter().any(Option::is_some) {
            return Err(Error::StructNesting {
                position: self.position,
            });
        }
        Ok(self.ast.vars.group(&members))
    }

    /// Aggregate or single named variable covering `entries`.
    fn named_value(&mut self, entries: &[StackEntry]) -> Result<Option<VarId>> {
        match entries {
            [StackEntry::Variable(var)] if self.is_named(entries[0]) => Ok(Some(*var)),
            _ if entries.len() > 1 => match self.whole_aggregate(entries) {
                Some(aggregate) => Ok(Some(aggregate)),
                None => self.group_loose(entries),
            },
            _ => Ok(None),
        }
    }

    /// Pops a value of `width` slots and returns its expression.
    ///
    /// Underflow yields an `__unknown_operand` placeholder without popping.
    pub(super) fn take_value(&mut self, width: u32) -> Result<AstId> {
        let width = width as usize;
        let height = self.stack.height();
        if width == 0 || height < width {
            log::debug!(
                "{}: stack underflow at {} taking {width} slots",
                self.ast.signature.name,
                self.position
            );
            return Ok(self.placeholder(UNKNOWN_OPERAND));
        }
        let entries = self.stack.slice(height - width..height).to_vec();
        if entries.iter().all(|e| *e == entries[0]) {
            return Ok(self.take_entry(entries[0], width));
        }
        if let Some(aggregate) = self.whole_aggregate(&entries) {
            self.stack.truncate(height - width);
            return Ok(self.use_named(aggregate));
        }
        if width == 3 && entries.iter().all(|e| self.entry_type(*e).slots() == 1) {
            let z = self.take_value(1)?;
            let y = self.take_value(1)?;
            let x = self.take_value(1)?;
            return Ok(self.ast.add(Node::VectorLit([x, y, z])));
        }
        if let Some(aggregate) = self.group_loose(&entries)? {
            self.stack.truncate(height - width);
            return Ok(self.use_named(aggregate));
        }
        Err(Error::Unsupported(format!(
            "{width}-slot value at {} assembled from unrelated slots",
            self.position
        )))
    }

    /// Pops `width` slots of one entry and returns its expression.
    fn take_entry(&mut self, entry: StackEntry, width: usize) -> AstId {
        for _ in 0..width {
            self.stack.pop();
        }
        let live = self.stack.iter().any(|e| *e == entry);
        match entry {
            StackEntry::Const { expr } if live => self.ast.duplicate(expr),
            StackEntry::Const { expr } => expr,
            StackEntry::Variable(var) if self.ast.vars.kind(var) == VarKind::Temp => {
                let value = self.ast.vars.get(var).and_then(|v| v.value);
                match value {
                    Some(value) if live => self.ast.duplicate(value),
                    Some(value) => {
                        if let Some(temp) = self.ast.vars.get_mut(var) {
                            temp.consumed = true;
                        }
                        value
                    }
                    None => self.placeholder(UNKNOWN_OPERAND),
                }
            }
            StackEntry::Variable(var) => self.use_named(var),
        }
    }

    /// A use of a named variable. A call result still waiting in its declaration is moved
    /// out of it instead, and the slot variable disappears.
    fn use_named(&mut self, var: VarId) -> AstId {
        if let Some(init) = self.claim_call(var) {
            return init;
        }
        self.commit(var);
        self.ast.add(Node::VarRef(var))
    }

    /// Takes the call result out of a pending declaration of `var`.
    fn claim_call(&mut self, var: VarId) -> Option<AstId> {
        let decl = self.ast.vars.get(var)?.decl?;
        let Node::VarDecl {
            init: Some(init),
            fcn_return: true,
            ..
        } = *self.ast.node(decl)
        else {
            return None;
        };
        self.ast.detach(decl);
        self.discard(var);
        Some(init)
    }

    /// Turns a reserved slot into a nameless temporary.
    fn discard(&mut self, var: VarId) {
        let members = self
            .ast
            .vars
            .get(var)
            .map(|v| v.members.clone())
            .unwrap_or_default();
        for id in std::iter::once(var).chain(members) {
            if let Some(slot) = self.ast.vars.get_mut(id) {
                slot.kind = VarKind::Temp;
                slot.decl = None;
                slot.consumed = true;
            }
        }
    }

    /// Clears the pending call flag of the declaration of `var` or its aggregate.
    fn commit(&mut self, var: VarId) {
        let root = self.ast.vars.root(var);
        for id in [var, root] {
            let Some(decl) = self.ast.vars.get(id).and_then(|v| v.decl) else {
                continue;
            };
            if let Node::VarDecl { fcn_return, .. } = self.ast.node_mut(decl) {
                *fcn_return = false;
            }
        }
    }

    /// Expression standing for `entry` without popping it.
    pub(super) fn peek_expression(&mut self, entry: StackEntry) -> AstId {
        match entry {
            StackEntry::Const { expr } => self.ast.duplicate(expr),
            StackEntry::Variable(var) if self.ast.vars.kind(var) == VarKind::Temp => {
                match self.ast.vars.get(var).and_then(|v| v.value) {
                    Some(value) => self.ast.duplicate(value),
                    None => self.placeholder(UNKNOWN_OPERAND),
                }
            }
            StackEntry::Variable(var) => {
                self.commit(var);
                self.ast.add(Node::VarRef(var))
            }
        }
    }

    /// Marks a temporary as moved into a construct; popping it emits nothing.
    pub(super) fn consume(&mut self, entry: StackEntry) {
        if let StackEntry::Variable(var) = entry {
            if let Some(temp) = self.ast.vars.get_mut(var).filter(|v| v.kind == VarKind::Temp) {
                temp.consumed = true;
            }
        }
    }

    /// `RSADD`: declares a local, or a global inside the globals initializer.
    pub(super) fn reserve(&mut self, code: TypeCode) {
        let kind = if self.ast.kind == crate::script::ScriptKind::Globals {
            VarKind::Global
        } else {
            VarKind::Local
        };
        let ty = Type::Simple(code);
        let var = if ty == Type::VECTOR {
            let members: Vec<VarId> = (0..3)
                .map(|_| self.ast.vars.add(Variable::new(kind, Type::FLOAT)))
                .collect();
            let vector = self.ast.vars.group(&members);
            for member in &members {
                self.stack.push(StackEntry::Variable(*member));
            }
            match vector {
                Some(vector) => vector,
                None => return,
            }
        } else {
            let var = self.ast.vars.add(Variable::new(kind, ty));
            self.stack.push(StackEntry::Variable(var));
            var
        };
        let decl = self.ast.add(Node::VarDecl {
            var,
            init: None,
            fcn_return: false,
        });
        if let Some(slot) = self.ast.vars.get_mut(var) {
            slot.decl = Some(decl);
        }
        self.emit(decl);
    }

    /// `CONST`
    pub(super) fn constant(&mut self, instruction: &Instruction) -> Result<()> {
        let Operand::Const(value) = &instruction.operand else {
            return Err(malformed_error!("CONST at {} without a literal", self.position));
        };
        let expr = self.ast.add(Node::Const(value.clone()));
        self.stack.push(StackEntry::Const { expr });
        Ok(())
    }

    /// Global variables addressed by a BP-relative copy.
    pub(super) fn global_entries(&self, offset: i32, size: u16) -> Vec<StackEntry> {
        let first = self.globals.len() as i64 + i64::from(offset / 4);
        (first..first + i64::from(size / 4))
            .filter_map(|index| usize::try_from(index).ok())
            .filter_map(|index| self.globals.get(index))
            .map(|var| StackEntry::Variable(*var))
            .collect()
    }

    /// `CPTOPSP`
    pub(super) fn copy_top_sp(
        &mut self,
        cmd: CmdId,
        instruction: &Instruction,
        step: Option<StepTracking>,
    ) -> Result<()> {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Err(malformed_error!("CPTOPSP at {} without a stack operand", self.position));
        };
        let Some(range) = self.stack.range(offset, size) else {
            log::debug!(
                "{}: copy from {offset} at {} reaches below the frame",
                self.ast.signature.name,
                self.position
            );
            for _ in 0..size / 4 {
                let expr = self.placeholder(UNKNOWN_OPERAND);
                self.stack.push(StackEntry::Const { expr });
            }
            return Ok(());
        };
        let entries = self.stack.slice(range).to_vec();
        self.copy_entries(cmd, &entries, step)
    }

    /// `CPTOPBP`
    pub(super) fn copy_top_bp(
        &mut self,
        cmd: CmdId,
        instruction: &Instruction,
        step: Option<StepTracking>,
    ) -> Result<()> {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Err(malformed_error!("CPTOPBP at {} without a stack operand", self.position));
        };
        let entries = self.global_entries(offset, size);
        if entries.len() != usize::from(size / 4) {
            log::debug!(
                "{}: global copy from {offset} at {} is out of range",
                self.ast.signature.name,
                self.position
            );
            for _ in 0..size / 4 {
                let expr = self.placeholder(UNKNOWN_OPERAND);
                self.stack.push(StackEntry::Const { expr });
            }
            return Ok(());
        }
        self.copy_entries(cmd, &entries, step)
    }

    fn copy_entries(
        &mut self,
        cmd: CmdId,
        entries: &[StackEntry],
        step: Option<StepTracking>,
    ) -> Result<()> {
        if let (Some(StepTracking::Stepped { statement, target }), [StackEntry::Variable(var)]) =
            (step, entries)
        {
            if *var == target && self.ctx.data.origins(cmd)?.is_empty() {
                self.prefix_step(statement, target);
                return Ok(());
            }
        }

        if entries.iter().all(|e| *e == entries[0]) && !self.is_named(entries[0]) {
            for entry in entries {
                self.stack.push(*entry);
            }
            return Ok(());
        }

        let width = entries.len() as u32;
        if let Some(var) = self.named_value(entries)? {
            self.commit(var);
            let ty = self.ast.vars.get(var).map_or(Type::INVALID, |v| v.ty.clone());
            let value = self.ast.add(Node::VarRef(var));
            let temp = self.push_value(ty, value, width);
            self.step = Some(StepTracking::Copied { temp, source: var });
            return Ok(());
        }

        for entry in entries {
            match *entry {
                StackEntry::Variable(var) if self.is_named(*entry) => {
                    self.commit(var);
                    let ty = self.ast.vars.get(var).map_or(Type::INVALID, |v| v.ty.clone());
                    let value = self.ast.add(Node::VarRef(var));
                    self.push_value(ty, value, 1);
                }
                other => self.stack.push(other),
            }
        }
        Ok(())
    }

    /// `CPDOWNSP`
    pub(super) fn copy_down_sp(&mut self, instruction: &Instruction) -> Result<()> {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Err(malformed_error!("CPDOWNSP at {} without a stack operand", self.position));
        };
        let Some(range) = self.stack.range(offset, size) else {
            log::debug!(
                "{}: copy to {offset} at {} reaches below the frame",
                self.ast.signature.name,
                self.position
            );
            return Ok(());
        };
        let targets = self.stack.slice(range).to_vec();
        self.assign(&targets)
    }

    /// `CPDOWNBP`
    pub(super) fn copy_down_bp(&mut self, instruction: &Instruction) -> Result<()> {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Err(malformed_error!("CPDOWNBP at {} without a stack operand", self.position));
        };
        let targets = self.global_entries(offset, size);
        if targets.len() != usize::from(size / 4) {
            log::debug!(
                "{}: global copy to {offset} at {} is out of range",
                self.ast.signature.name,
                self.position
            );
            return Ok(());
        }
        self.assign(&targets)
    }

    /// Copies the top value down into `targets`; the value stays on the stack as the
    /// assignment expression.
    fn assign(&mut self, targets: &[StackEntry]) -> Result<()> {
        let width = targets.len() as u32;
        let is_return = |tree: &VarTable, entry: &StackEntry| {
            matches!(entry, StackEntry::Variable(var) if tree.kind(*var) == VarKind::Return)
        };
        if !targets.is_empty() && targets.iter().all(|t| is_return(&self.ast.vars, t)) {
            let value = self.take_value(width)?;
            self.pending_return = Some(value);
            let held = self.placeholder(UNKNOWN_OPERAND);
            let temp = self.push_value(self.ast.signature.return_type.clone(), held, width);
            if let Some(temp) = self.ast.vars.get_mut(temp) {
                temp.consumed = true;
            }
            return Ok(());
        }

        let Some(target) = self.named_value(targets)? else {
            return Err(Error::Unsupported(format!(
                "assignment at {} into an intermediate value",
                self.position
            )));
        };
        self.commit(target);
        let value = self.take_value(width)?;
        let place = self.ast.add(Node::VarRef(target));
        let assignment = self.ast.add(Node::ModifyExp {
            target: place,
            value,
        });
        let ty = self.ast.vars.get(target).map_or(Type::INVALID, |v| v.ty.clone());
        self.push_value(ty, assignment, width);
        self.state = ReconstructState::InAssignmentTail;
        Ok(())
    }

    /// `MOVSP`: pops slots, emitting discarded side effects and closing inner scopes whose
    /// locals go out of scope.
    pub(super) fn pop_slots(&mut self, cmd: CmdId, instruction: &Instruction) -> Result<()> {
        let Some(offset) = instruction.offset() else {
            return Err(malformed_error!("MOVSP at {} without an offset", self.position));
        };
        let mut locals = Vec::new();
        for _ in 0..offset.unsigned_abs() / 4 {
            let Some(entry) = self.stack.pop() else {
                log::debug!(
                    "{}: MOVSP at {} pops below the frame",
                    self.ast.signature.name,
                    self.position
                );
                break;
            };
            if self.stack.peek(1) == Some(&entry) {
                continue;
            }
            let StackEntry::Variable(var) = entry else {
                continue;
            };
            match self.ast.vars.kind(var) {
                VarKind::Temp => {
                    let value = self
                        .ast
                        .vars
                        .get(var)
                        .filter(|v| !v.consumed)
                        .and_then(|v| v.value);
                    if let Some(value) = value.filter(|v| self.ast.has_side_effects(*v)) {
                        let statement = self.ast.add(Node::ExprStmt(value));
                        self.emit(statement);
                    }
                }
                VarKind::Local => {
                    let root = self.ast.vars.root(var);
                    if let Some(call) = self.claim_pending(root) {
                        let statement = self.ast.add(Node::ExprStmt(call.1));
                        self.ast.replace(call.0, statement);
                    } else if !locals.contains(&root) {
                        locals.push(root);
                    }
                }
                _ => {}
            }
        }
        if !locals.is_empty() {
            self.close_locals(cmd, &locals)?;
        }
        Ok(())
    }

    /// Declaration and call of a reserved slot whose call result was never used.
    fn claim_pending(&mut self, var: VarId) -> Option<(AstId, AstId)> {
        let decl = self.ast.vars.get(var)?.decl?;
        let Node::VarDecl {
            init: Some(init),
            fcn_return: true,
            ..
        } = *self.ast.node(decl)
        else {
            return None;
        };
        self.ast.parent(decl)?;
        self.discard(var);
        Some((decl, init))
    }

    /// Wraps the declarations of `locals` and everything after them in an inner block when
    /// code continues in the same scope after they are popped.
    fn close_locals(&mut self, cmd: CmdId, locals: &[VarId]) -> Result<()> {
        let current = self.current();
        let end = self.ast.node(current).body().map_or(0, |b| b.end);
        let continues = match self.next_live(cmd)? {
            Some(next) => {
                self.ctx.tree.position(next) < end
                    && !matches!(
                        self.ctx.tree.kind(next),
                        Opcode::Jmp | Opcode::Retn | Opcode::MovSp
                    )
            }
            None => false,
        };
        if !continues {
            return Ok(());
        }
        let children = self.ast.children(current).to_vec();
        let first = children.iter().position(|child| {
            matches!(self.ast.node(*child), Node::VarDecl { var, .. } if locals.contains(&self.ast.vars.root(*var)))
        });
        let Some(first) = first else {
            return Ok(());
        };
        let start = self.position;
        let block_end = self.ctx.tree.position(cmd) + self.ctx.tree.instruction(cmd).size();
        let block = self.ast.add(Node::Block(Body::new(start, block_end)));
        for child in &children[first..] {
            self.ast.detach(*child);
            self.ast.append(block, *child);
        }
        self.ast.insert(current, first, block);
        Ok(())
    }

    /// `INCISP`/`DECISP`/`INCIBP`/`DECIBP` on `target`.
    ///
    /// Right after a copy of the same variable the copy becomes `x++`; otherwise a
    /// statement is emitted, which a following copy may still turn into `++x`.
    pub(super) fn step_variable(
        &mut self,
        opcode: Opcode,
        target: Option<StackEntry>,
        step: Option<StepTracking>,
    ) -> Result<()> {
        let op = match opcode {
            Opcode::IncISp | Opcode::IncIBp => StepOp::Increment,
            _ => StepOp::Decrement,
        };
        let var = match target {
            Some(StackEntry::Variable(var)) if self.ast.vars.kind(var) != VarKind::Temp => var,
            _ => {
                return Err(Error::Unsupported(format!(
                    "increment at {} of an intermediate value",
                    self.position
                )));
            }
        };
        self.commit(var);

        if let Some(StepTracking::Copied { temp, source }) = step {
            if source == var && self.stack.peek(1) == Some(&StackEntry::Variable(temp)) {
                let place = self.ast.add(Node::VarRef(var));
                let expr = self.ast.add(Node::UnaryModExp {
                    op,
                    prefix: false,
                    target: place,
                });
                if let Some(temp) = self.ast.vars.get_mut(temp) {
                    temp.value = Some(expr);
                }
                return Ok(());
            }
        }

        let place = self.ast.add(Node::VarRef(var));
        let expr = self.ast.add(Node::UnaryModExp {
            op,
            prefix: false,
            target: place,
        });
        let statement = self.ast.add(Node::ExprStmt(expr));
        self.emit(statement);
        self.step = Some(StepTracking::Stepped {
            statement,
            target: var,
        });
        self.state = ReconstructState::InPrefixStackOp;
        Ok(())
    }

    /// Turns the increment statement just emitted into a `++x` value.
    fn prefix_step(&mut self, statement: AstId, target: VarId) {
        let Node::ExprStmt(expr) = *self.ast.node(statement) else {
            return;
        };
        self.ast.detach(statement);
        if let Node::UnaryModExp { prefix, .. } = self.ast.node_mut(expr) {
            *prefix = true;
        }
        let ty = self.ast.vars.get(target).map_or(Type::INT, |v| v.ty.clone());
        self.push_value(ty, expr, 1);
    }

    /// `DESTRUCT`: member access on an aggregate value.
    pub(super) fn destruct(&mut self, instruction: &Instruction) -> Result<()> {
        let Operand::Destruct { size, offset, keep } = instruction.operand else {
            return Err(malformed_error!("DESTRUCT at {} without operands", self.position));
        };
        let (count, skip, kept) = (u32::from(size) / 4, u32::from(offset) / 4, u32::from(keep) / 4);
        let ty = self
            .stack
            .peek(1)
            .copied()
            .map_or(Type::INVALID, |entry| self.entry_type(entry));
        let member = ty.members().and_then(|members| {
            let mut slot = 0;
            for (index, member) in members.iter().enumerate() {
                if slot == skip && member.slots().max(1) == kept {
                    return Some((VarTable::member_name(&ty, index), member.clone()));
                }
                slot += member.slots();
            }
            None
        });
        let Some((field, member_ty)) = member else {
            return Err(Error::Unsupported(format!(
                "member extraction at {} from a value of type {ty}",
                self.position
            )));
        };
        let base = self.take_value(count)?;
        let access = self.ast.add(Node::Member { base, field });
        self.push_value(member_ty, access, kept);
        Ok(())
    }

    /// Arithmetic, bitwise, comparison and logical operators.
    pub(super) fn binary(&mut self, instruction: &Instruction) -> Result<()> {
        let Some((left, right)) = binary_operand_slots(instruction) else {
            return Err(Error::Unsupported(format!(
                "{instruction} at {} has no operand types",
                self.position
            )));
        };
        let subject = self.stack.peek(right as usize + 1).copied();
        let rhs = self.take_value(right)?;
        let lhs = self.take_value(left)?;
        let node = if let Some(op) = LogicalOp::from_opcode(instruction.opcode) {
            Node::ConditionalExp { op, lhs, rhs }
        } else if let Some(op) = BinaryOp::from_opcode(instruction.opcode) {
            Node::BinaryExp { op, lhs, rhs }
        } else {
            return Err(Error::Unsupported(format!(
                "{instruction} at {} is not an operator",
                self.position
            )));
        };
        let expr = self.ast.add(node);
        let ty = match instruction.opcode {
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                Type::Simple(instruction.ty.arithmetic_result())
            }
            _ => Type::INT,
        };
        let result = self.push_value(ty, expr, binary_result_slots(instruction));

        self.compare = None;
        if instruction.opcode == Opcode::Equal && left == 1 {
            if let (Node::Const(label), Some(subject)) = (self.ast.node(rhs), subject) {
                self.compare = Some(Compare {
                    result,
                    subject,
                    label: label.clone(),
                });
            }
        }
        Ok(())
    }

    /// `NEG`, `NOT` and `COMP`.
    pub(super) fn unary(&mut self, instruction: &Instruction) -> Result<()> {
        let Some(op) = UnaryOp::from_opcode(instruction.opcode) else {
            return Err(Error::Unsupported(format!(
                "{instruction} at {} is not an operator",
                self.position
            )));
        };
        let operand = self.take_value(1)?;
        let expr = self.ast.add(Node::UnaryExp { op, operand });
        let ty = match op {
            UnaryOp::Negate if instruction.ty.slots() == 1 => Type::Simple(instruction.ty),
            _ => Type::INT,
        };
        self.push_value(ty, expr, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        bytecode::{Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode},
        reconstruct::tests::rebuild,
        Error,
    };

    #[test]
    fn test_operator_precedence_from_stack_order() {
        // int x; x = (1 + 2) * 3;
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Int))
            .emit(Instruction::constant(Constant::Int(1)))
            .emit(Instruction::constant(Constant::Int(2)))
            .emit(Instruction::simple(Opcode::Add, TypeCode::IntInt))
            .emit(Instruction::constant(Constant::Int(3)))
            .emit(Instruction::simple(Opcode::Mul, TypeCode::IntInt))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    int int1;\n    int1 = (1 + 2) * 3;\n}\n"
        );
    }

    #[test]
    fn test_postfix_and_prefix_increment() {
        // int x; int y; y = x++; ++x; y = x;
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Int))
            .emit(Instruction::rsadd(TypeCode::Int))
            .emit(Instruction::cptopsp(-8, 4))
            .emit(Instruction::step(Opcode::IncISp, -12))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::step(Opcode::IncISp, -8))
            .emit(Instruction::cptopsp(-8, 4))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-8))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    int int1;\n    int int2;\n    int2 = int1++;\n    int2 = ++int1;\n}\n"
        );
    }

    #[test]
    fn test_vector_member_access() {
        // float f; f = GetPosition(OBJECT_SELF).y;
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Float))
            .emit(Instruction::constant(Constant::Object(0)))
            .emit(Instruction::action(27, 1))
            .emit(Instruction::destruct(12, 4, 4))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-4))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    float float1;\n    float1 = GetPosition(OBJECT_SELF).y;\n}\n"
        );
    }

    #[test]
    fn test_inner_scope_block() {
        // { int x; x = 1; } PrintString("after");
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Int))
            .emit(Instruction::constant(Constant::Int(1)))
            .emit(Instruction::cpdownsp(-8, 4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::movsp(-4))
            .emit(Instruction::constant(Constant::String("after".into())))
            .emit(Instruction::action(1, 1))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert_eq!(
            rebuild(&tree, 0).unwrap(),
            "void main() {\n    {\n        int int1;\n        int1 = 1;\n    }\n    PrintString(\"after\");\n}\n"
        );
    }

    #[test]
    fn test_partial_vector_copy_is_struct_nesting() {
        // vector v; copies v.y and v.z as one 8-byte value
        let mut b = ParseTreeBuilder::new();
        b.subroutine()
            .emit(Instruction::rsadd(TypeCode::Vector))
            .emit(Instruction::cptopsp(-8, 8))
            .emit(Instruction::movsp(-8))
            .emit(Instruction::movsp(-12))
            .simple(Opcode::Retn);
        let tree = b.finish().unwrap();
        assert!(matches!(
            rebuild(&tree, 0),
            Err(Error::StructNesting { .. })
        ));
    }
}
