//! Abstract type stack simulation along one execution path.
//!
//! The simulator models the VM stack as 4-byte slots relative to the subroutine entry.
//! Slots the subroutine pushes live in a [`LocalTypeStack`]; slots the caller pushed before
//! the call (parameters, then the return slot) are addressed as [`TypeSlot::BelowEntry`]
//! with `k = 0` being the top slot at entry. Reads of below-entry slots yield symbolic
//! values whose type is learned from the context they are used in; writes into them are
//! recorded and decide the return type at `RETN`.

use std::collections::BTreeMap;

use crate::{
    analysis::{binary_operand_slots, CodeState},
    bytecode::{CmdId, Instruction, Opcode, Operand, SubId, TypeCode},
    inference::InferenceContext,
    types::{LocalTypeStack, SubroutineState, Type, TypeSlot},
    Result,
};

/// What the walker does after one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Continue with the next instruction in the subroutine
    Next,
    /// Continue at the given instruction
    Goto(CmdId),
    /// A conditional jump; the walker decides which way to go
    Branch(CmdId),
    /// `RETN` reached
    Return,
    /// `SAVEBP` reached while simulating the globals initializer
    SaveBp,
    /// The path needs the prototype of a subroutine that is not prototyped yet
    Blocked(SubId),
    /// The path is inconsistent and cannot produce a prototype
    Fail(String),
}

/// Type evidence for a callee's parameter slot, observed at a call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Refinement {
    pub callee: SubId,
    pub slot: u32,
    pub ty: Type,
}

/// Prototype facts produced by a completed path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct WalkOutcome {
    pub param_slots: Vec<Type>,
    pub groups: Vec<(u32, u32)>,
    pub return_type: Type,
    pub return_depth: Option<u32>,
    pub refinements: Vec<Refinement>,
    pub snapshots: Vec<(CmdId, i32)>,
}

/// Slots above and below the subroutine entry.
#[derive(Debug, Clone, Default)]
struct TypeFrame {
    local: LocalTypeStack,
    /// Below-entry slots popped so far
    below: u32,
}

impl TypeFrame {
    fn height(&self) -> i64 {
        self.local.height() as i64 - i64::from(self.below)
    }

    fn push(&mut self, slot: TypeSlot) {
        self.local.push(slot);
    }

    fn push_type(&mut self, ty: &Type) {
        for member in ty.flatten() {
            self.local.push(TypeSlot::Known(member));
        }
    }

    fn pop(&mut self) -> TypeSlot {
        match self.local.pop() {
            Some(slot) => slot,
            None => {
                self.below += 1;
                TypeSlot::BelowEntry(self.below - 1)
            }
        }
    }

    /// Slot at a negative byte offset from the top.
    fn resolve(&self, offset_slots: i64) -> Address {
        let absolute = self.height() + offset_slots;
        if absolute >= -i64::from(self.below) {
            Address::Local((absolute + i64::from(self.below)) as usize)
        } else {
            Address::Below((-absolute - 1) as u32)
        }
    }

    fn read(&self, address: Address) -> TypeSlot {
        match address {
            Address::Local(index) => self.local.at(index).cloned().unwrap_or(TypeSlot::Unknown),
            Address::Below(k) => TypeSlot::BelowEntry(k),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Address {
    Local(usize),
    Below(u32),
}

/// Forward type simulator for one path through one subroutine.
pub(crate) struct TypeSimulator<'a> {
    ctx: &'a InferenceContext<'a>,
    states: &'a [SubroutineState],
    sub: SubId,
    frame: TypeFrame,
    /// Types learned for below-entry slots from the contexts they were used in
    evidence: BTreeMap<u32, Type>,
    /// Values written into below-entry slots
    writes: BTreeMap<u32, TypeSlot>,
    groups: Vec<(u32, u32)>,
    refinements: Vec<Refinement>,
    snapshots: Vec<(CmdId, i32)>,
}

impl<'a> TypeSimulator<'a> {
    pub(crate) fn new(ctx: &'a InferenceContext<'a>, states: &'a [SubroutineState], sub: SubId) -> Self {
        TypeSimulator {
            ctx,
            states,
            sub,
            frame: TypeFrame::default(),
            evidence: BTreeMap::new(),
            writes: BTreeMap::new(),
            groups: Vec::new(),
            refinements: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    /// Current stack height relative to the entry.
    pub(crate) fn height(&self) -> i64 {
        self.frame.height()
    }

    /// The local slots as known types, `INVALID` where unknown.
    pub(crate) fn local_types(&self) -> Vec<Type> {
        self.frame
            .local
            .iter()
            .map(|slot| match slot {
                TypeSlot::Known(ty) => ty.clone(),
                TypeSlot::BelowEntry(_) | TypeSlot::Unknown => Type::INVALID,
            })
            .collect()
    }

    fn note(&mut self, slot: &TypeSlot, ty: &Type) {
        if let TypeSlot::BelowEntry(k) = slot {
            if ty.is_known() && ty.slots() == 1 {
                self.evidence.entry(*k).or_insert_with(|| ty.clone());
            }
        }
    }

    fn pop_expecting(&mut self, ty: &Type) {
        for member in ty.flatten().iter().rev() {
            let slot = self.frame.pop();
            self.note(&slot, member);
        }
    }

    fn unify(&mut self, a: &TypeSlot, b: &TypeSlot) {
        if let Some(ty) = b.known().cloned() {
            self.note(a, &ty);
        }
        if let Some(ty) = a.known().cloned() {
            self.note(b, &ty);
        }
    }

    /// Simulates one instruction.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NodeNotVisited`] when the side table is incomplete.
    pub(crate) fn step(&mut self, cmd: CmdId, globals_mode: bool) -> Result<Flow> {
        let height = self.frame.height();
        self.snapshots.push((cmd, height as i32));

        let ctx = self.ctx;
        let instruction = ctx.tree.instruction(cmd);
        let flow = match instruction.opcode {
            Opcode::RsAdd => {
                self.frame.push_type(&Type::Simple(instruction.ty));
                Flow::Next
            }
            Opcode::Const => {
                self.frame.push(TypeSlot::Known(Type::Simple(instruction.ty)));
                Flow::Next
            }
            Opcode::CpTopSp => self.copy_to_top(instruction),
            Opcode::CpDownSp => self.copy_down(instruction),
            Opcode::CpTopBp => {
                let Some((offset, size)) = instruction.stack_operand() else {
                    return Ok(Flow::Fail("CPTOPBP without stack operand".into()));
                };
                let count = size as i64 / 4;
                let first = self.ctx.globals.len() as i64 + i64::from(offset / 4);
                for index in first..first + count {
                    let slot = usize::try_from(index)
                        .ok()
                        .and_then(|i| self.ctx.globals.get(i))
                        .filter(|ty| ty.is_known())
                        .map_or(TypeSlot::Unknown, |ty| TypeSlot::Known(ty.clone()));
                    self.frame.push(slot);
                }
                Flow::Next
            }
            Opcode::CpDownBp => {
                if let Some((offset, size)) = instruction.stack_operand() {
                    let count = size as i64 / 4;
                    let first = self.ctx.globals.len() as i64 + i64::from(offset / 4);
                    for (i, index) in (first..first + count).enumerate() {
                        let global = usize::try_from(index).ok().and_then(|g| self.ctx.globals.get(g));
                        let source = self.frame.read(self.frame.resolve(i as i64 - count));
                        if let Some(ty) = global.cloned() {
                            self.note(&source, &ty);
                        }
                    }
                }
                Flow::Next
            }
            Opcode::MovSp => {
                let Some(offset) = instruction.offset() else {
                    return Ok(Flow::Fail("MOVSP without offset".into()));
                };
                for _ in 0..offset.unsigned_abs() / 4 {
                    self.frame.pop();
                }
                Flow::Next
            }
            Opcode::Action => self.action(instruction),
            Opcode::Jsr => self.call(cmd)?,
            Opcode::Jmp => {
                let destination = self.destination(cmd)?;
                match destination {
                    Some(dest) if self.ctx.tree.position(dest) > self.ctx.tree.position(cmd) => {
                        Flow::Goto(dest)
                    }
                    Some(_) => Flow::Next,
                    None => Flow::Fail("unresolved jump".into()),
                }
            }
            Opcode::Jz | Opcode::Jnz => {
                let slot = self.frame.pop();
                self.note(&slot, &Type::INT);
                if self.ctx.data.state(cmd)? == CodeState::LogOr {
                    // Both outcomes rejoin with the same height.
                    Flow::Next
                } else {
                    Flow::Branch(cmd)
                }
            }
            Opcode::Retn => Flow::Return,
            Opcode::Destruct => match instruction.operand {
                Operand::Destruct { size, offset, keep } => {
                    let ok = self.frame.local.destructure(
                        size as usize / 4,
                        offset as usize / 4,
                        keep as usize / 4,
                    );
                    if ok {
                        Flow::Next
                    } else {
                        Flow::Fail("DESTRUCT reaches below the entry".into())
                    }
                }
                _ => Flow::Fail("DESTRUCT without operand".into()),
            },
            Opcode::IncISp | Opcode::DecISp => {
                if let Some(offset) = instruction.offset() {
                    let slot = self.frame.read(self.frame.resolve(i64::from(offset / 4)));
                    self.note(&slot, &Type::INT);
                }
                Flow::Next
            }
            Opcode::SaveBp if globals_mode => Flow::SaveBp,
            Opcode::Neg => {
                let ty = Type::Simple(instruction.ty);
                let slot = self.frame.pop();
                self.note(&slot, &ty);
                self.frame.push(TypeSlot::Known(ty));
                Flow::Next
            }
            Opcode::Not | Opcode::Comp => {
                let slot = self.frame.pop();
                self.note(&slot, &Type::INT);
                self.frame.push(TypeSlot::Known(Type::INT));
                Flow::Next
            }
            op if op.is_binary() => self.binary(instruction),
            _ => Flow::Next,
        };
        Ok(flow)
    }

    fn destination(&self, cmd: CmdId) -> Result<Option<CmdId>> {
        self.ctx.data.destination(cmd)
    }

    fn copy_to_top(&mut self, instruction: &Instruction) -> Flow {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Flow::Fail("CPTOPSP without stack operand".into());
        };
        let count = i64::from(size / 4);
        let first = i64::from(offset / 4);
        let addresses: Vec<Address> = (first..first + count)
            .map(|o| self.frame.resolve(o))
            .collect();

        let below: Vec<u32> = addresses
            .iter()
            .filter_map(|a| match a {
                Address::Below(k) => Some(*k),
                Address::Local(_) => None,
            })
            .collect();
        if count > 1 && below.len() as i64 == count {
            if let Some(&low) = below.iter().min() {
                let group = (low, count as u32);
                if !self.groups.contains(&group) {
                    self.groups.push(group);
                }
            }
        }

        let slots: Vec<TypeSlot> = addresses.iter().map(|a| self.frame.read(*a)).collect();
        for slot in slots {
            self.frame.push(slot);
        }
        Flow::Next
    }

    fn copy_down(&mut self, instruction: &Instruction) -> Flow {
        let Some((offset, size)) = instruction.stack_operand() else {
            return Flow::Fail("CPDOWNSP without stack operand".into());
        };
        let count = i64::from(size / 4);
        let first = i64::from(offset / 4);
        for i in 0..count {
            let source = self.frame.read(self.frame.resolve(i - count));
            let target = self.frame.resolve(first + i);
            let current = self.frame.read(target);
            self.unify(&source, &current);
            match target {
                Address::Local(index) => {
                    if let Some(slot) = self.frame.local.at_mut(index) {
                        if !matches!(slot, TypeSlot::Known(ty) if ty.is_known()) {
                            *slot = source.clone();
                        }
                    }
                }
                Address::Below(k) => {
                    self.writes.insert(k, source.clone());
                }
            }
        }
        Flow::Next
    }

    fn action(&mut self, instruction: &Instruction) -> Flow {
        let Some((id, argc)) = instruction.action_operand() else {
            return Flow::Fail("ACTION without operand".into());
        };
        let (Some(params), Some(returns)) =
            (self.ctx.catalog.param_types(id), self.ctx.catalog.return_type(id))
        else {
            return Flow::Fail(format!("action {id} is not in the catalog"));
        };
        let params: Vec<Type> = params.iter().take(argc as usize).cloned().collect();
        let returns = returns.clone();
        for param in &params {
            if *param == Type::ACTION {
                continue;
            }
            self.pop_expecting(param);
        }
        self.frame.push_type(&returns);
        Flow::Next
    }

    fn call(&mut self, cmd: CmdId) -> Result<Flow> {
        let Some(callee) = self.ctx.graph.target(cmd) else {
            return Ok(Flow::Fail("call into the middle of a subroutine".into()));
        };
        let states = self.states;
        let Some(state) = states.get(callee.index()) else {
            return Ok(Flow::Fail("call to an unknown subroutine".into()));
        };
        if callee == self.sub || !state.is_prototyped() {
            return Ok(Flow::Blocked(callee));
        }

        for (slot, expected) in state.param_slots.iter().enumerate() {
            let arg = self.frame.pop();
            if expected.is_known() {
                self.note(&arg, expected);
            } else if let TypeSlot::Known(ty) = &arg {
                if ty.is_known() {
                    self.refinements.push(Refinement {
                        callee,
                        slot: slot as u32,
                        ty: ty.clone(),
                    });
                }
            }
        }

        // The caller's reserved return slots now hold the result.
        let returns = state.return_type.flatten();
        let top = self.frame.local.height();
        if top >= returns.len() {
            for (i, ty) in returns.iter().enumerate() {
                if let Some(slot) = self.frame.local.at_mut(top - returns.len() + i) {
                    if !matches!(slot, TypeSlot::Known(t) if t.is_known()) && ty.is_known() {
                        *slot = TypeSlot::Known(ty.clone());
                    }
                }
            }
        }
        Ok(Flow::Next)
    }

    fn binary(&mut self, instruction: &Instruction) -> Flow {
        if instruction.ty == TypeCode::StructStruct {
            let Some((_, width)) = binary_operand_slots(instruction) else {
                return Flow::Fail("struct comparison without size".into());
            };
            let rhs: Vec<TypeSlot> = (0..width).map(|_| self.frame.pop()).collect();
            for r in &rhs {
                let l = self.frame.pop();
                self.unify(&l, r);
            }
            self.frame.push(TypeSlot::Known(Type::INT));
            return Flow::Next;
        }

        let Some((left, right)) = instruction.ty.operands() else {
            return Flow::Fail(format!(
                "{} with non-compound type {}",
                instruction.opcode.mnemonic(),
                instruction.ty.name()
            ));
        };
        self.pop_expecting(&Type::Simple(right));
        self.pop_expecting(&Type::Simple(left));

        let result = match instruction.opcode {
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                Type::Simple(instruction.ty.arithmetic_result())
            }
            _ => Type::INT,
        };
        self.frame.push_type(&result);
        Flow::Next
    }

    /// Finishes a path that reached `RETN`.
    ///
    /// # Returns
    ///
    /// The prototype facts, or a failure reason when the height at the return does not
    /// describe a callable frame.
    pub(crate) fn finish(self) -> std::result::Result<WalkOutcome, String> {
        let height = self.frame.height();
        if height > 0 {
            return Err(format!("{height} slots left on the stack at return"));
        }
        let nparams = (-height) as u32;

        let resolve = |slot: &TypeSlot| -> Type {
            match slot {
                TypeSlot::Known(ty) => ty.clone(),
                TypeSlot::BelowEntry(k) => self.evidence.get(k).cloned().unwrap_or(Type::INVALID),
                TypeSlot::Unknown => Type::INVALID,
            }
        };

        let param_slots: Vec<Type> = (0..nparams)
            .map(|k| {
                self.evidence
                    .get(&k)
                    .cloned()
                    .or_else(|| self.writes.get(&k).map(resolve).filter(Type::is_known))
                    .unwrap_or(Type::INVALID)
            })
            .collect();

        let (return_type, return_depth) = match self.writes.keys().copied().filter(|k| *k >= nparams).max() {
            Some(deepest) => {
                let members: Vec<Type> = (nparams..=deepest)
                    .rev()
                    .map(|k| self.writes.get(&k).map_or(Type::INVALID, resolve))
                    .collect();
                let ty = if members.len() == 1 {
                    members.into_iter().next().unwrap_or(Type::INVALID)
                } else {
                    Type::structure(members)
                };
                (ty, Some(nparams))
            }
            None => (Type::VOID, None),
        };

        let groups = self
            .groups
            .iter()
            .copied()
            .filter(|(first, count)| first + count <= nparams)
            .collect();

        Ok(WalkOutcome {
            param_slots,
            groups,
            return_type,
            return_depth,
            refinements: self.refinements,
            snapshots: self.snapshots,
        })
    }
}
