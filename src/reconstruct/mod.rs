//! Control-flow reconstruction.
//!
//! [`ControlFlowReconstructor`] replays the live instructions of one subroutine against an
//! abstract stack of [`StackEntry`] values and rebuilds a [`ScriptTree`] from the shapes the
//! compiler emits. Expressions are assembled on the stack as temporaries; statements are
//! appended to the innermost open scope. A scope closes when the walk reaches the end of
//! its byte range.
//!
//! # Architecture
//!
//! The per-subroutine walk is split by instruction family:
//!
//! - `operands` - Literals, copies, assignments, pops and operators
//! - `calls` - Engine actions, subroutine calls and deferred action arguments
//! - `jumps` - Conditional and unconditional jumps, loops and switches
//!
//! The walk keeps a [`ReconstructState`] describing what it expects next. States that only
//! last one instruction (assignment tails and increment statements) fall back to the
//! resting state of the enclosing construct afterwards.
//!
//! # Errors
//!
//! A subroutine whose shape cannot be classified fails with [`Error::Unclassified`],
//! [`Error::Unsupported`] or [`Error::StructNesting`]. The caller decides how to render
//! the failure; other subroutines are unaffected.

mod calls;
mod jumps;
mod operands;
mod state;

pub use state::ReconstructState;

use state::{Compare, Dispatch, Scope, StepTracking};

use crate::{
    analysis::{CallGraph, CodeState, NodeAnalysisData},
    bytecode::{ActionCatalog, CmdId, Opcode, ParseTree, SubId},
    config::DecompilerConfig,
    inference::ProgramLayout,
    script::{AstId, Body, Node, ScriptKind, ScriptTree, Signature, VarId, VarKind, Variable},
    types::{LocalVarStack, StackEntry, SubroutineState, Type},
    Error, Result,
};

/// Name of the expression synthesized for a missing operand.
pub(crate) const UNKNOWN_OPERAND: &str = "__unknown_operand";

/// Read-only inputs shared by every subroutine reconstruction.
#[derive(Clone, Copy)]
pub struct ReconstructContext<'a> {
    /// Instruction tree
    pub tree: &'a ParseTree,
    /// Analysis side table
    pub data: &'a NodeAnalysisData,
    /// Call graph
    pub graph: &'a CallGraph,
    /// Engine action signatures
    pub catalog: &'a dyn ActionCatalog,
    /// Inferred prototypes, indexed by [`SubId`]
    pub states: &'a [SubroutineState],
    /// Types of the global slots, bottom first
    pub globals: &'a [Type],
    /// Program entry layout
    pub layout: &'a ProgramLayout,
    /// Source name of every subroutine, indexed by [`SubId`]
    pub names: &'a [String],
    /// Run configuration
    pub config: &'a DecompilerConfig,
}

/// Rebuilds structured script trees from analyzed subroutines.
pub struct ControlFlowReconstructor<'a> {
    ctx: ReconstructContext<'a>,
}

impl<'a> ControlFlowReconstructor<'a> {
    /// Creates a reconstructor over an analyzed and typed program.
    #[must_use]
    pub fn new(ctx: ReconstructContext<'a>) -> Self {
        ControlFlowReconstructor { ctx }
    }

    /// Shared inputs.
    #[must_use]
    pub fn context(&self) -> &ReconstructContext<'a> {
        &self.ctx
    }

    /// Reconstructs one subroutine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unclassified`], [`Error::Unsupported`] or [`Error::StructNesting`]
    /// when the subroutine contains a shape that cannot be structured, and
    /// [`Error::NodeNotVisited`] when the side table is incomplete.
    pub fn reconstruct(&self, sub: SubId) -> Result<ScriptTree> {
        let mut script = SubScript::new(&self.ctx, sub);
        script.run()?;
        Ok(script.finish())
    }

    /// A tree holding only the signature of `sub`, used to render a subroutine whose body
    /// failed to reconstruct.
    #[must_use]
    pub fn skeleton(&self, sub: SubId) -> ScriptTree {
        SubScript::new(&self.ctx, sub).finish()
    }
}

/// What closing a scope entails.
enum Closing {
    /// An `If` with a skip jump opens its else branch
    Else(u32),
    /// A loop whose condition was never found
    Unconditioned,
    /// A deferred action argument becomes available to the next action call
    Closure,
    Plain,
}

/// Walk state of one subroutine.
struct SubScript<'a> {
    ctx: &'a ReconstructContext<'a>,
    sub: SubId,
    ast: ScriptTree,
    stack: LocalVarStack,
    scopes: Vec<Scope>,
    state: ReconstructState,
    /// Global variables by slot, bottom first
    globals: Vec<VarId>,
    /// Value copied into the return slot, waiting for the jump or `RETN` that returns it
    pending_return: Option<AstId>,
    /// Completed deferred action arguments, innermost last
    closures: Vec<AstId>,
    /// While loop whose condition has not been attached yet
    awaiting_condition: Option<AstId>,
    dispatch: Option<Dispatch>,
    compare: Option<Compare>,
    step: Option<StepTracking>,
    position: u32,
}

impl<'a> SubScript<'a> {
    fn new(ctx: &'a ReconstructContext<'a>, sub: SubId) -> Self {
        let tree = ctx.tree;
        let commands = tree.children(sub);
        let start = commands.first().map_or(0, |c| tree.position(*c));
        let end = commands
            .last()
            .map_or(start, |c| tree.position(*c) + tree.instruction(*c).size());
        let kind = if Some(sub) == ctx.layout.globals {
            ScriptKind::Globals
        } else {
            ScriptKind::Function
        };
        let state = ctx.states.get(sub.index());
        let signature = Signature {
            name: ctx
                .names
                .get(sub.index())
                .cloned()
                .unwrap_or_else(|| format!("sub{}", sub.index())),
            return_type: state.map_or(Type::VOID, |s| s.return_type.clone()),
            params: Vec::new(),
        };
        let mut ast = ScriptTree::new(sub, kind, signature, start, end);
        ast.indent = ctx.config.indent.clone();
        let root = ast.root();

        let mut script = SubScript {
            ctx,
            sub,
            ast,
            stack: LocalVarStack::new(),
            scopes: vec![Scope {
                node: root,
                height: 0,
            }],
            state: ReconstructState::Normal,
            globals: Vec::new(),
            pending_return: None,
            closures: Vec::new(),
            awaiting_condition: None,
            dispatch: None,
            compare: None,
            step: None,
            position: start,
        };
        if kind == ScriptKind::Function {
            for ty in ctx.globals {
                let var = script.ast.vars.add(Variable::new(VarKind::Global, ty.clone()));
                script.globals.push(var);
            }
            if let Some(state) = state {
                script.seed_frame(state);
            }
        }
        script
    }

    /// Pushes the return slot and parameters the caller left below the entry.
    fn seed_frame(&mut self, state: &SubroutineState) {
        let returns = state.return_type.flatten();
        if !returns.is_empty() {
            let members: Vec<VarId> = returns
                .iter()
                .map(|ty| self.ast.vars.add(Variable::new(VarKind::Return, ty.clone())))
                .collect();
            if members.len() > 1 {
                // Members reach the aggregate through `parent`
                self.ast.vars.aggregate(&members);
            }
            for member in members {
                self.stack.push(StackEntry::Variable(member));
            }
        }

        // Created first to last for naming, pushed last to first as the caller did.
        let ranges = state.param_ranges();
        let mut params = Vec::with_capacity(state.params.len());
        let mut slots = Vec::with_capacity(state.params.len());
        for (index, param) in state.params.iter().enumerate() {
            let width = ranges.get(index).map_or(1, |(_, w)| *w);
            let flat = param.flatten();
            if width > 1 && flat.len() == width as usize {
                let members: Vec<VarId> = flat
                    .iter()
                    .map(|ty| self.ast.vars.add(Variable::new(VarKind::Param, ty.clone())))
                    .collect();
                params.push(self.ast.vars.aggregate(&members));
                slots.push(members);
            } else {
                let var = self.ast.vars.add(Variable::new(VarKind::Param, param.clone()));
                params.push(var);
                slots.push(vec![var; width as usize]);
            }
        }
        for var in slots.into_iter().rev().flatten() {
            self.stack.push(StackEntry::Variable(var));
        }
        self.ast.signature.params = params;
    }

    fn run(&mut self) -> Result<()> {
        let ctx = self.ctx;
        for &cmd in ctx.tree.children(self.sub) {
            if self.state == ReconstructState::Done {
                break;
            }
            if ctx.data.is_dead(cmd)? {
                continue;
            }
            let position = ctx.tree.position(cmd);
            self.position = position;
            self.close_scopes(position)?;
            self.open_loops(cmd, position)?;

            if self.state.is_transient() {
                self.state = self.resting_state();
            }
            let step = self.step.take();
            self.execute(cmd, step)?;
        }

        self.close_scopes(u32::MAX)?;
        if let Some(value) = self.pending_return.take() {
            let ret = self.ast.add(Node::Return(Some(value)));
            self.emit(ret);
        }
        Ok(())
    }

    fn finish(mut self) -> ScriptTree {
        self.ast.vars.assign_names();
        if self.ctx.config.omit_default_args {
            self.omit_default_args();
        }
        self.ast
    }

    fn execute(&mut self, cmd: CmdId, step: Option<StepTracking>) -> Result<()> {
        let ctx = self.ctx;
        let instruction = ctx.tree.instruction(cmd);
        match instruction.opcode {
            Opcode::RsAdd => self.reserve(instruction.ty),
            Opcode::Const => self.constant(instruction)?,
            Opcode::CpTopSp => self.copy_top_sp(cmd, instruction, step)?,
            Opcode::CpDownSp => self.copy_down_sp(instruction)?,
            Opcode::CpTopBp => self.copy_top_bp(cmd, instruction, step)?,
            Opcode::CpDownBp => self.copy_down_bp(instruction)?,
            Opcode::MovSp => self.pop_slots(cmd, instruction)?,
            Opcode::IncISp | Opcode::DecISp => {
                let target = instruction
                    .offset()
                    .and_then(|offset| self.stack.range(offset, 4))
                    .and_then(|range| self.stack.at(range.start).copied());
                self.step_variable(instruction.opcode, target, step)?;
            }
            Opcode::IncIBp | Opcode::DecIBp => {
                let target = instruction
                    .offset()
                    .and_then(|offset| self.global_entries(offset, 4).into_iter().next());
                self.step_variable(instruction.opcode, target, step)?;
            }
            Opcode::Destruct => self.destruct(instruction)?,
            Opcode::Action => self.action(instruction)?,
            Opcode::Jsr => self.call(cmd)?,
            Opcode::Jmp => self.jump(cmd)?,
            Opcode::Jz | Opcode::Jnz => {
                if ctx.data.state(cmd)? == CodeState::LogOr {
                    self.stack.pop();
                } else {
                    self.conditional(cmd)?;
                }
            }
            Opcode::Retn => self.retn(cmd)?,
            Opcode::SaveBp => {
                if self.ast.kind == ScriptKind::Globals {
                    self.state = ReconstructState::Done;
                }
            }
            op if op.is_binary() => self.binary(instruction)?,
            op if op.is_unary() => self.unary(instruction)?,
            _ => {}
        }
        Ok(())
    }

    /// Closes every scope ending at or before `position`, then enters the switch case
    /// starting there.
    fn close_scopes(&mut self, position: u32) -> Result<()> {
        while self.scopes.len() > 1 {
            let Some(scope) = self.scopes.last().copied() else {
                break;
            };
            let node = self.ast.node(scope.node);
            let end = node.body().map_or(0, |b| b.end);
            if end > position {
                break;
            }
            let closing = match node {
                Node::If { skip: Some(skip), .. } => Closing::Else(*skip),
                Node::WhileLoop {
                    condition: None, ..
                }
                | Node::DoLoop {
                    condition: None, ..
                } => Closing::Unconditioned,
                Node::ActionArg(_) => Closing::Closure,
                _ => Closing::Plain,
            };
            self.scopes.pop();
            match closing {
                Closing::Else(skip) => self.open_else(end, skip)?,
                Closing::Unconditioned => {
                    return Err(Error::Unclassified {
                        position: end,
                        message: "loop without a recognisable condition".into(),
                    });
                }
                Closing::Closure => {
                    self.stack.truncate(scope.height);
                    self.closures.push(scope.node);
                    self.state = self.resting_state();
                }
                Closing::Plain => {}
            }
        }
        self.enter_case(position);
        Ok(())
    }

    fn open_else(&mut self, start: u32, skip: u32) -> Result<()> {
        let parent = self.current();
        let parent_end = self.ast.node(parent).body().map_or(u32::MAX, |b| b.end);
        if self.scopes.len() > 1 && skip > parent_end {
            return Err(Error::Unclassified {
                position: start,
                message: format!("else branch ending at {skip} escapes its enclosing block"),
            });
        }
        let height = self.stack.height();
        let else_branch = self.ast.add(Node::Else(Body::new(start, skip)));
        self.ast.append(parent, else_branch);
        self.scopes.push(Scope {
            node: else_branch,
            height,
        });
        Ok(())
    }

    fn enter_case(&mut self, position: u32) {
        let current = self.current();
        if !matches!(self.ast.node(current), Node::Switch { .. }) {
            return;
        }
        let case = self.ast.children(current).iter().copied().find(|case| {
            self.ast
                .node(*case)
                .body()
                .is_some_and(|b| b.start <= position && position < b.end)
        });
        if let Some(case) = case {
            let height = self.stack.height();
            self.scopes.push(Scope { node: case, height });
        }
    }

    /// Innermost open node receiving statements.
    fn current(&self) -> AstId {
        self.scopes.last().map_or(self.ast.root(), |s| s.node)
    }

    /// Appends a statement to the innermost open node.
    fn emit(&mut self, statement: AstId) {
        let current = self.current();
        self.ast.append(current, statement);
    }

    /// State to return to once a transient state has run its course.
    fn resting_state(&self) -> ReconstructState {
        if self.dispatch.is_some() {
            ReconstructState::InSwitchCases
        } else if self.awaiting_condition.is_some() {
            ReconstructState::InWhileCondition
        } else if self
            .scopes
            .iter()
            .any(|s| matches!(self.ast.node(s.node), Node::ActionArg(_)))
        {
            ReconstructState::InActionArgCapture
        } else {
            ReconstructState::Normal
        }
    }

    /// `true` while the walk is inside a deferred action argument.
    fn in_closure(&self) -> bool {
        self.scopes
            .iter()
            .any(|s| matches!(self.ast.node(s.node), Node::ActionArg(_)))
    }

    /// Next live instruction of the subroutine after `cmd`.
    fn next_live(&self, cmd: CmdId) -> Result<Option<CmdId>> {
        let mut cursor = self.ctx.tree.next_in_sub(cmd);
        while let Some(next) = cursor {
            if !self.ctx.data.is_dead(next)? {
                return Ok(Some(next));
            }
            cursor = self.ctx.tree.next_in_sub(next);
        }
        Ok(None)
    }

    fn retn(&mut self, cmd: CmdId) -> Result<()> {
        if self.in_closure() {
            return Ok(());
        }
        let value = self.pending_return.take();
        if self.next_live(cmd)?.is_none() {
            if let Some(value) = value {
                let ret = self.ast.add(Node::Return(Some(value)));
                self.emit(ret);
            }
            self.state = ReconstructState::Done;
        } else {
            let ret = self.ast.add(Node::Return(value));
            self.emit(ret);
        }
        Ok(())
    }
}
