//! Depth-first path exploration with a backtracking decision queue.
//!
//! One walk follows a single path through a subroutine: forward `JMP`s are always taken,
//! backward `JMP`s fall through to the loop exit, and each conditional jump consults the
//! [`DecisionQueue`]. A walk that ends at `RETN` yields a prototype. A walk that is blocked
//! (it calls a subroutine with no prototype yet) or inconsistent is abandoned, the most
//! recent unflipped decision is flipped and the walk starts over.

use crate::{
    bytecode::{CmdId, SubId},
    inference::{
        simulate::{Flow, TypeSimulator, WalkOutcome},
        InferenceContext,
    },
    types::{DecisionQueue, SubroutineState, Type},
    Error, Result,
};

/// Result of exploring a subroutine within one retry budget.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PathResult {
    /// A walk reached `RETN`
    Found(WalkOutcome),
    /// Every walk was blocked or failed within the budget
    Blocked {
        /// The last subroutine whose missing prototype blocked a walk
        waiting_on: Option<SubId>,
        /// The last failure reason, if any walk was inconsistent
        reason: Option<String>,
    },
}

/// Result of simulating the globals initializer up to `SAVEBP`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum GlobalsResult {
    /// Types of the global slots, bottom first
    Found(Vec<Type>),
    /// The initializer calls a subroutine with no prototype yet
    Blocked(SubId),
    /// No path reached `SAVEBP`
    Missing,
}

/// Explores paths through one subroutine.
pub(crate) struct SubroutinePathFinder<'a> {
    ctx: &'a InferenceContext<'a>,
    states: &'a [SubroutineState],
    sub: SubId,
    max_decisions: usize,
}

enum Walk {
    Complete(WalkOutcome),
    Globals(Vec<Type>),
    Blocked(SubId),
    Failed(String),
}

impl<'a> SubroutinePathFinder<'a> {
    pub(crate) fn new(
        ctx: &'a InferenceContext<'a>,
        states: &'a [SubroutineState],
        sub: SubId,
        max_decisions: usize,
    ) -> Self {
        SubroutinePathFinder {
            ctx,
            states,
            sub,
            max_decisions,
        }
    }

    /// Explores walks until one completes or the budget is spent.
    ///
    /// # Arguments
    ///
    /// * `queue` - Decision queue; a fresh exploration starts from an empty queue
    /// * `budget` - Maximum number of walks, `None` for unbounded
    /// * `queued` - Running total of decisions queued for this subroutine
    ///
    /// # Errors
    ///
    /// Returns [`Error::DecisionLimit`] when `queued` exceeds the decision cap, and
    /// [`Error::NodeNotVisited`] when the side table is incomplete.
    pub(crate) fn explore(
        &self,
        queue: &mut DecisionQueue,
        budget: Option<usize>,
        queued: &mut usize,
    ) -> Result<PathResult> {
        let mut attempts = 0usize;
        let mut waiting_on = None;
        let mut reason = None;

        loop {
            queue.rewind();
            let before = queue.len();
            let walk = self.walk(queue, false)?;
            *queued += queue.len().saturating_sub(before).max(1);
            if *queued > self.max_decisions {
                return Err(Error::DecisionLimit {
                    sub: self.sub.index(),
                    limit: self.max_decisions,
                });
            }

            match walk {
                Walk::Complete(outcome) => return Ok(PathResult::Found(outcome)),
                Walk::Blocked(callee) => waiting_on = Some(callee),
                Walk::Failed(why) => reason = Some(why),
                Walk::Globals(_) => {}
            }

            attempts += 1;
            if budget.is_some_and(|limit| attempts >= limit) {
                break;
            }
            if !queue.backtrack() {
                break;
            }
            log::trace!(
                "sub {}: backtracking after attempt {} ({} decisions queued)",
                self.sub.index(),
                attempts,
                queue.len()
            );
        }

        Ok(PathResult::Blocked { waiting_on, reason })
    }

    /// Simulates the globals initializer along its first path to `SAVEBP`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] when the side table is incomplete.
    pub(crate) fn globals(&self) -> Result<GlobalsResult> {
        let mut queue = DecisionQueue::new();
        loop {
            queue.rewind();
            match self.walk(&mut queue, true)? {
                Walk::Globals(types) => return Ok(GlobalsResult::Found(types)),
                Walk::Blocked(callee) => return Ok(GlobalsResult::Blocked(callee)),
                Walk::Complete(_) | Walk::Failed(_) => {}
            }
            if queue.len() > self.max_decisions || !queue.backtrack() {
                return Ok(GlobalsResult::Missing);
            }
        }
    }

    fn walk(&self, queue: &mut DecisionQueue, globals_mode: bool) -> Result<Walk> {
        let tree = self.ctx.tree;
        let children = tree.children(self.sub);
        let step_limit = children.len().saturating_mul(4).max(16);

        let mut sim = TypeSimulator::new(self.ctx, self.states, self.sub);
        let mut current: Option<CmdId> = children.first().copied();
        let mut steps = 0usize;

        while let Some(cmd) = current {
            steps += 1;
            if steps > step_limit {
                return Ok(Walk::Failed("path does not terminate".into()));
            }

            current = match sim.step(cmd, globals_mode)? {
                Flow::Next => tree.next_in_sub(cmd),
                Flow::Goto(dest) => Some(dest),
                Flow::Branch(jump) => {
                    if queue.decide(jump) {
                        self.ctx.data.destination(jump)?
                    } else {
                        tree.next_in_sub(jump)
                    }
                }
                Flow::Return => {
                    if globals_mode {
                        return Ok(Walk::Failed("returned before SAVEBP".into()));
                    }
                    return Ok(match sim.finish() {
                        Ok(outcome) => Walk::Complete(outcome),
                        Err(why) => Walk::Failed(why),
                    });
                }
                Flow::SaveBp => return Ok(Walk::Globals(sim.local_types())),
                Flow::Blocked(callee) => return Ok(Walk::Blocked(callee)),
                Flow::Fail(why) => return Ok(Walk::Failed(why)),
            };
            if let Some(next) = current {
                if tree.parent(next) != self.sub {
                    return Ok(Walk::Failed("path leaves the subroutine".into()));
                }
            }
        }
        Ok(Walk::Failed("path runs off the end of the subroutine".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::CallGraph,
        bytecode::{ActionTable, Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode},
        test::marked,
    };

    #[test]
    fn test_walk_types_parameters_and_return() {
        // int add(int a, int b) { return a + b; }
        let mut asm = ParseTreeBuilder::new();
        asm.subroutine();
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.emit(Instruction::cptopsp(-12, 4));
        asm.emit(Instruction::simple(Opcode::Add, TypeCode::IntInt));
        asm.emit(Instruction::cpdownsp(-16, 4));
        asm.emit(Instruction::movsp(-4));
        asm.emit(Instruction::movsp(-8));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let data = marked(&tree);
        let graph = CallGraph::build(&tree, &data).unwrap();
        let catalog = ActionTable::new();
        let ctx = InferenceContext {
            tree: &tree,
            data: &data,
            graph: &graph,
            catalog: &catalog,
            globals: &[],
        };
        let states = vec![SubroutineState::new(SubId::new(0))];
        let finder = SubroutinePathFinder::new(&ctx, &states, SubId::new(0), 3000);

        let mut queue = DecisionQueue::new();
        let mut queued = 0;
        let PathResult::Found(outcome) = finder.explore(&mut queue, Some(10), &mut queued).unwrap()
        else {
            panic!("expected a prototype");
        };
        assert_eq!(outcome.param_slots, vec![Type::INT, Type::INT]);
        assert_eq!(outcome.return_type, Type::INT);
        assert_eq!(outcome.return_depth, Some(2));
    }

    #[test]
    fn test_backtracks_around_blocked_call() {
        // sub0: if (p) { sub0(p); } return;  (the recursive call blocks the fall-through path)
        let mut asm = ParseTreeBuilder::new();
        let this = asm.label();
        let skip = asm.label();
        asm.subroutine_at(this);
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.jz(skip);
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.jsr(this);
        asm.place(skip);
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let data = marked(&tree);
        let graph = CallGraph::build(&tree, &data).unwrap();
        let catalog = ActionTable::new();
        let ctx = InferenceContext {
            tree: &tree,
            data: &data,
            graph: &graph,
            catalog: &catalog,
            globals: &[],
        };
        let states = vec![SubroutineState::new(SubId::new(0))];
        let finder = SubroutinePathFinder::new(&ctx, &states, SubId::new(0), 3000);

        let mut queue = DecisionQueue::new();
        let mut queued = 0;
        let PathResult::Found(outcome) = finder.explore(&mut queue, Some(10), &mut queued).unwrap()
        else {
            panic!("expected a prototype");
        };
        assert_eq!(outcome.param_slots, vec![Type::INT]);
        assert_eq!(outcome.return_type, Type::VOID);
        assert_eq!(queue.decisions().len(), 1);
        assert!(queue.decisions()[0].taken);
    }

    #[test]
    fn test_decision_limit() {
        let mut asm = ParseTreeBuilder::new();
        let this = asm.label();
        let skip = asm.label();
        asm.subroutine_at(this);
        asm.emit(Instruction::constant(Constant::Int(1)));
        asm.jz(skip);
        asm.jsr(this);
        asm.place(skip);
        asm.jsr(this);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let data = marked(&tree);
        let graph = CallGraph::build(&tree, &data).unwrap();
        let catalog = ActionTable::new();
        let ctx = InferenceContext {
            tree: &tree,
            data: &data,
            graph: &graph,
            catalog: &catalog,
            globals: &[],
        };
        let states = vec![SubroutineState::new(SubId::new(0))];
        let finder = SubroutinePathFinder::new(&ctx, &states, SubId::new(0), 1);

        let mut queue = DecisionQueue::new();
        let mut queued = 0;
        assert_eq!(
            finder.explore(&mut queue, None, &mut queued),
            Err(Error::DecisionLimit { sub: 0, limit: 1 })
        );
    }
}
