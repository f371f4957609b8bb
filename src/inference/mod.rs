//! Whole-program type inference.
//!
//! NCS carries no signatures: a subroutine's parameter count, parameter types and return
//! type must be recovered from how its body uses the stack below its entry point. The
//! [`TypeInferenceEngine`] does this subroutine by subroutine, callees first, following the
//! strongly connected components of the [`CallGraph`].
//!
//! # Architecture
//!
//! - `simulate` - Abstract type stack simulation of one instruction at a time
//! - `pathfinder` - Depth-first path exploration with a backtracking decision queue
//! - `fallback` - Parameter estimates for subroutines that never converge
//! - [`ProgramLayout`] - Loader stub, globals initializer and main subroutine
//!
//! # Algorithm
//!
//! 1. The globals initializer is simulated up to `SAVEBP`; the slots live there are the
//!    globals and their types.
//! 2. Each SCC is solved in reverse topological order. Every pass gives each unsolved
//!    member up to its retry budget of walks; a pass repeats while it makes progress, and
//!    the next pass has a larger budget. A walk blocked on a callee of the same SCC is
//!    retried once the callee converges.
//! 3. Members still unsolved after the last pass get a fallback prototype.
//! 4. Refinement rounds re-walk partially typed subroutines with the complete prototype
//!    set, so argument types seen at call sites fill unknown parameter types.
//!
//! # Usage
//!
//! ```rust,ignore
//! use ncsdecomp::inference::{ProgramLayout, TypeInferenceEngine};
//!
//! let layout = ProgramLayout::detect(&tree, &data, &graph)?;
//! let engine = TypeInferenceEngine::new(&tree, &graph, &catalog, &config);
//! let inference = engine.run(&mut data, &layout)?;
//! for state in &inference.states {
//!     println!("{:?}: {:?} -> {}", state.sub, state.params, state.return_type);
//! }
//! ```

mod fallback;
mod layout;
mod pathfinder;
mod simulate;

pub use layout::ProgramLayout;

use crate::{
    analysis::{CallGraph, NodeAnalysisData, StackSnapshot},
    bytecode::{ActionCatalog, CmdId, ParseTree, SubId},
    config::DecompilerConfig,
    inference::{
        pathfinder::{GlobalsResult, PathResult, SubroutinePathFinder},
        simulate::{Refinement, WalkOutcome},
    },
    types::{ProtoStatus, SubroutineFlags, SubroutineState, Type},
    Error, Result,
};

fn unsolved(state: &SubroutineState) -> bool {
    matches!(
        state.status,
        ProtoStatus::NotStarted | ProtoStatus::InProgress
    )
}

/// Read-only inputs shared by every walk.
pub(crate) struct InferenceContext<'a> {
    pub tree: &'a ParseTree,
    pub data: &'a NodeAnalysisData,
    pub graph: &'a CallGraph,
    pub catalog: &'a dyn ActionCatalog,
    pub globals: &'a [Type],
}

/// Result of type inference.
#[derive(Debug, Clone, Default)]
pub struct TypeInference {
    /// Prototype of every subroutine, indexed by [`SubId`]
    pub states: Vec<SubroutineState>,
    /// Types of the global slots, bottom first
    pub globals: Vec<Type>,
    /// Subroutines whose exploration hit the decision cap
    pub failures: Vec<(SubId, Error)>,
}

impl TypeInference {
    /// Prototype of a subroutine.
    #[must_use]
    pub fn state(&self, sub: SubId) -> Option<&SubroutineState> {
        self.states.get(sub.index())
    }

    /// Number of subroutines that received a fallback prototype.
    #[must_use]
    pub fn fallback_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.flags.contains(SubroutineFlags::FALLBACK))
            .count()
    }
}

/// SCC-ordered fixpoint prototype inference.
pub struct TypeInferenceEngine<'a> {
    tree: &'a ParseTree,
    graph: &'a CallGraph,
    catalog: &'a dyn ActionCatalog,
    config: &'a DecompilerConfig,
}

impl<'a> TypeInferenceEngine<'a> {
    /// Creates an engine over an analyzed program.
    #[must_use]
    pub fn new(
        tree: &'a ParseTree,
        graph: &'a CallGraph,
        catalog: &'a dyn ActionCatalog,
        config: &'a DecompilerConfig,
    ) -> Self {
        TypeInferenceEngine {
            tree,
            graph,
            catalog,
            config,
        }
    }

    /// Infers the prototype of every subroutine.
    ///
    /// Stack heights observed along each successful walk are stored into `data`.
    ///
    /// # Arguments
    ///
    /// * `data` - Side table produced by the analysis passes
    /// * `layout` - Program entry layout
    ///
    /// # Errors
    ///
    /// Returns [`Error::NodeNotVisited`] when the side table is incomplete. Subroutines
    /// that exceed the decision cap are not errors; they are listed in
    /// [`TypeInference::failures`] and receive a fallback prototype.
    pub fn run(&self, data: &mut NodeAnalysisData, layout: &ProgramLayout) -> Result<TypeInference> {
        let mut states: Vec<SubroutineState> =
            self.tree.subroutines().map(SubroutineState::new).collect();
        for state in &mut states {
            state
                .flags
                .set(SubroutineFlags::RECURSIVE, self.graph.is_recursive(state.sub));
        }
        if let Some(state) = states.get_mut(layout.main.index()) {
            state.flags |= SubroutineFlags::ENTRY;
        }
        if let Some(state) = layout.globals.and_then(|g| states.get_mut(g.index())) {
            state.flags |= SubroutineFlags::GLOBALS;
        }

        let mut globals = self.globals_prepass(data, layout, &states)?;
        let mut queued = vec![0usize; states.len()];
        let mut failures = Vec::new();

        for scc in self.graph.sccs() {
            let scope = globals.clone().unwrap_or_default();
            self.solve_scc(scc, data, &mut states, &scope, &mut queued, &mut failures)?;
        }

        if globals.is_none() {
            globals = self.globals_prepass(data, layout, &states)?;
        }
        let globals = globals.unwrap_or_default();

        self.refine(data, &mut states, &globals)?;

        let inference = TypeInference {
            states,
            globals,
            failures,
        };
        log::debug!(
            "type inference: {} subroutines, {} fallback prototypes, {} globals",
            inference.states.len(),
            inference.fallback_count(),
            inference.globals.len()
        );
        Ok(inference)
    }

    fn context<'b>(&'b self, data: &'b NodeAnalysisData, globals: &'b [Type]) -> InferenceContext<'b> {
        InferenceContext {
            tree: self.tree,
            data,
            graph: self.graph,
            catalog: self.catalog,
            globals,
        }
    }

    fn globals_prepass(
        &self,
        data: &NodeAnalysisData,
        layout: &ProgramLayout,
        states: &[SubroutineState],
    ) -> Result<Option<Vec<Type>>> {
        let Some(sub) = layout.globals else {
            return Ok(Some(Vec::new()));
        };
        let ctx = self.context(data, &[]);
        let finder = SubroutinePathFinder::new(&ctx, states, sub, self.config.max_decisions);
        Ok(match finder.globals()? {
            GlobalsResult::Found(types) => {
                log::debug!("globals initializer declares {} slots", types.len());
                Some(types)
            }
            GlobalsResult::Blocked(callee) => {
                log::debug!(
                    "globals initializer waits on sub {}, typing globals after the SCC passes",
                    callee.index()
                );
                None
            }
            GlobalsResult::Missing => Some(Vec::new()),
        })
    }

    fn solve_scc(
        &self,
        scc: &[SubId],
        data: &mut NodeAnalysisData,
        states: &mut [SubroutineState],
        globals: &[Type],
        queued: &mut [usize],
        failures: &mut Vec<(SubId, Error)>,
    ) -> Result<()> {
        for (pass, budget) in self.config.pass_budgets.iter().enumerate() {
            if !scc.iter().any(|&sub| unsolved(&states[sub.index()])) {
                break;
            }
            loop {
                let mut progress = false;
                for &sub in scc {
                    if !unsolved(&states[sub.index()]) {
                        continue;
                    }
                    states[sub.index()].status = ProtoStatus::InProgress;
                    match self.explore(sub, *budget, data, states, globals, &mut queued[sub.index()]) {
                        Ok(PathResult::Found(outcome)) => {
                            self.apply(sub, outcome, data, states)?;
                            progress = true;
                        }
                        Ok(PathResult::Blocked { waiting_on, reason }) => {
                            log::trace!(
                                "sub {}: pass {} blocked (waiting on {:?}, {})",
                                sub.index(),
                                pass + 1,
                                waiting_on.map(SubId::index),
                                reason.as_deref().unwrap_or("no failure")
                            );
                        }
                        Err(error @ Error::DecisionLimit { .. }) => {
                            if self.config.strict {
                                log::warn!("sub {}: {}", sub.index(), error);
                            } else {
                                log::debug!("sub {}: {}", sub.index(), error);
                            }
                            states[sub.index()].status = ProtoStatus::Failed;
                            failures.push((sub, error));
                        }
                        Err(error) => return Err(error),
                    }
                }
                if !progress {
                    break;
                }
            }
        }

        for &sub in scc {
            if states[sub.index()].is_prototyped() {
                continue;
            }
            let estimate = {
                let ctx = self.context(data, globals);
                fallback::estimate(&ctx, states, sub)?
            };
            fallback::apply(&mut states[sub.index()], estimate, self.config.strict);
        }
        Ok(())
    }

    fn explore(
        &self,
        sub: SubId,
        budget: Option<usize>,
        data: &NodeAnalysisData,
        states: &mut [SubroutineState],
        globals: &[Type],
        queued: &mut usize,
    ) -> Result<PathResult> {
        let mut queue = std::mem::take(&mut states[sub.index()].decisions);
        queue.clear();
        let result = {
            let ctx = self.context(data, globals);
            let finder = SubroutinePathFinder::new(&ctx, states, sub, self.config.max_decisions);
            finder.explore(&mut queue, budget, queued)
        };
        states[sub.index()].decisions = queue;
        result
    }

    fn apply(
        &self,
        sub: SubId,
        outcome: WalkOutcome,
        data: &mut NodeAnalysisData,
        states: &mut [SubroutineState],
    ) -> Result<()> {
        let state = &mut states[sub.index()];
        state.set_prototype(
            outcome.param_slots,
            &outcome.groups,
            outcome.return_type,
            outcome.return_depth,
        );
        log::debug!(
            "sub {}: {} parameter slots, returns {}",
            sub.index(),
            state.param_slot_count(),
            state.return_type
        );
        self.apply_evidence(&outcome.refinements, &outcome.snapshots, data, states)?;
        Ok(())
    }

    fn apply_evidence(
        &self,
        refinements: &[Refinement],
        snapshots: &[(CmdId, i32)],
        data: &mut NodeAnalysisData,
        states: &mut [SubroutineState],
    ) -> Result<usize> {
        let mut changed = 0;
        for refinement in refinements {
            if let Some(callee) = states.get_mut(refinement.callee.index()) {
                if callee.refine_param(refinement.slot, &refinement.ty) {
                    changed += 1;
                }
            }
        }
        for &(cmd, height) in snapshots {
            data.set_stack(cmd, StackSnapshot { height })?;
        }
        Ok(changed)
    }

    fn needs_refinement(&self, states: &[SubroutineState], sub: SubId) -> bool {
        let state = &states[sub.index()];
        !state.is_fully_typed()
            || state.flags.contains(SubroutineFlags::FALLBACK)
            || self
                .graph
                .callees(sub)
                .iter()
                .any(|callee| !states[callee.index()].is_fully_typed())
    }

    fn refine(
        &self,
        data: &mut NodeAnalysisData,
        states: &mut [SubroutineState],
        globals: &[Type],
    ) -> Result<()> {
        let budget = self.config.pass_budgets.last().copied().flatten();

        for round in 0..self.config.refinement_rounds {
            let mut changed = 0usize;
            for scc in self.graph.sccs() {
                for &sub in scc {
                    if !self.needs_refinement(states, sub) {
                        continue;
                    }
                    let mut queued = 0;
                    let outcome = match self.explore(sub, budget, data, states, globals, &mut queued) {
                        Ok(PathResult::Found(outcome)) => outcome,
                        Ok(PathResult::Blocked { .. }) | Err(Error::DecisionLimit { .. }) => continue,
                        Err(error) => return Err(error),
                    };
                    changed += self.merge(sub, outcome, data, states)?;
                }
            }
            log::debug!("refinement round {}: {} prototype changes", round + 1, changed);
            if changed == 0 {
                break;
            }
        }
        Ok(())
    }

    fn merge(
        &self,
        sub: SubId,
        outcome: WalkOutcome,
        data: &mut NodeAnalysisData,
        states: &mut [SubroutineState],
    ) -> Result<usize> {
        let state = &mut states[sub.index()];
        let mut changed = 0;

        if state.flags.contains(SubroutineFlags::FALLBACK) {
            log::debug!("sub {}: converged after fallback", sub.index());
            state.set_prototype(
                outcome.param_slots.clone(),
                &outcome.groups,
                outcome.return_type.clone(),
                outcome.return_depth,
            );
            state.flags.remove(SubroutineFlags::FALLBACK);
            changed += 1;
        } else if outcome.param_slots.len() == state.param_slots.len() {
            for (slot, ty) in outcome.param_slots.iter().enumerate() {
                if state.refine_param(slot as u32, ty) {
                    changed += 1;
                }
            }
            if state.refine_return(&outcome.return_type) {
                changed += 1;
            }
        }

        changed += self.apply_evidence(&outcome.refinements, &outcome.snapshots, data, states)?;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bytecode::{
            ActionSignature, ActionTable, Constant, Instruction, Opcode, ParseTreeBuilder, TypeCode,
        },
        test::marked,
    };

    fn infer(tree: &ParseTree, catalog: &ActionTable) -> TypeInference {
        let mut data = marked(tree);
        let graph = CallGraph::build(tree, &data).unwrap();
        let layout = ProgramLayout::detect(tree, &data, &graph).unwrap();
        let config = DecompilerConfig::default();
        TypeInferenceEngine::new(tree, &graph, catalog, &config)
            .run(&mut data, &layout)
            .unwrap()
    }

    #[test]
    fn test_callee_types_flow_into_caller() {
        // void main() { int x = twice(3); }   int twice(int n) { return n + n; }
        let mut asm = ParseTreeBuilder::new();
        let main = asm.label();
        let twice = asm.label();
        asm.subroutine();
        asm.jsr(main);
        asm.simple(Opcode::Retn);

        asm.subroutine_at(main);
        asm.emit(Instruction::rsadd(TypeCode::Int));
        asm.emit(Instruction::rsadd(TypeCode::Int));
        asm.emit(Instruction::constant(Constant::Int(3)));
        asm.jsr(twice);
        asm.emit(Instruction::cpdownsp(-8, 4));
        asm.emit(Instruction::movsp(-4));
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);

        asm.subroutine_at(twice);
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.emit(Instruction::cptopsp(-8, 4));
        asm.emit(Instruction::simple(Opcode::Add, TypeCode::IntInt));
        asm.emit(Instruction::cpdownsp(-12, 4));
        asm.emit(Instruction::movsp(-4));
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let inference = infer(&tree, &ActionTable::new());
        let twice = inference.state(SubId::new(2)).unwrap();
        assert_eq!(twice.params, vec![Type::INT]);
        assert_eq!(twice.return_type, Type::INT);
        assert!(twice.is_fully_typed());

        let main = inference.state(SubId::new(1)).unwrap();
        assert!(main.params.is_empty());
        assert_eq!(main.return_type, Type::VOID);
        assert!(main.flags.contains(SubroutineFlags::ENTRY));
        assert_eq!(inference.fallback_count(), 0);
    }

    #[test]
    fn test_unused_parameter_refined_from_call_site() {
        // void main() { ignore("hi"); }   void ignore(string s) { }
        let mut asm = ParseTreeBuilder::new();
        let ignore = asm.label();
        asm.subroutine();
        asm.emit(Instruction::constant(Constant::String("hi".into())));
        asm.jsr(ignore);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(ignore);
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let inference = infer(&tree, &ActionTable::new());
        assert_eq!(inference.state(SubId::new(1)).unwrap().params, vec![Type::STRING]);
    }

    #[test]
    fn test_action_parameters_type_subroutine() {
        // void speak(string s) { PrintString(s); }
        let catalog = ActionTable::new().with(
            1,
            ActionSignature::new("PrintString", Type::VOID, vec![Type::STRING]),
        );
        let mut asm = ParseTreeBuilder::new();
        let speak = asm.label();
        asm.subroutine();
        asm.emit(Instruction::constant(Constant::String("x".into())));
        asm.jsr(speak);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(speak);
        asm.emit(Instruction::cptopsp(-4, 4));
        asm.emit(Instruction::action(1, 1));
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let inference = infer(&tree, &catalog);
        assert_eq!(inference.state(SubId::new(1)).unwrap().params, vec![Type::STRING]);
    }

    #[test]
    fn test_mutual_recursion_converges() {
        // int even(int n) { if (n) return odd(n - 1); return 1; }  and odd symmetric
        let mut asm = ParseTreeBuilder::new();
        let even = asm.label();
        let odd = asm.label();
        asm.subroutine();
        asm.emit(Instruction::rsadd(TypeCode::Int));
        asm.emit(Instruction::constant(Constant::Int(4)));
        asm.jsr(even);
        asm.emit(Instruction::movsp(-4));
        asm.simple(Opcode::Retn);

        for (label, other) in [(even, odd), (odd, even)] {
            let base = asm.label();
            let epilogue = asm.label();
            asm.subroutine_at(label);
            asm.emit(Instruction::cptopsp(-4, 4));
            asm.jz(base);
            asm.emit(Instruction::rsadd(TypeCode::Int));
            asm.emit(Instruction::cptopsp(-8, 4));
            asm.emit(Instruction::constant(Constant::Int(1)));
            asm.emit(Instruction::simple(Opcode::Sub, TypeCode::IntInt));
            asm.jsr(other);
            asm.emit(Instruction::cpdownsp(-12, 4));
            asm.emit(Instruction::movsp(-4));
            asm.jmp(epilogue);
            asm.place(base);
            asm.emit(Instruction::constant(Constant::Int(1)));
            asm.emit(Instruction::cpdownsp(-12, 4));
            asm.emit(Instruction::movsp(-4));
            asm.place(epilogue);
            asm.emit(Instruction::movsp(-4));
            asm.simple(Opcode::Retn);
        }
        let tree = asm.finish().unwrap();

        let inference = infer(&tree, &ActionTable::new());
        for sub in [SubId::new(1), SubId::new(2)] {
            let state = inference.state(sub).unwrap();
            assert!(state.is_prototyped());
            assert!(state.flags.contains(SubroutineFlags::RECURSIVE));
            assert_eq!(state.params, vec![Type::INT]);
            assert_eq!(state.return_type, Type::INT);
        }
        assert!(inference.failures.is_empty());
    }

    #[test]
    fn test_globals_prepass() {
        let mut asm = ParseTreeBuilder::new();
        let globals = asm.label();
        let main = asm.label();
        asm.subroutine();
        asm.jsr(globals);
        asm.simple(Opcode::Retn);
        asm.subroutine_at(globals);
        asm.emit(Instruction::rsadd(TypeCode::Int));
        asm.emit(Instruction::rsadd(TypeCode::String));
        asm.simple(Opcode::SaveBp);
        asm.jsr(main);
        asm.simple(Opcode::RestoreBp);
        asm.emit(Instruction::movsp(-8));
        asm.simple(Opcode::Retn);
        asm.subroutine_at(main);
        asm.simple(Opcode::Retn);
        let tree = asm.finish().unwrap();

        let inference = infer(&tree, &ActionTable::new());
        assert_eq!(inference.globals, vec![Type::INT, Type::STRING]);
        assert!(inference
            .state(SubId::new(1))
            .unwrap()
            .flags
            .contains(SubroutineFlags::GLOBALS));
    }
}
