//! Fallback prototypes for subroutines that never converged.

use crate::{
    analysis::CallSiteAnalyzer,
    bytecode::{Opcode, SubId},
    inference::InferenceContext,
    types::{ProtoStatus, SubroutineFlags, SubroutineState, Type},
    Result,
};

/// Parameter slot estimate for an unresolved subroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FallbackEstimate {
    /// Largest argument growth seen at any call site
    pub call_sites: u32,
    /// Largest `MOVSP` directly before a `RETN` in the subroutine itself
    pub epilogue: u32,
}

impl FallbackEstimate {
    pub(crate) fn slots(&self) -> u32 {
        self.call_sites.max(self.epilogue)
    }
}

/// Estimates the parameter slots of `sub` from both heuristics.
///
/// # Errors
///
/// Returns [`crate::Error::NodeNotVisited`] when the side table is incomplete.
pub(crate) fn estimate(
    ctx: &InferenceContext<'_>,
    states: &[SubroutineState],
    sub: SubId,
) -> Result<FallbackEstimate> {
    let call_sites = CallSiteAnalyzer::new(ctx.tree, ctx.data, ctx.graph, ctx.catalog)
        .estimate_for(sub, states)?
        .unwrap_or(0);

    let mut epilogue = 0;
    for &cmd in ctx.tree.children(sub) {
        if ctx.tree.kind(cmd) != Opcode::Retn || ctx.data.is_dead(cmd)? {
            continue;
        }
        let Some(prev) = ctx.tree.prev_in_sub(cmd) else {
            continue;
        };
        if ctx.tree.kind(prev) != Opcode::MovSp {
            continue;
        }
        if let Some(offset) = ctx.tree.instruction(prev).offset() {
            epilogue = epilogue.max(offset.unsigned_abs() / 4);
        }
    }

    Ok(FallbackEstimate {
        call_sites,
        epilogue,
    })
}

/// Installs a placeholder prototype: `slots` parameters of unknown type and no return.
pub(crate) fn apply(state: &mut SubroutineState, estimate: FallbackEstimate, strict: bool) {
    let slots = estimate.slots();
    state.set_prototype(vec![Type::INVALID; slots as usize], &[], Type::VOID, None);
    state.status = ProtoStatus::Done;
    state.flags |= SubroutineFlags::FALLBACK;

    if strict {
        log::warn!(
            "sub {}: prototype did not converge, assuming {} parameter slots (call sites {}, epilogue {})",
            state.sub.index(),
            slots,
            estimate.call_sites,
            estimate.epilogue
        );
    } else {
        log::debug!(
            "sub {}: fallback prototype with {} parameter slots",
            state.sub.index(),
            slots
        );
    }
}
