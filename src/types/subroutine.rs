//! Per-subroutine prototype records.

use bitflags::bitflags;

use crate::{
    bytecode::{CmdId, SubId},
    types::Type,
};

/// Prototyping progress of one subroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtoStatus {
    /// No walk attempted yet
    NotStarted,
    /// A walk is running or waiting for a callee
    InProgress,
    /// Prototype determined, by a walk or by the fallback heuristics
    Done,
    /// Every pass failed and no fallback has been applied yet
    Failed,
}

bitflags! {
    /// Facts about a subroutine prototype.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SubroutineFlags: u8 {
        /// Every parameter type is known
        const PARAMS_TYPED = 0x01;
        /// The return type is known (possibly `void`)
        const RETURN_TYPED = 0x02;
        /// The prototype was estimated by the fallback heuristics
        const FALLBACK = 0x04;
        /// The program entry (`main` or `StartingConditional`)
        const ENTRY = 0x08;
        /// The globals initializer
        const GLOBALS = 0x10;
        /// Member of a call cycle
        const RECURSIVE = 0x20;
    }
}

/// A branch choice made at a conditional jump during path exploration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decision {
    /// The conditional jump
    pub at: CmdId,
    /// `true` when the jump was followed
    pub taken: bool,
}

/// Branch decisions of the current exploration path.
///
/// Every walk replays the recorded decisions in order, and appends a fall-through decision
/// at each conditional jump beyond them. When a walk fails, [`DecisionQueue::backtrack`]
/// removes decisions from the end until it finds one that has not been switched yet and
/// flips it; each decision is tried fall-through first, then taken.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionQueue {
    decisions: Vec<Decision>,
    cursor: usize,
}

impl DecisionQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new walk over the recorded decisions.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Returns the choice for the conditional jump `at`, recording a fall-through decision
    /// when the walk went past the recorded path.
    pub fn decide(&mut self, at: CmdId) -> bool {
        if let Some(decision) = self.decisions.get(self.cursor) {
            if decision.at == at {
                self.cursor += 1;
                return decision.taken;
            }
            // A different path than recorded; drop the stale tail.
            self.decisions.truncate(self.cursor);
        }
        self.decisions.push(Decision { at, taken: false });
        self.cursor += 1;
        false
    }

    /// Flips the most recent decision that still has an untried alternative.
    ///
    /// Returns `false` once every path has been tried.
    pub fn backtrack(&mut self) -> bool {
        self.cursor = 0;
        while let Some(last) = self.decisions.pop() {
            if !last.taken {
                self.decisions.push(Decision {
                    at: last.at,
                    taken: true,
                });
                return true;
            }
        }
        false
    }

    /// Number of recorded decisions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// `true` when nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    /// Recorded decisions in path order.
    #[must_use]
    pub fn decisions(&self) -> &[Decision] {
        &self.decisions
    }

    /// Drops every recorded decision.
    pub fn clear(&mut self) {
        self.decisions.clear();
        self.cursor = 0;
    }
}

/// The inferred prototype of one subroutine.
///
/// Parameter slots are numbered from the subroutine entry downwards: slot 0 is the value
/// the caller pushed last, which is parameter 0.
#[derive(Debug, Clone, PartialEq)]
pub struct SubroutineState {
    /// Subroutine this prototype belongs to
    pub sub: SubId,
    /// Prototyping progress
    pub status: ProtoStatus,
    /// Prototype facts
    pub flags: SubroutineFlags,
    /// Return type, `void` when nothing is returned
    pub return_type: Type,
    /// Slot below the entry where the return value is written, once discovered
    pub return_depth: Option<u32>,
    /// Per-slot parameter types
    pub param_slots: Vec<Type>,
    /// Grouped parameter types in declaration order
    pub params: Vec<Type>,
    /// Multi-slot parameter runs as `(first slot, slot count)`
    pub param_groups: Vec<(u32, u32)>,
    /// Decision queue of the current exploration
    pub decisions: DecisionQueue,
}

impl SubroutineState {
    /// A fresh, unresolved prototype.
    #[must_use]
    pub fn new(sub: SubId) -> Self {
        SubroutineState {
            sub,
            status: ProtoStatus::NotStarted,
            flags: SubroutineFlags::empty(),
            return_type: Type::VOID,
            return_depth: None,
            param_slots: Vec::new(),
            params: Vec::new(),
            param_groups: Vec::new(),
            decisions: DecisionQueue::new(),
        }
    }

    /// `true` once a prototype is available to callers.
    #[must_use]
    pub fn is_prototyped(&self) -> bool {
        self.status == ProtoStatus::Done
    }

    /// `true` when parameters and return type are all known.
    #[must_use]
    pub fn is_fully_typed(&self) -> bool {
        self.flags
            .contains(SubroutineFlags::PARAMS_TYPED | SubroutineFlags::RETURN_TYPED)
    }

    /// Stack slots consumed by the parameters.
    #[must_use]
    pub fn param_slot_count(&self) -> u32 {
        self.param_slots.len() as u32
    }

    /// Stack slots of the return value.
    #[must_use]
    pub fn return_slots(&self) -> u32 {
        self.return_type.slots()
    }

    /// Installs a prototype.
    ///
    /// # Arguments
    ///
    /// * `param_slots` - Per-slot parameter types, slot 0 first
    /// * `groups` - Slot ranges `(first, count)` read as one aggregate value
    /// * `return_type` - Return type, `void` for none
    /// * `return_depth` - Slot below entry holding the return value
    pub fn set_prototype(
        &mut self,
        param_slots: Vec<Type>,
        groups: &[(u32, u32)],
        return_type: Type,
        return_depth: Option<u32>,
    ) {
        self.params = group_params(&param_slots, groups);
        self.param_slots = param_slots;
        self.param_groups = groups.to_vec();
        self.return_type = return_type;
        self.return_depth = return_depth;
        self.status = ProtoStatus::Done;
        self.refresh_flags();
    }

    /// Fills in the type of a parameter slot that is still unknown.
    ///
    /// # Returns
    ///
    /// `true` when the slot changed.
    pub fn refine_param(&mut self, slot: u32, ty: &Type) -> bool {
        match self.param_slots.get_mut(slot as usize) {
            Some(current) if !current.is_known() && ty.is_known() && ty.slots() == 1 => {
                *current = ty.clone();
                self.params = group_params(&self.param_slots, &self.param_groups);
                self.refresh_flags();
                true
            }
            _ => false,
        }
    }

    /// Fills in the return type when it is unknown or partially known.
    ///
    /// # Returns
    ///
    /// `true` when the return type changed.
    pub fn refine_return(&mut self, ty: &Type) -> bool {
        let improves = ty.slots() == self.return_type.slots()
            && !self.return_type.is_fully_typed()
            && ty.is_fully_typed();
        if improves {
            self.return_type = ty.clone();
            self.refresh_flags();
        }
        improves
    }

    /// Recomputes the `*_TYPED` flags from the current types.
    pub fn refresh_flags(&mut self) {
        self.flags.set(
            SubroutineFlags::PARAMS_TYPED,
            self.params.iter().all(Type::is_fully_typed),
        );
        self.flags.set(
            SubroutineFlags::RETURN_TYPED,
            self.return_type.is_fully_typed(),
        );
    }

    /// Slot ranges of the grouped parameters, in declaration order.
    #[must_use]
    pub fn param_ranges(&self) -> Vec<(u32, u32)> {
        let mut ranges = Vec::with_capacity(self.params.len());
        let mut slot = 0;
        for param in &self.params {
            let width = param.slots().max(1);
            ranges.push((slot, width));
            slot += width;
        }
        ranges
    }
}

/// Groups per-slot parameter types into declared parameters.
///
/// A group covering slots `first..first + count` becomes one aggregate parameter. Slot 0 is
/// the top-most argument, which is the last slot pushed of parameter 0; aggregate members
/// are therefore read from the highest slot down.
fn group_params(slots: &[Type], groups: &[(u32, u32)]) -> Vec<Type> {
    let mut params = Vec::new();
    let mut slot = 0u32;
    while (slot as usize) < slots.len() {
        let group = groups
            .iter()
            .find(|(first, count)| *first == slot && *count > 1 && (first + count) as usize <= slots.len());
        match group {
            Some(&(first, count)) => {
                let members: Vec<Type> = (first..first + count)
                    .rev()
                    .map(|s| slots[s as usize].clone())
                    .collect();
                params.push(Type::structure(members));
                slot += count;
            }
            None => {
                params.push(slots[slot as usize].clone());
                slot += 1;
            }
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_queue_depth_first() {
        let a = CmdId::new(1);
        let b = CmdId::new(5);
        let mut queue = DecisionQueue::new();

        assert!(!queue.decide(a));
        assert!(!queue.decide(b));
        assert_eq!(queue.len(), 2);

        // (a: fall, b: take)
        assert!(queue.backtrack());
        assert!(!queue.decide(a));
        assert!(queue.decide(b));

        // (a: take), b not visited yet
        assert!(queue.backtrack());
        assert!(queue.decide(a));
        assert!(!queue.decide(b));

        assert!(queue.backtrack());
        assert!(queue.decide(a));
        assert!(queue.decide(b));

        assert!(!queue.backtrack());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_group_params_vector_and_scalars() {
        // param0: int (slot 0), param1: vector (slots 1..4)
        let slots = vec![Type::INT, Type::FLOAT, Type::FLOAT, Type::FLOAT];
        let params = group_params(&slots, &[(1, 3)]);
        assert_eq!(params, vec![Type::INT, Type::VECTOR]);
    }

    #[test]
    fn test_set_prototype_flags() {
        let mut state = SubroutineState::new(SubId::new(2));
        state.set_prototype(vec![Type::INT, Type::INVALID], &[], Type::STRING, Some(2));
        assert!(state.is_prototyped());
        assert!(state.flags.contains(SubroutineFlags::RETURN_TYPED));
        assert!(!state.flags.contains(SubroutineFlags::PARAMS_TYPED));
        assert_eq!(state.param_slot_count(), 2);
        assert_eq!(state.param_ranges(), vec![(0, 1), (1, 1)]);

        assert!(state.refine_param(1, &Type::OBJECT));
        assert!(!state.refine_param(1, &Type::INT));
        assert!(state.flags.contains(SubroutineFlags::PARAMS_TYPED));
        assert_eq!(state.params, vec![Type::INT, Type::OBJECT]);
    }
}
