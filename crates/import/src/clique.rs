//! Spill cliques.
//!
//! When a block exits with a nonempty evaluation stack, the live values are
//! spilled to temporaries and the successors reload them. Every block that
//! can reach the same join through such edges must use the same temporaries,
//! so temp assignment works over the *spill clique*: the transitive closure
//! of blocks related through nonempty-stack edges. A block participates on
//! the predecessor side (it stores the temps on exit), the successor side
//! (it loads them on entry), or both.

use crate::pending::PendingSet;
use crate::Result;
use ingot_data_structures::bitset::DenseBitSet;
use ingot_ir::{
    BlockFlags, BlockId, Body, EntryState, ExprKind, LocalId, StackEntry, TypeTag,
};
use tracing::debug;

/// Which side of the clique relation a block joins through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CliqueSide {
    /// The block stores the shared temps on exit.
    Pred,
    /// The block loads the shared temps on entry.
    Succ,
}

/// Reusable walker state for clique discovery.
///
/// The bitsets are membership markers for the walk in progress and are reset
/// at the start of every walk; member lists from the previous walk are
/// discarded at the same time.
#[derive(Debug, Default)]
pub(crate) struct SpillClique {
    preds: DenseBitSet<BlockId>,
    succs: DenseBitSet<BlockId>,
    pred_members: Vec<BlockId>,
    succ_members: Vec<BlockId>,
}

impl SpillClique {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Computes the clique containing `block`, joined through `side`.
    pub(crate) fn walk(&mut self, body: &Body, block: BlockId, side: CliqueSide) {
        self.preds.clear();
        self.succs.clear();
        self.preds.ensure(body.blocks.len());
        self.succs.ensure(body.blocks.len());
        self.pred_members.clear();
        self.succ_members.clear();

        let mut worklist = vec![(block, side)];
        while let Some((b, side)) = worklist.pop() {
            match side {
                CliqueSide::Pred => {
                    if !self.preds.insert(b) {
                        continue;
                    }
                    self.pred_members.push(b);
                    // Everything this block flows into reloads its spills.
                    for &succ in &body.block(b).succs {
                        worklist.push((succ, CliqueSide::Succ));
                    }
                }
                CliqueSide::Succ => {
                    if !self.succs.insert(b) {
                        continue;
                    }
                    self.succ_members.push(b);
                    // Every other predecessor must store the same temps.
                    for &pred in &body.block(b).preds {
                        worklist.push((pred, CliqueSide::Pred));
                    }
                }
            }
        }
        debug!(
            preds = self.pred_members.len(),
            succs = self.succ_members.len(),
            "computed spill clique"
        );
    }

    pub(crate) fn pred_members(&self) -> &[BlockId] {
        &self.pred_members
    }

    pub(crate) fn succ_members(&self) -> &[BlockId] {
        &self.succ_members
    }

    /// The shared temp base already assigned to this clique, if any member
    /// carries one.
    pub(crate) fn existing_base(&self, body: &Body) -> Option<LocalId> {
        self.pred_members
            .iter()
            .find_map(|&b| body.block(b).temps_out)
            .or_else(|| self.succ_members.iter().find_map(|&b| body.block(b).temps_in))
    }
}

/// Ensures the clique has a contiguous run of temps, one per stack slot, and
/// broadcasts the base to every member. `slot_types` seeds the temp types on
/// first assignment; later calls reuse the existing run unchanged.
pub(crate) fn assign_spill_temps(
    body: &mut Body,
    clique: &SpillClique,
    slot_types: &[TypeTag],
) -> LocalId {
    let base = clique.existing_base(body).unwrap_or_else(|| {
        let mut iter = slot_types.iter();
        let first = iter.next().copied().unwrap_or(TypeTag::Int32);
        let base = body.alloc_temp(first);
        for &ty in iter {
            body.alloc_temp(ty);
        }
        base
    });
    for &b in clique.pred_members() {
        body.block_mut(b).temps_out = Some(base);
    }
    for &b in clique.succ_members() {
        body.block_mut(b).temps_in = Some(base);
    }
    base
}

/// Widens a clique temp and schedules every member whose translation the new
/// type invalidates.
///
/// Successor members get a fresh entry state loading the retyped temps and
/// are retranslated, the current block included when a back edge makes it
/// its own successor. Predecessor members are retranslated so their exit
/// stores pick up the conversion; there the current block is skipped, its
/// exit sequence is being (re)built by the caller.
pub(crate) fn retype_and_reimport(
    body: &mut Body,
    pending: &mut PendingSet,
    clique: &SpillClique,
    cur_block: BlockId,
    base: LocalId,
    slot: usize,
    new_ty: TypeTag,
    depth: usize,
) -> Result<()> {
    let temp = LocalId::from_usize(base.index() + slot);
    debug!(temp = temp.index(), %new_ty, "widening shared spill temp");
    body.widen_local(temp, new_ty);

    for i in 0..clique.succ_members().len() {
        let b = clique.succ_members()[i];
        let entries = (0..depth)
            .map(|slot| {
                let local = LocalId::from_usize(base.index() + slot);
                let ty = body.local(local).ty;
                let expr = body.alloc_expr(ExprKind::LocalLoad(local), ty);
                StackEntry { expr, ty }
            })
            .collect();
        let state = EntryState::new(entries);
        let block = body.block_mut(b);
        block.entry_state = Some(state.clone());
        block.flags.remove(BlockFlags::IMPORTED);
        if block.flags.contains(BlockFlags::PENDING) {
            pending.refresh(b, &state);
        } else {
            pending.enqueue(body, b, state)?;
        }
    }

    for i in 0..clique.pred_members().len() {
        let b = clique.pred_members()[i];
        if b == cur_block {
            continue;
        }
        let block = body.block_mut(b);
        block.flags.remove(BlockFlags::IMPORTED);
        if !block.flags.contains(BlockFlags::PENDING) {
            let state = block.entry_state.clone().unwrap_or_else(EntryState::empty);
            pending.enqueue(body, b, state)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingot_ir::BasicBlock;

    // Diamond: b0 -> {b1, b2} -> b3, all related through one join.
    fn diamond() -> (Body, Vec<BlockId>) {
        let mut body = Body::new(&[], TypeTag::Void, 4);
        let ids: Vec<_> =
            (0..4u32).map(|i| body.alloc_block(BasicBlock::new(i..i + 1))).collect();
        body.add_edge(ids[0], ids[1]);
        body.add_edge(ids[0], ids[2]);
        body.add_edge(ids[1], ids[3]);
        body.add_edge(ids[2], ids[3]);
        (body, ids)
    }

    #[test]
    fn closure_spans_the_join() {
        let (body, ids) = diamond();
        let mut clique = SpillClique::new();
        clique.walk(&body, ids[1], CliqueSide::Pred);
        // b1 stores, b3 loads, so b2 (b3's other pred) must store too.
        assert!(clique.pred_members().contains(&ids[1]));
        assert!(clique.pred_members().contains(&ids[2]));
        assert!(clique.succ_members().contains(&ids[3]));
        assert!(!clique.pred_members().contains(&ids[0]));
    }

    #[test]
    fn temps_broadcast_once() {
        let (mut body, ids) = diamond();
        let mut clique = SpillClique::new();
        clique.walk(&body, ids[1], CliqueSide::Pred);
        let base = assign_spill_temps(&mut body, &clique, &[TypeTag::Int32]);
        assert_eq!(body.block(ids[2]).temps_out, Some(base));
        assert_eq!(body.block(ids[3]).temps_in, Some(base));

        // A second walk from the other side reuses the same base.
        let mut clique2 = SpillClique::new();
        clique2.walk(&body, ids[2], CliqueSide::Pred);
        let base2 = assign_spill_temps(&mut body, &clique2, &[TypeTag::Int32]);
        assert_eq!(base2, base);
        assert_eq!(body.locals.len(), 1);
    }
}
