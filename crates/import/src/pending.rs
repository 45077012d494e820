//! The pending-block worklist.
//!
//! Blocks waiting for (re)translation are kept on an intrusive list of
//! descriptors, each pairing a block with the entry state it will be
//! translated under. Dequeued descriptors go on a free list and are recycled.

use crate::{ImportError, Result};
use ingot_ir::{BlockFlags, BlockId, Body, EntryState};
use tracing::trace;

#[derive(Debug)]
struct PendingDesc {
    block: BlockId,
    state: EntryState,
    next: Option<usize>,
}

/// FIFO-ish worklist of blocks awaiting translation.
#[derive(Debug, Default)]
pub(crate) struct PendingSet {
    descs: Vec<PendingDesc>,
    head: Option<usize>,
    free: Option<usize>,
}

impl PendingSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Offers `state` as the entry state of `block` and queues it for
    /// translation if needed.
    ///
    /// The first offer is accepted unconditionally. Later offers must agree
    /// on depth with the accepted state; a disagreement is a fatal
    /// [`ImportError::DepthMismatch`]. A block already pending or already
    /// imported is not re-queued.
    pub(crate) fn enqueue(
        &mut self,
        body: &mut Body,
        block: BlockId,
        state: EntryState,
    ) -> Result<()> {
        let b = body.block_mut(block);
        match &b.entry_state {
            None => {
                trace!(block = block.index(), depth = state.depth(), "first entry state");
                b.entry_state = Some(state.clone());
            }
            Some(existing) => {
                if existing.depth() != state.depth() {
                    return Err(ImportError::DepthMismatch {
                        block: block.index(),
                        expected: existing.depth(),
                        found: state.depth(),
                    });
                }
                if b.flags.intersects(BlockFlags::PENDING | BlockFlags::IMPORTED) {
                    return Ok(());
                }
            }
        }
        let b = body.block_mut(block);
        b.flags |= BlockFlags::PENDING;
        self.push(block, state);
        Ok(())
    }

    /// Takes the next pending block, clearing its pending flag.
    pub(crate) fn dequeue(&mut self, body: &mut Body) -> Option<(BlockId, EntryState)> {
        let idx = self.head?;
        let desc = &mut self.descs[idx];
        self.head = desc.next;
        let block = desc.block;
        let state = std::mem::replace(&mut desc.state, EntryState::empty());
        desc.next = self.free;
        self.free = Some(idx);
        body.block_mut(block).flags.remove(BlockFlags::PENDING);
        Some((block, state))
    }

    /// Replaces the queued entry state of a still-pending block, after its
    /// spill temps were retyped.
    pub(crate) fn refresh(&mut self, block: BlockId, state: &EntryState) {
        let mut cur = self.head;
        while let Some(idx) = cur {
            if self.descs[idx].block == block {
                self.descs[idx].state = state.clone();
                return;
            }
            cur = self.descs[idx].next;
        }
    }

    fn push(&mut self, block: BlockId, state: EntryState) {
        let next = self.head;
        match self.free {
            Some(idx) => {
                self.free = self.descs[idx].next;
                self.descs[idx] = PendingDesc { block, state, next };
                self.head = Some(idx);
            }
            None => {
                self.descs.push(PendingDesc { block, state, next });
                self.head = Some(self.descs.len() - 1);
            }
        }
    }
}
