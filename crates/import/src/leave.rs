//! `leave` canonicalization.
//!
//! A `leave` exits every protected region between its source and its target.
//! Each exited `finally` becomes an explicit [`BlockKind::CallFinally`] /
//! [`BlockKind::CallFinallyRet`] pair, chained so the finallys run innermost
//! first; each exited catch or filter handler contributes an end-catch
//! cleanup, coalesced into a single statement. A `leave` that exits nothing
//! degenerates to a plain goto.

use crate::importer::Importer;
use crate::{ImportError, Result};
use ingot_ir::{
    BasicBlock, BlockFlags, BlockId, BlockKind, EntryState, ExprId, ExprKind, TypeTag,
};
use tracing::{debug, instrument};

/// What one exited region contributes to the expansion.
enum Exit {
    /// An exited catch or filter handler body.
    EndCatch,
    /// An exited try protected by a finally; carries the handler entry block.
    CallFinally(BlockId),
    /// An exited try protected by anything else.
    CrossTry,
}

/// The kind an open chain tail takes once its continuation is known.
#[derive(Clone, Copy)]
enum StepRole {
    /// A [`BlockKind::CallFinallyRet`] continuation point.
    FinallyRet,
    /// A plain intermediate jump.
    Goto,
}

impl Importer<'_> {
    /// Expands the `leave` terminating `block`.
    ///
    /// The evaluation stack has already been emptied; the target and any
    /// invoked finally handlers are entered with an empty stack.
    #[instrument(level = "debug", skip_all, fields(offset = offset, target = target))]
    pub(crate) fn import_leave(
        &mut self,
        block: BlockId,
        offset: u32,
        target: u32,
    ) -> Result<()> {
        let target = self.target_block(target, offset)?;
        let target_start = self.body.block(target).range.start;

        // Regions are innermost-first, so exits accumulate in the order the
        // cleanups must run.
        let mut exits = Vec::new();
        for region in self.body.eh_regions.iter() {
            let from_handler =
                region.handler_contains(offset) || region.filter_contains(offset);
            let to_handler =
                region.handler_contains(target_start) || region.filter_contains(target_start);
            if from_handler && !to_handler {
                if region.kind.is_finally_like() {
                    return Err(ImportError::LeaveFromHandler { offset });
                }
                exits.push(Exit::EndCatch);
            }
            if region.try_contains(offset) && !region.try_contains(target_start) {
                if region.kind == ingot_ir::HandlerKind::Finally {
                    let handler = self.target_block(region.handler_range.start, offset)?;
                    exits.push(Exit::CallFinally(handler));
                } else {
                    exits.push(Exit::CrossTry);
                }
            }
        }

        let mut end_catches: Vec<ExprId> = Vec::new();
        let mut catch_exited = false;
        // Tail of the chain built so far: the block whose continuation is
        // still open, and the kind it takes once the continuation is known.
        let mut step: Option<(BlockId, StepRole)> = None;
        let mut finallys = Vec::new();

        for exit in exits {
            match exit {
                Exit::EndCatch => {
                    let e = self.body.alloc_expr(ExprKind::EndCatch, TypeTag::Void);
                    end_catches.push(e);
                    catch_exited = true;
                }
                Exit::CallFinally(handler) => {
                    finallys.push(handler);
                    match step {
                        None => {
                            // Cleanups for handlers inside this try run
                            // before the finally is invoked.
                            self.flush_end_catches(block, &mut end_catches);
                            let ret = self.new_leave_block(block, offset);
                            self.body.block_mut(block).kind =
                                BlockKind::CallFinally { handler, ret };
                            self.body.add_edge(block, handler);
                            self.body.add_edge(block, ret);
                            step = Some((ret, StepRole::FinallyRet));
                        }
                        Some(prev) => {
                            self.flush_end_catches(prev.0, &mut end_catches);
                            let call = self.new_leave_block(block, offset);
                            let ret = self.new_leave_block(block, offset);
                            self.set_step_continuation(prev, call);
                            self.body.block_mut(call).kind =
                                BlockKind::CallFinally { handler, ret };
                            self.body.add_edge(call, handler);
                            self.body.add_edge(call, ret);
                            step = Some((ret, StepRole::FinallyRet));
                        }
                    }
                }
                Exit::CrossTry => {
                    // Crossing a non-finally try while a chain is open needs
                    // an intermediate block so the chain's tail sits outside
                    // the exited region.
                    if let Some(prev) = step {
                        let mid = self.new_leave_block(block, offset);
                        self.set_step_continuation(prev, mid);
                        step = Some((mid, StepRole::Goto));
                    }
                }
            }
        }

        match step {
            Some(prev) => {
                self.flush_end_catches(prev.0, &mut end_catches);
                self.set_step_continuation(prev, target);
            }
            None => {
                self.flush_end_catches(block, &mut end_catches);
                let kind =
                    if catch_exited { BlockKind::CatchRet(target) } else { BlockKind::Goto(target) };
                self.body.block_mut(block).kind = kind;
                self.body.add_edge(block, target);
            }
        }

        debug!(
            finallys = finallys.len(),
            catch_exited,
            "canonicalized leave"
        );

        self.pending.enqueue(&mut self.body, target, EntryState::empty())?;
        for handler in finallys {
            self.pending.enqueue(&mut self.body, handler, EntryState::empty())?;
        }
        Ok(())
    }

    /// Allocates an internal block for the expansion, registered on the
    /// leave block so a retranslation can detach it.
    fn new_leave_block(&mut self, owner: BlockId, offset: u32) -> BlockId {
        let mut b = BasicBlock::internal(offset);
        b.flags |= BlockFlags::IMPORTED;
        let id = self.body.alloc_block(b);
        self.body.block_mut(owner).leave_blocks.push(id);
        id
    }

    /// Points an open chain tail at `next`.
    fn set_step_continuation(&mut self, (step, role): (BlockId, StepRole), next: BlockId) {
        let kind = match role {
            StepRole::FinallyRet => BlockKind::CallFinallyRet { cont: next },
            StepRole::Goto => BlockKind::Goto(next),
        };
        self.body.block_mut(step).kind = kind;
        self.body.add_edge(step, next);
    }

    /// Appends the accumulated end-catch cleanups to `block` as one combined
    /// statement.
    fn flush_end_catches(&mut self, block: BlockId, end_catches: &mut Vec<ExprId>) {
        let mut iter = end_catches.drain(..);
        let Some(first) = iter.next() else { return };
        let combined = iter.collect::<Vec<_>>().into_iter().fold(first, |acc, e| {
            self.body.alloc_expr(ExprKind::Comma(acc, e), TypeTag::Void)
        });
        self.body.block_mut(block).stmts.push(combined);
    }
}
