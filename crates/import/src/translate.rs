//! Single-block translation: bytecode to statement trees.

use crate::clique::{assign_spill_temps, CliqueSide};
use crate::decode::{decode, Opcode};
use crate::importer::Importer;
use crate::{ImportError, Result};
use ingot_ir::{
    BlockFlags, BlockId, BlockKind, EntryState, ExprKind, LocalId, StackEntry, TypeTag,
};
use tracing::{instrument, trace};

/// The resolved terminator of a block, staged until the exit stack has been
/// spilled so the spill stores come before the branch.
struct Terminator {
    kind: BlockKind,
    stmt: Option<ingot_ir::ExprId>,
}

impl Importer<'_> {
    /// Translates one block under the given entry state.
    ///
    /// Safe to call again on an already-translated block: all previous output
    /// (statements, outgoing edges, synthetic `leave` expansion blocks) is
    /// discarded first.
    #[instrument(level = "debug", skip_all, fields(block = block.index()))]
    pub(crate) fn import_block(&mut self, block: BlockId, state: &EntryState) -> Result<()> {
        self.cur_block = block;
        self.reset_block(block);
        // Marked before translation so a back edge to this block offers the
        // exit state without re-queueing the block.
        self.body.block_mut(block).flags |= BlockFlags::IMPORTED;
        self.stack.load(state);

        let range = self.body.block(block).range.clone();
        let mut offset = range.start;
        let mut terminator = None;
        while offset < range.end {
            let (op, next) = decode(self.code, offset)?;
            trace!(offset, op = ?op, depth = self.stack.depth(), "translate");
            if let Opcode::Leave(target) = op {
                // Canonicalization replaces the block's terminator entirely.
                self.flush_side_effects(block);
                return self.import_leave(block, offset, target);
            }
            terminator = self.translate_op(block, &op, offset)?;
            offset = next;
        }
        self.finish_block(block, range.end, terminator)
    }

    /// Discards the output of a previous translation of `block`.
    fn reset_block(&mut self, block: BlockId) {
        let b = self.body.block_mut(block);
        b.stmts.clear();
        let succs = std::mem::take(&mut b.succs);
        for succ in succs {
            self.body.block_mut(succ).preds.retain(|&mut p| p != block);
        }
        let leave_blocks = std::mem::take(&mut self.body.block_mut(block).leave_blocks);
        for lb in leave_blocks {
            self.body.isolate_block(lb);
            self.body.block_mut(lb).flags |= BlockFlags::REMOVED;
        }
    }

    fn translate_op(
        &mut self,
        block: BlockId,
        op: &Opcode,
        offset: u32,
    ) -> Result<Option<Terminator>> {
        match *op {
            Opcode::Nop => {}
            Opcode::LdcI4(v) => self.push_expr(ExprKind::IntCon(v.into()), TypeTag::Int32, offset)?,
            Opcode::LdcI8(v) => self.push_expr(ExprKind::IntCon(v), TypeTag::Int64, offset)?,
            Opcode::LdcR4(v) => {
                self.push_expr(ExprKind::FloatCon(v.into()), TypeTag::Float32, offset)?;
            }
            Opcode::LdcR8(v) => self.push_expr(ExprKind::FloatCon(v), TypeTag::Float64, offset)?,
            Opcode::LdNull => self.push_expr(ExprKind::Null, TypeTag::Ref, offset)?,
            Opcode::LdLoc(n) => {
                let local = self.declared_local(n, offset)?;
                let ty = self.body.local(local).ty;
                self.push_expr(ExprKind::LocalLoad(local), ty, offset)?;
            }
            Opcode::LdLocA(n) => {
                let local = self.declared_local(n, offset)?;
                self.push_expr(ExprKind::LocalAddr(local), TypeTag::ByRef, offset)?;
            }
            Opcode::StLoc(n) => {
                let local = self.declared_local(n, offset)?;
                let value = self.stack.pop(offset)?;
                // Pending reads of this local must see its old value, and a
                // pending call must run before the store in case it throws.
                for level in 0..self.stack.depth() {
                    let e = self.stack.entries()[level].expr;
                    if self.body.expr_uses_local(e, local) || self.body.expr_has_side_effects(e) {
                        self.stack.spill(&mut self.body, block, level, None, offset)?;
                    }
                }
                let local_ty = self.body.local(local).ty;
                let value = self.coerce(value, local_ty, offset)?;
                let store = self.body.alloc_expr(ExprKind::LocalStore(local, value), TypeTag::Void);
                self.body.block_mut(block).stmts.push(store);
            }
            Opcode::Bin(bin) => {
                let rhs = self.stack.pop(offset)?;
                let lhs = self.stack.pop(offset)?;
                let ty = TypeTag::lub(lhs.ty, rhs.ty).ok_or_else(|| ImportError::Malformed {
                    offset,
                    message: format!("operands of {} and {} do not mix", lhs.ty, rhs.ty),
                })?;
                self.push_expr(ExprKind::Binary(bin, lhs.expr, rhs.expr), ty, offset)?;
            }
            Opcode::Un(un) => {
                let arg = self.stack.pop(offset)?;
                self.push_expr(ExprKind::Unary(un, arg.expr), arg.ty, offset)?;
            }
            Opcode::Cmp(cmp) => {
                let rhs = self.stack.pop(offset)?;
                let lhs = self.stack.pop(offset)?;
                self.push_expr(ExprKind::Compare(cmp, lhs.expr, rhs.expr), TypeTag::Int32, offset)?;
            }
            Opcode::Conv(ty) => {
                let arg = self.stack.pop(offset)?;
                self.push_expr(ExprKind::Convert(arg.expr), ty, offset)?;
            }
            Opcode::Dup => {
                let top = self.stack.peek(offset)?;
                let expr = if self.trivially_clonable(top.expr) {
                    self.body.clone_expr(top.expr)
                } else {
                    self.stack.spill(&mut self.body, block, self.stack.depth() - 1, None, offset)?;
                    let load = self.stack.peek(offset)?;
                    self.body.clone_expr(load.expr)
                };
                let ty = self.stack.peek(offset)?.ty;
                self.push_expr_id(expr, ty, offset)?;
            }
            Opcode::Pop => {
                let top = self.stack.pop(offset)?;
                if self.body.expr_has_side_effects(top.expr) {
                    self.body.block_mut(block).stmts.push(top.expr);
                }
            }
            Opcode::LdInd(ty) => {
                let addr = self.stack.pop(offset)?;
                self.push_expr(ExprKind::LoadInd(addr.expr), ty, offset)?;
            }
            Opcode::StInd => {
                let value = self.stack.pop(offset)?;
                let addr = self.stack.pop(offset)?;
                // Earlier loads and calls must not be reordered past the
                // store.
                for level in 0..self.stack.depth() {
                    let e = self.stack.entries()[level].expr;
                    if self.body.expr_reads_memory(e) || self.body.expr_has_side_effects(e) {
                        self.stack.spill(&mut self.body, block, level, None, offset)?;
                    }
                }
                let store =
                    self.body.alloc_expr(ExprKind::StoreInd(addr.expr, value.expr), TypeTag::Void);
                self.body.block_mut(block).stmts.push(store);
            }
            Opcode::Call(token) => {
                let sig = self
                    .resolver
                    .resolve_call(token)
                    .map_err(|abort| ImportError::Aborted(abort.0))?;
                let mut args = vec![ingot_ir::ExprId::from_usize(0); sig.params.len()];
                for (i, &param_ty) in sig.params.iter().enumerate().rev() {
                    let arg = self.stack.pop(offset)?;
                    args[i] = self.coerce(arg, param_ty, offset)?;
                }
                // The callee may write state the remaining entries observe.
                for level in 0..self.stack.depth() {
                    let expr = self.stack.entries()[level].expr;
                    if self.body.expr_has_side_effects(expr) || self.body.expr_reads_memory(expr) {
                        self.stack.spill(&mut self.body, block, level, None, offset)?;
                    }
                }
                let call = ExprKind::Call { token, args };
                if sig.ret == TypeTag::Void {
                    let stmt = self.body.alloc_expr(call, TypeTag::Void);
                    self.body.block_mut(block).stmts.push(stmt);
                } else {
                    self.push_expr(call, sig.ret, offset)?;
                }
            }
            Opcode::Br(target) => {
                let target = self.target_block(target, offset)?;
                return Ok(Some(Terminator { kind: BlockKind::Goto(target), stmt: None }));
            }
            Opcode::BrTrue(target) | Opcode::BrFalse(target) => {
                let invert = matches!(*op, Opcode::BrFalse(_));
                let cond = self.stack.pop(offset)?;
                if let ExprKind::IntCon(v) = self.body.expr(cond.expr).kind {
                    // Constant condition: fold the branch and drop the
                    // untaken edge.
                    let taken = (v != 0) != invert;
                    let kind = if taken {
                        BlockKind::Goto(self.target_block(target, offset)?)
                    } else {
                        BlockKind::Fallthrough
                    };
                    return Ok(Some(Terminator { kind, stmt: None }));
                }
                let cond = if invert {
                    let zero = self.body.alloc_expr(ExprKind::IntCon(0), cond.ty);
                    self.body.alloc_expr(
                        ExprKind::Compare(ingot_ir::CmpOp::Eq, cond.expr, zero),
                        TypeTag::Int32,
                    )
                } else {
                    cond.expr
                };
                let stmt = self.body.alloc_expr(ExprKind::JumpTrue(cond), TypeTag::Void);
                let target = self.target_block(target, offset)?;
                return Ok(Some(Terminator {
                    kind: BlockKind::Cond { target },
                    stmt: Some(stmt),
                }));
            }
            Opcode::Switch(ref targets) => {
                let sel = self.stack.pop(offset)?;
                if let ExprKind::IntCon(v) = self.body.expr(sel.expr).kind {
                    let kind = match usize::try_from(v).ok().and_then(|v| targets.get(v)) {
                        Some(&t) => BlockKind::Goto(self.target_block(t, offset)?),
                        None => BlockKind::Fallthrough,
                    };
                    return Ok(Some(Terminator { kind, stmt: None }));
                }
                let stmt = self.body.alloc_expr(ExprKind::SwitchSel(sel.expr), TypeTag::Void);
                let targets = targets
                    .iter()
                    .map(|&t| self.target_block(t, offset))
                    .collect::<Result<_>>()?;
                return Ok(Some(Terminator {
                    kind: BlockKind::Switch { targets },
                    stmt: Some(stmt),
                }));
            }
            Opcode::Ret => {
                let value = if self.body.ret_ty == TypeTag::Void {
                    None
                } else {
                    let v = self.stack.pop(offset)?;
                    let ret_ty = self.body.ret_ty;
                    Some(self.coerce(v, ret_ty, offset)?)
                };
                if !self.stack.is_empty() {
                    return Err(ImportError::Malformed {
                        offset,
                        message: "evaluation stack not empty at return".into(),
                    });
                }
                let stmt = self.body.alloc_expr(ExprKind::Return(value), TypeTag::Void);
                return Ok(Some(Terminator { kind: BlockKind::Return, stmt: Some(stmt) }));
            }
            Opcode::Throw => {
                let exc = self.stack.pop(offset)?;
                self.flush_side_effects(block);
                let stmt = self.body.alloc_expr(ExprKind::Throw(exc.expr), TypeTag::Void);
                return Ok(Some(Terminator { kind: BlockKind::Throw, stmt: Some(stmt) }));
            }
            Opcode::EndFinally => {
                self.flush_side_effects(block);
                return Ok(Some(Terminator { kind: BlockKind::FinallyRet, stmt: None }));
            }
            Opcode::EndFilter => {
                let verdict = self.stack.pop(offset)?;
                self.flush_side_effects(block);
                let stmt = self.body.alloc_expr(ExprKind::EndFilter(verdict.expr), TypeTag::Void);
                return Ok(Some(Terminator { kind: BlockKind::FilterRet, stmt: Some(stmt) }));
            }
            Opcode::Leave(_) => unreachable!("handled by the canonicalizer"),
        }
        Ok(None)
    }

    /// Finalizes a block: rebuilds outgoing edges, spills the exit stack
    /// into the spill clique's temps, appends the staged terminator, and
    /// offers the exit state to every successor.
    fn finish_block(
        &mut self,
        block: BlockId,
        end_offset: u32,
        terminator: Option<Terminator>,
    ) -> Result<()> {
        let (kind, stmt) = match terminator {
            Some(t) => (t.kind, t.stmt),
            None => (BlockKind::Fallthrough, None),
        };
        self.body.block_mut(block).kind = kind.clone();

        // Edges go in before the exit stack is spilled: the clique walk must
        // see every successor, including a back edge to this block.
        match kind {
            BlockKind::Goto(t) => self.body.add_edge(block, t),
            BlockKind::Cond { target } => {
                self.body.add_edge(block, target);
                let next = self.target_block(end_offset, end_offset)?;
                self.body.add_edge(block, next);
            }
            BlockKind::Switch { ref targets } => {
                for &t in targets {
                    self.body.add_edge(block, t);
                }
                let next = self.target_block(end_offset, end_offset)?;
                self.body.add_edge(block, next);
            }
            BlockKind::Fallthrough => {
                let next = self.target_block(end_offset, end_offset)?;
                self.body.add_edge(block, next);
            }
            _ => {}
        }

        let exit_state = if self.stack.is_empty() {
            EntryState::empty()
        } else {
            self.spill_exit_stack(block, end_offset)?
        };

        if let Some(stmt) = stmt {
            self.body.block_mut(block).stmts.push(stmt);
        }

        let succs = self.body.block(block).succs.clone();
        for succ in succs {
            self.pending.enqueue(&mut self.body, succ, exit_state.clone())?;
        }
        Ok(())
    }

    /// Spills every live stack value into the clique's shared temps,
    /// reconciling the value types with the temp types.
    ///
    /// A value narrower than its temp is stored through a conversion. A value
    /// wider than its temp widens the temp instead, which retranslates every
    /// clique member that already consumed the old type. An `Int32` meeting a
    /// `ByRef` temp is only accepted when the value is a constant zero (the
    /// null byref); anything that does not unify is fatal.
    fn spill_exit_stack(&mut self, block: BlockId, offset: u32) -> Result<EntryState> {
        let depth = self.stack.depth();
        self.clique.walk(&self.body, block, CliqueSide::Pred);
        let slot_types: Vec<TypeTag> = self.stack.entries().iter().map(|e| e.ty).collect();
        let base = assign_spill_temps(&mut self.body, &self.clique, &slot_types);

        for level in 0..depth {
            let temp = LocalId::from_usize(base.index() + level);
            let entry = self.stack.entries()[level];
            let temp_ty = self.body.local(temp).ty;
            let unified = TypeTag::lub(entry.ty, temp_ty).ok_or(ImportError::TypeMismatch {
                offset,
                temp: temp.index(),
                expected: temp_ty,
                found: entry.ty,
            })?;
            if temp_ty == TypeTag::ByRef
                && entry.ty == TypeTag::Int32
                && !self.body.expr_is_const_zero(entry.expr)
            {
                return Err(ImportError::TypeMismatch {
                    offset,
                    temp: temp.index(),
                    expected: temp_ty,
                    found: entry.ty,
                });
            }
            if unified != temp_ty {
                crate::clique::retype_and_reimport(
                    &mut self.body,
                    &mut self.pending,
                    &self.clique,
                    block,
                    base,
                    level,
                    unified,
                    depth,
                )?;
            }
            self.stack.spill(&mut self.body, block, level, Some(temp), offset)?;
        }
        Ok(self.stack.snapshot())
    }

    /// Sequences side-effecting values still on the stack as statements, then
    /// discards the rest. Terminators that abandon the evaluation stack must
    /// not drop an observable effect with it.
    fn flush_side_effects(&mut self, block: BlockId) {
        for level in 0..self.stack.depth() {
            let expr = self.stack.entries()[level].expr;
            if self.body.expr_has_side_effects(expr) {
                self.body.block_mut(block).stmts.push(expr);
            }
        }
        self.stack.clear();
    }

    fn push_expr(&mut self, kind: ExprKind, ty: TypeTag, offset: u32) -> Result<()> {
        let expr = self.body.alloc_expr(kind, ty);
        self.push_expr_id(expr, ty, offset)
    }

    fn push_expr_id(&mut self, expr: ingot_ir::ExprId, ty: TypeTag, offset: u32) -> Result<()> {
        self.stack.push(StackEntry { expr, ty }, offset)
    }

    /// Inserts a conversion when a value's stack type differs from the type
    /// of the slot consuming it.
    fn coerce(
        &mut self,
        entry: StackEntry,
        want: TypeTag,
        offset: u32,
    ) -> Result<ingot_ir::ExprId> {
        if entry.ty == want {
            return Ok(entry.expr);
        }
        if TypeTag::lub(entry.ty, want).is_none() {
            return Err(ImportError::Malformed {
                offset,
                message: format!("value of type {} where {want} is expected", entry.ty),
            });
        }
        Ok(self.body.alloc_expr(ExprKind::Convert(entry.expr), want))
    }

    fn trivially_clonable(&self, expr: ingot_ir::ExprId) -> bool {
        matches!(
            self.body.expr(expr).kind,
            ExprKind::IntCon(_)
                | ExprKind::FloatCon(_)
                | ExprKind::Null
                | ExprKind::LocalLoad(_)
                | ExprKind::LocalAddr(_)
        )
    }

    fn declared_local(&self, n: u16, offset: u32) -> Result<LocalId> {
        let local = LocalId::from_usize(n as usize);
        if (n as usize) < self.body.locals.len() && !self.body.local(local).is_temp {
            Ok(local)
        } else {
            Err(ImportError::Malformed {
                offset,
                message: format!("local {n} is not declared"),
            })
        }
    }

    pub(crate) fn target_block(&self, offset: u32, at: u32) -> Result<BlockId> {
        self.body.block_at_offset(offset).ok_or(ImportError::Malformed {
            offset: at,
            message: "no block starts at branch target".into(),
        })
    }
}
