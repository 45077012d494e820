//! The method body being imported.

use crate::{
    BasicBlock, BlockId, EhIndex, EhRegion, Expr, ExprId, ExprKind, LocalId, TypeTag,
};
use ingot_data_structures::index::IndexVec;

/// A local variable or importer-allocated temporary.
#[derive(Clone, Copy, Debug)]
pub struct Local {
    /// Declared (or currently widened) type.
    pub ty: TypeTag,
    /// `true` for temporaries materialized by spilling.
    pub is_temp: bool,
}

/// A method body: blocks, expression arena, locals and the EH region table.
///
/// Blocks and expressions are arena-allocated and addressed by stable indices;
/// nothing is ever removed from the arenas, so references held by the worklist
/// stay valid while the flow graph is edited.
#[derive(Clone, Debug)]
pub struct Body {
    /// All basic blocks, in creation order (bytecode order for the initial
    /// graph, then synthetic blocks appended).
    pub blocks: IndexVec<BlockId, BasicBlock>,
    /// All expression nodes.
    pub exprs: IndexVec<ExprId, Expr>,
    /// Declared locals followed by importer temporaries.
    pub locals: IndexVec<LocalId, Local>,
    /// Exception regions, innermost-first.
    pub eh_regions: IndexVec<EhIndex, EhRegion>,
    /// Return type of the method; [`TypeTag::Void`] when it returns nothing.
    pub ret_ty: TypeTag,
    /// Maximum evaluation-stack depth declared by the method header.
    pub max_stack: u32,
    /// The method entry block.
    pub entry: BlockId,
}

impl Body {
    /// Creates an empty body with the given declared locals and stack limit.
    #[must_use]
    pub fn new(local_types: &[TypeTag], ret_ty: TypeTag, max_stack: u32) -> Self {
        Self {
            blocks: IndexVec::new(),
            exprs: IndexVec::new(),
            locals: local_types.iter().map(|&ty| Local { ty, is_temp: false }).collect(),
            eh_regions: IndexVec::new(),
            ret_ty,
            max_stack,
            entry: BlockId::from_usize(0),
        }
    }

    /// Returns the basic block for the given ID.
    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id]
    }

    /// Returns a mutable reference to the basic block.
    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id]
    }

    /// Returns the expression for the given ID.
    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    /// Returns the local for the given ID.
    #[must_use]
    pub fn local(&self, id: LocalId) -> &Local {
        &self.locals[id]
    }

    /// Allocates a new expression node.
    pub fn alloc_expr(&mut self, kind: ExprKind, ty: TypeTag) -> ExprId {
        self.exprs.push(Expr::new(kind, ty))
    }

    /// Allocates a new basic block.
    pub fn alloc_block(&mut self, block: BasicBlock) -> BlockId {
        self.blocks.push(block)
    }

    /// Allocates a fresh spill temporary of the given type.
    pub fn alloc_temp(&mut self, ty: TypeTag) -> LocalId {
        self.locals.push(Local { ty, is_temp: true })
    }

    /// Widens the declared type of a temporary in place.
    pub fn widen_local(&mut self, id: LocalId, ty: TypeTag) {
        debug_assert!(self.locals[id].is_temp, "only spill temps are retyped");
        self.locals[id].ty = ty;
    }

    /// Adds a control-flow edge.
    pub fn add_edge(&mut self, pred: BlockId, succ: BlockId) {
        if !self.blocks[pred].succs.contains(&succ) {
            self.blocks[pred].succs.push(succ);
        }
        if !self.blocks[succ].preds.contains(&pred) {
            self.blocks[succ].preds.push(pred);
        }
    }

    /// Removes a control-flow edge, e.g. after folding a constant branch.
    pub fn remove_edge(&mut self, pred: BlockId, succ: BlockId) {
        self.blocks[pred].succs.retain(|&mut b| b != succ);
        self.blocks[succ].preds.retain(|&mut b| b != pred);
    }

    /// Detaches a block from the flow graph entirely.
    pub fn isolate_block(&mut self, id: BlockId) {
        let preds = std::mem::take(&mut self.blocks[id].preds);
        for pred in preds {
            self.blocks[pred].succs.retain(|&mut b| b != id);
        }
        let succs = std::mem::take(&mut self.blocks[id].succs);
        for succ in succs {
            self.blocks[succ].preds.retain(|&mut b| b != id);
        }
    }

    /// Returns `true` if evaluating the expression has observable effects.
    #[must_use]
    pub fn expr_has_side_effects(&self, id: ExprId) -> bool {
        match &self.exprs[id].kind {
            ExprKind::IntCon(_)
            | ExprKind::FloatCon(_)
            | ExprKind::Null
            | ExprKind::LocalLoad(_)
            | ExprKind::LocalAddr(_)
            | ExprKind::CatchArg
            | ExprKind::Nop => false,
            ExprKind::LocalStore(..)
            | ExprKind::StoreInd(..)
            | ExprKind::Call { .. }
            | ExprKind::EndCatch
            | ExprKind::EndFilter(_)
            | ExprKind::Return(_)
            | ExprKind::Throw(_) => true,
            // An indirect load can fault.
            ExprKind::LoadInd(_) => true,
            ExprKind::Unary(_, a) | ExprKind::Convert(a) | ExprKind::JumpTrue(a)
            | ExprKind::SwitchSel(a) => self.expr_has_side_effects(*a),
            ExprKind::Binary(_, a, b)
            | ExprKind::Compare(_, a, b)
            | ExprKind::Comma(a, b) => {
                self.expr_has_side_effects(*a) || self.expr_has_side_effects(*b)
            }
        }
    }

    /// Returns `true` if the expression reads the given local anywhere in its
    /// subtree.
    #[must_use]
    pub fn expr_uses_local(&self, id: ExprId, local: LocalId) -> bool {
        match &self.exprs[id].kind {
            ExprKind::LocalLoad(l) | ExprKind::LocalAddr(l) => *l == local,
            ExprKind::LocalStore(l, v) => *l == local || self.expr_uses_local(*v, local),
            ExprKind::IntCon(_)
            | ExprKind::FloatCon(_)
            | ExprKind::Null
            | ExprKind::CatchArg
            | ExprKind::EndCatch
            | ExprKind::Nop => false,
            ExprKind::Return(v) => v.is_some_and(|v| self.expr_uses_local(v, local)),
            ExprKind::Unary(_, a)
            | ExprKind::Convert(a)
            | ExprKind::LoadInd(a)
            | ExprKind::JumpTrue(a)
            | ExprKind::SwitchSel(a)
            | ExprKind::EndFilter(a)
            | ExprKind::Throw(a) => self.expr_uses_local(*a, local),
            ExprKind::Binary(_, a, b)
            | ExprKind::Compare(_, a, b)
            | ExprKind::StoreInd(a, b)
            | ExprKind::Comma(a, b) => {
                self.expr_uses_local(*a, local) || self.expr_uses_local(*b, local)
            }
            ExprKind::Call { args, .. } => args.iter().any(|&a| self.expr_uses_local(a, local)),
        }
    }

    /// Returns `true` if the expression may read through memory (and so must
    /// be ordered before any store).
    #[must_use]
    pub fn expr_reads_memory(&self, id: ExprId) -> bool {
        match &self.exprs[id].kind {
            ExprKind::LoadInd(_) | ExprKind::Call { .. } => true,
            ExprKind::IntCon(_)
            | ExprKind::FloatCon(_)
            | ExprKind::Null
            | ExprKind::LocalLoad(_)
            | ExprKind::LocalAddr(_)
            | ExprKind::CatchArg
            | ExprKind::EndCatch
            | ExprKind::Nop => false,
            ExprKind::Return(v) => v.is_some_and(|v| self.expr_reads_memory(v)),
            ExprKind::LocalStore(_, a)
            | ExprKind::Unary(_, a)
            | ExprKind::Convert(a)
            | ExprKind::JumpTrue(a)
            | ExprKind::SwitchSel(a)
            | ExprKind::EndFilter(a)
            | ExprKind::Throw(a) => self.expr_reads_memory(*a),
            ExprKind::Binary(_, a, b)
            | ExprKind::Compare(_, a, b)
            | ExprKind::StoreInd(a, b)
            | ExprKind::Comma(a, b) => self.expr_reads_memory(*a) || self.expr_reads_memory(*b),
        }
    }

    /// Returns `true` for an integer constant zero. The guarded
    /// `Int32 -> ByRef` widening is restricted to this shape.
    #[must_use]
    pub fn expr_is_const_zero(&self, id: ExprId) -> bool {
        matches!(self.exprs[id].kind, ExprKind::IntCon(0))
    }

    /// Deep-clones an expression tree. Only used for values cheap to
    /// re-evaluate (constants, local loads); anything else is spilled instead.
    pub fn clone_expr(&mut self, id: ExprId) -> ExprId {
        let Expr { kind, ty } = self.exprs[id].clone();
        let kind = match kind {
            ExprKind::Unary(op, a) => ExprKind::Unary(op, self.clone_expr(a)),
            ExprKind::Convert(a) => ExprKind::Convert(self.clone_expr(a)),
            ExprKind::LoadInd(a) => ExprKind::LoadInd(self.clone_expr(a)),
            ExprKind::Binary(op, a, b) => {
                let (a, b) = (self.clone_expr(a), self.clone_expr(b));
                ExprKind::Binary(op, a, b)
            }
            ExprKind::Compare(op, a, b) => {
                let (a, b) = (self.clone_expr(a), self.clone_expr(b));
                ExprKind::Compare(op, a, b)
            }
            ExprKind::Comma(a, b) => {
                let (a, b) = (self.clone_expr(a), self.clone_expr(b));
                ExprKind::Comma(a, b)
            }
            other => other,
        };
        self.exprs.push(Expr::new(kind, ty))
    }

    /// Looks up the block owning the given bytecode offset as its start.
    #[must_use]
    pub fn block_at_offset(&self, offset: u32) -> Option<BlockId> {
        self.blocks.iter_enumerated().find_map(|(id, b)| {
            (!b.flags.contains(crate::BlockFlags::INTERNAL)
                && b.range.start == offset
                && !b.range.is_empty())
            .then_some(id)
        })
    }
}
