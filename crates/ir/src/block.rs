//! Basic blocks.

use crate::{BlockId, EhIndex, ExprId, LocalId, TypeTag};
use smallvec::SmallVec;
use std::ops::Range;

bitflags::bitflags! {
    /// Per-block state flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct BlockFlags: u16 {
        /// Translation of this block has completed.
        const IMPORTED = 1 << 0;
        /// The block is currently on the pending worklist.
        const PENDING = 1 << 1;
        /// Synthesized during importation; owns no bytecode range.
        const INTERNAL = 1 << 2;
        /// Target of a backward jump.
        const BACKWARD_JUMP_TARGET = 1 << 3;
        /// Detached from the flow graph (undone leave expansion).
        const REMOVED = 1 << 4;
        /// Entry block of an exception handler.
        const HANDLER_ENTRY = 1 << 5;
    }
}

/// What a block does when control leaves it.
///
/// The data for a conditional branch or switch (the condition/selector tree)
/// lives in the block's last statement; the kind only carries targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockKind {
    /// Falls through to the next block in offset order.
    Fallthrough,
    /// Unconditional jump.
    Goto(BlockId),
    /// Two-way branch: jump to `target` when the last statement's condition
    /// holds, else fall through.
    Cond {
        /// Taken-branch target.
        target: BlockId,
    },
    /// Multi-way branch on the last statement's selector; out-of-range
    /// selectors fall through.
    Switch {
        /// Case targets, indexed by selector value.
        targets: Vec<BlockId>,
    },
    /// Invoke a finally handler, then resume at the paired
    /// [`BlockKind::CallFinallyRet`] block.
    CallFinally {
        /// Entry block of the finally handler.
        handler: BlockId,
        /// The paired continuation block.
        ret: BlockId,
    },
    /// Control point a called finally returns to; continues at `cont`.
    CallFinallyRet {
        /// Where the chain continues.
        cont: BlockId,
    },
    /// Not-yet-canonicalized `leave`, by target bytecode offset.
    Leave {
        /// Bytecode offset of the leave target.
        target: u32,
    },
    /// Exit of a catch handler, resuming at the given block.
    CatchRet(BlockId),
    /// Exit of a filter, yielding the filter verdict.
    FilterRet,
    /// Exit of a finally/fault handler, returning to the pending call site.
    FinallyRet,
    /// Ends in a raised exception.
    Throw,
    /// Returns from the method.
    Return,
}

impl BlockKind {
    /// Returns the mnemonic for this block kind.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::Fallthrough => "fall",
            Self::Goto(_) => "goto",
            Self::Cond { .. } => "cond",
            Self::Switch { .. } => "switch",
            Self::CallFinally { .. } => "callfinally",
            Self::CallFinallyRet { .. } => "callfinallyret",
            Self::Leave { .. } => "leave",
            Self::CatchRet(_) => "catchret",
            Self::FilterRet => "filterret",
            Self::FinallyRet => "finallyret",
            Self::Throw => "throw",
            Self::Return => "ret",
        }
    }
}

/// A basic block.
#[derive(Clone, Debug)]
pub struct BasicBlock {
    /// Half-open bytecode offset range this block owns. Empty for internal
    /// blocks, which own no bytecode.
    pub range: Range<u32>,
    /// The block kind.
    pub kind: BlockKind,
    /// State flags.
    pub flags: BlockFlags,
    /// Ordered statement list: roots of fully-formed expression trees.
    pub stmts: Vec<ExprId>,
    /// Predecessor blocks.
    pub preds: SmallVec<[BlockId; 2]>,
    /// Successor blocks.
    pub succs: SmallVec<[BlockId; 2]>,
    /// The accepted entry stack. Replaced wholesale on reimport, never
    /// mutated in place.
    pub entry_state: Option<EntryState>,
    /// First of the contiguous run of temps this block's entry stack loads
    /// from, shared across the spill clique.
    pub temps_in: Option<LocalId>,
    /// First of the contiguous run of temps this block's exit stack stores
    /// to, shared across the spill clique.
    pub temps_out: Option<LocalId>,
    /// Innermost try region whose protected range contains this block.
    pub try_index: Option<EhIndex>,
    /// Innermost handler whose range contains this block.
    pub handler_index: Option<EhIndex>,
    /// Synthetic blocks produced by a previous `leave` expansion of this
    /// block; detached before re-expansion on reimport.
    pub leave_blocks: SmallVec<[BlockId; 2]>,
}

impl BasicBlock {
    /// Creates a block owning `range`.
    #[must_use]
    pub fn new(range: Range<u32>) -> Self {
        Self {
            range,
            kind: BlockKind::Fallthrough,
            flags: BlockFlags::default(),
            stmts: Vec::new(),
            preds: SmallVec::new(),
            succs: SmallVec::new(),
            entry_state: None,
            temps_in: None,
            temps_out: None,
            try_index: None,
            handler_index: None,
            leave_blocks: SmallVec::new(),
        }
    }

    /// Creates an internal block at `offset`, owning no bytecode.
    #[must_use]
    pub fn internal(offset: u32) -> Self {
        let mut block = Self::new(offset..offset);
        block.flags |= BlockFlags::INTERNAL;
        block
    }

    /// Returns `true` if translation of this block has completed.
    #[must_use]
    pub const fn is_imported(&self) -> bool {
        self.flags.contains(BlockFlags::IMPORTED)
    }

    /// Depth of the accepted entry stack (0 before first seeding).
    #[must_use]
    pub fn entry_depth(&self) -> usize {
        self.entry_state.as_ref().map_or(0, EntryState::depth)
    }
}

/// A value on the evaluation stack: an expression tree plus its slot type.
#[derive(Clone, Copy, Debug)]
pub struct StackEntry {
    /// The value.
    pub expr: ExprId,
    /// Verifier-level type of the value.
    pub ty: TypeTag,
}

/// An immutable snapshot of the evaluation stack accepted as a block's
/// pre-state.
#[derive(Clone, Debug)]
pub struct EntryState {
    entries: Box<[StackEntry]>,
}

impl EntryState {
    /// Creates a snapshot from the given entries, bottom of stack first.
    #[must_use]
    pub fn new(entries: Box<[StackEntry]>) -> Self {
        Self { entries }
    }

    /// An empty pre-state.
    #[must_use]
    pub fn empty() -> Self {
        Self { entries: Box::new([]) }
    }

    /// Stack depth of the snapshot.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// The snapshotted entries, bottom of stack first.
    #[must_use]
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }
}
