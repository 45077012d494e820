//! The importer's evaluation stack.

use crate::{ImportError, Result};
use ingot_ir::{Body, EntryState, ExprKind, LocalId, StackEntry, TypeTag};

/// The evaluation stack, owned by the importer and reloaded from a block's
/// entry state at the start of each translation.
///
/// Entries are expression trees under construction; nothing on the stack is
/// part of a block's statement list until it is popped into one or spilled.
#[derive(Debug)]
pub struct ImportStack {
    entries: Vec<StackEntry>,
    limit: usize,
    spilling: bool,
}

impl ImportStack {
    /// Creates an empty stack bounded by `limit` entries.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self { entries: Vec::with_capacity(limit.min(64)), limit, spilling: false }
    }

    /// Current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Discards all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replaces the contents with a block's accepted entry state.
    pub fn load(&mut self, state: &EntryState) {
        self.entries.clear();
        self.entries.extend_from_slice(state.entries());
    }

    /// Snapshots the current contents, bottom of stack first.
    #[must_use]
    pub fn snapshot(&self) -> EntryState {
        EntryState::new(self.entries.iter().copied().collect())
    }

    /// The entries, bottom of stack first.
    #[must_use]
    pub fn entries(&self) -> &[StackEntry] {
        &self.entries
    }

    /// Pushes a value. Fails with [`ImportError::StackOverflow`] past the
    /// declared limit.
    pub fn push(&mut self, entry: StackEntry, offset: u32) -> Result<()> {
        if self.entries.len() >= self.limit {
            return Err(ImportError::StackOverflow { offset, limit: self.limit });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Pops the top value.
    pub fn pop(&mut self, offset: u32) -> Result<StackEntry> {
        self.entries.pop().ok_or(ImportError::StackUnderflow { offset })
    }

    /// The top value, without popping it.
    pub fn peek(&self, offset: u32) -> Result<StackEntry> {
        self.entries.last().copied().ok_or(ImportError::StackUnderflow { offset })
    }

    /// Spills the entry at `level` (0 = bottom of stack) into a temporary and
    /// replaces it with a load of that temporary.
    ///
    /// When `target` is given the value is stored into that existing temp,
    /// otherwise a fresh one is allocated. Returns the temp used. Already
    /// spilled entries (a bare load of a temp) are left alone when no
    /// explicit target is forced, keeping the operation idempotent.
    ///
    /// The operation appends a store statement to `block`'s statement list,
    /// which must not recursively trigger another spill; a reentrant call
    /// fails fast with [`ImportError::ReentrantSpill`].
    pub fn spill(
        &mut self,
        body: &mut Body,
        block: ingot_ir::BlockId,
        level: usize,
        target: Option<LocalId>,
        offset: u32,
    ) -> Result<LocalId> {
        if std::mem::replace(&mut self.spilling, true) {
            self.spilling = false;
            return Err(ImportError::ReentrantSpill { offset });
        }
        let result = self.spill_inner(body, block, level, target, offset);
        self.spilling = false;
        result
    }

    fn spill_inner(
        &mut self,
        body: &mut Body,
        block: ingot_ir::BlockId,
        level: usize,
        target: Option<LocalId>,
        offset: u32,
    ) -> Result<LocalId> {
        let Some(entry) = self.entries.get(level).copied() else {
            return Err(ImportError::StackUnderflow { offset });
        };
        // A bare load of a temp is already spilled; a load of the forced
        // target would store the temp into itself.
        if let ExprKind::LocalLoad(local) = body.expr(entry.expr).kind {
            if body.local(local).is_temp && (target.is_none() || target == Some(local)) {
                let ty = body.local(local).ty;
                if ty != entry.ty {
                    // The temp was widened after this load was built.
                    let load = body.alloc_expr(ExprKind::LocalLoad(local), ty);
                    self.entries[level] = StackEntry { expr: load, ty };
                }
                return Ok(local);
            }
        }
        let temp = match target {
            Some(t) => t,
            None => body.alloc_temp(entry.ty),
        };
        let temp_ty = body.local(temp).ty;
        let value = if temp_ty == entry.ty {
            entry.expr
        } else {
            body.alloc_expr(ExprKind::Convert(entry.expr), temp_ty)
        };
        let store = body.alloc_expr(ExprKind::LocalStore(temp, value), TypeTag::Void);
        body.block_mut(block).stmts.push(store);
        let load = body.alloc_expr(ExprKind::LocalLoad(temp), temp_ty);
        self.entries[level] = StackEntry { expr: load, ty: temp_ty };
        Ok(temp)
    }
}
