//! The import driver.

use crate::clique::SpillClique;
use crate::pending::PendingSet;
use crate::resolve::TokenResolver;
use crate::stack::ImportStack;
use crate::Result;
use ingot_ir::{BlockId, Body, EntryState, ExprKind, StackEntry, TypeTag};
use tracing::{debug, instrument};

/// Knobs for a single importation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImportOptions {
    /// Extra evaluation-stack headroom beyond the method's declared maximum,
    /// for callers that import a method into a context with values already
    /// on the stack.
    pub inline_headroom: usize,
}

/// Translates a method's bytecode into its [`Body`]'s expression trees.
///
/// Construction takes a body whose flow graph has been built (see
/// [`crate::build_flow_graph`]); [`Importer::import`] runs the worklist to a
/// fixed point and yields the finished body.
pub struct Importer<'a> {
    pub(crate) body: Body,
    pub(crate) code: &'a [u8],
    pub(crate) resolver: &'a dyn TokenResolver,
    pub(crate) pending: PendingSet,
    pub(crate) stack: ImportStack,
    pub(crate) clique: SpillClique,
    pub(crate) cur_block: BlockId,
}

impl<'a> Importer<'a> {
    /// Creates an importer over a freshly built flow graph.
    pub fn new(
        body: Body,
        code: &'a [u8],
        resolver: &'a dyn TokenResolver,
        options: ImportOptions,
    ) -> Self {
        let limit = body.max_stack as usize + options.inline_headroom;
        let entry = body.entry;
        Self {
            body,
            code,
            resolver,
            pending: PendingSet::new(),
            stack: ImportStack::new(limit),
            clique: SpillClique::new(),
            cur_block: entry,
        }
    }

    /// Runs importation to a fixed point.
    ///
    /// Blocks reachable from the entry are translated first; exception
    /// handlers are then seeded with their entry stack (the caught exception
    /// object for catch and filter handlers) and translated the same way,
    /// until no block is pending.
    #[instrument(level = "debug", skip_all)]
    pub fn import(mut self) -> Result<Body> {
        let entry = self.body.entry;
        self.pending.enqueue(&mut self.body, entry, EntryState::empty())?;
        self.drain()?;

        for i in 0..self.body.eh_regions.len() {
            let eh = ingot_ir::EhIndex::from_usize(i);
            let region = &self.body.eh_regions[eh];
            let kind = region.kind;
            let entries = [Some(region.handler_range.start), region.filter_start];
            for off in entries.into_iter().flatten() {
                let Some(block) = self.body.block_at_offset(off) else { continue };
                let state = if kind.has_catch_arg() {
                    let expr = self.body.alloc_expr(ExprKind::CatchArg, TypeTag::Ref);
                    EntryState::new(Box::new([StackEntry { expr, ty: TypeTag::Ref }]))
                } else {
                    EntryState::empty()
                };
                self.pending.enqueue(&mut self.body, block, state)?;
            }
            self.drain()?;
        }

        debug!(
            blocks = self.body.blocks.len(),
            exprs = self.body.exprs.len(),
            locals = self.body.locals.len(),
            "importation finished"
        );
        Ok(self.body)
    }

    fn drain(&mut self) -> Result<()> {
        while let Some((block, state)) = self.pending.dequeue(&mut self.body) {
            self.import_block(block, &state)?;
        }
        Ok(())
    }
}
