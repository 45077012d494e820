//! Exception-handling region descriptors.
//!
//! Regions are fixed before importation begins; the importer only reads them.
//! `leave` canonicalization adds blocks, never regions.

use crate::EhIndex;
use std::ops::Range;

/// The kind of a handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerKind {
    /// Catches exceptions of the class named by a metadata token.
    Catch(u32),
    /// Runs a filter expression to decide whether to catch.
    Filter,
    /// Runs on both normal and exceptional exit of the try.
    Finally,
    /// Runs only on exceptional exit of the try.
    Fault,
}

impl HandlerKind {
    /// Returns `true` for `finally`/`fault`, whose bodies may not be left by
    /// a `leave`.
    #[must_use]
    pub const fn is_finally_like(self) -> bool {
        matches!(self, Self::Finally | Self::Fault)
    }

    /// Returns `true` for handlers entered with the exception object on the
    /// stack.
    #[must_use]
    pub const fn has_catch_arg(self) -> bool {
        matches!(self, Self::Catch(_) | Self::Filter)
    }
}

/// One protected region and its handler.
#[derive(Clone, Debug)]
pub struct EhRegion {
    /// Handler kind.
    pub kind: HandlerKind,
    /// Half-open offset range of the protected code.
    pub try_range: Range<u32>,
    /// Half-open offset range of the handler body.
    pub handler_range: Range<u32>,
    /// Start of the filter code for [`HandlerKind::Filter`]; the filter runs
    /// from here to `handler_range.start`.
    pub filter_start: Option<u32>,
    /// Innermost try region enclosing this one.
    pub enclosing_try: Option<EhIndex>,
    /// Innermost handler enclosing this one.
    pub enclosing_handler: Option<EhIndex>,
}

impl EhRegion {
    /// Returns `true` if `offset` lies in the protected range.
    #[must_use]
    pub fn try_contains(&self, offset: u32) -> bool {
        self.try_range.contains(&offset)
    }

    /// Returns `true` if `offset` lies in the handler body.
    #[must_use]
    pub fn handler_contains(&self, offset: u32) -> bool {
        self.handler_range.contains(&offset)
    }

    /// Returns `true` if `offset` lies in the filter code.
    #[must_use]
    pub fn filter_contains(&self, offset: u32) -> bool {
        self.filter_start.is_some_and(|start| (start..self.handler_range.start).contains(&offset))
    }

    /// Returns `true` if `offset` lies anywhere in the region: protected
    /// range, handler body, or filter.
    #[must_use]
    pub fn contains(&self, offset: u32) -> bool {
        self.try_contains(offset) || self.handler_contains(offset) || self.filter_contains(offset)
    }
}
