//! Tree-shaped intermediate representation (IR).
//!
//! The IR a method body is imported into: arena-allocated expression trees
//! grouped into statements, statements grouped into basic blocks, and the
//! exception-region table that importation reads.

use ingot_data_structures::newtype_index;

mod ty;
pub use ty::TypeTag;

mod expr;
pub use expr::{BinOp, CmpOp, Expr, ExprKind, UnOp};

mod block;
pub use block::{BasicBlock, BlockFlags, BlockKind, EntryState, StackEntry};

mod eh;
pub use eh::{EhRegion, HandlerKind};

mod body;
pub use body::{Body, Local};

mod display;
pub use display::body_to_string;

newtype_index! {
    /// A unique identifier for an expression node.
    pub struct ExprId;
}

newtype_index! {
    /// A unique identifier for a basic block.
    pub struct BlockId;
}

newtype_index! {
    /// A unique identifier for a local variable or spill temporary.
    pub struct LocalId;
}

newtype_index! {
    /// A unique identifier for an exception-handling region.
    pub struct EhIndex;
}
