//! IR expression trees.

use crate::{ExprId, LocalId, TypeTag};
use std::fmt;

/// An expression node.
///
/// Expression trees are single-use: a node is referenced by exactly one parent
/// (or by one statement root, or one stack slot). Values that must be used more
/// than once are spilled to a temporary first.
#[derive(Clone, Debug)]
pub struct Expr {
    /// The kind of expression.
    pub kind: ExprKind,
    /// The result type; [`TypeTag::Void`] for statement-only nodes.
    pub ty: TypeTag,
}

impl Expr {
    /// Creates a new expression.
    #[must_use]
    pub const fn new(kind: ExprKind, ty: TypeTag) -> Self {
        Self { kind, ty }
    }
}

/// The kind of an expression.
#[derive(Clone, Debug)]
pub enum ExprKind {
    /// Integer constant (32-bit, 64-bit or native, per the node type).
    IntCon(i64),
    /// Floating constant (32- or 64-bit per the node type).
    FloatCon(f64),
    /// Null object reference.
    Null,
    /// Read a local or temporary.
    LocalLoad(LocalId),
    /// Address of a local, as a managed byref.
    LocalAddr(LocalId),
    /// Store into a local or temporary.
    LocalStore(LocalId, ExprId),
    /// Unary arithmetic.
    Unary(UnOp, ExprId),
    /// Binary arithmetic.
    Binary(BinOp, ExprId, ExprId),
    /// Comparison producing a 32-bit 0/1.
    Compare(CmpOp, ExprId, ExprId),
    /// Numeric conversion to the node type.
    Convert(ExprId),
    /// Indirect load through a byref/native pointer.
    LoadInd(ExprId),
    /// Indirect store: `*addr = value`.
    StoreInd(ExprId, ExprId),
    /// Call to the method identified by a metadata token.
    Call {
        /// Metadata token of the callee.
        token: u32,
        /// Arguments, left to right.
        args: Vec<ExprId>,
    },
    /// The caught exception object at a catch/filter handler entry.
    CatchArg,
    /// Cleanup operation that terminates the innermost active catch.
    EndCatch,
    /// Sequences two expressions, yielding the second.
    Comma(ExprId, ExprId),
    /// Conditional-branch condition; last statement of a conditional block.
    JumpTrue(ExprId),
    /// Switch selector; last statement of a switch block.
    SwitchSel(ExprId),
    /// Filter verdict; last statement of a filter-return block.
    EndFilter(ExprId),
    /// Method return, with the returned value if any.
    Return(Option<ExprId>),
    /// Raise the given exception object.
    Throw(ExprId),
    /// No operation.
    Nop,
}

impl ExprKind {
    /// Returns the mnemonic for this expression.
    #[must_use]
    pub const fn mnemonic(&self) -> &'static str {
        match self {
            Self::IntCon(_) => "const.i",
            Self::FloatCon(_) => "const.f",
            Self::Null => "null",
            Self::LocalLoad(_) => "ldloc",
            Self::LocalAddr(_) => "ldloca",
            Self::LocalStore(..) => "stloc",
            Self::Unary(..) => "unary",
            Self::Binary(..) => "binary",
            Self::Compare(..) => "cmp",
            Self::Convert(_) => "conv",
            Self::LoadInd(_) => "ldind",
            Self::StoreInd(..) => "stind",
            Self::Call { .. } => "call",
            Self::CatchArg => "catch.arg",
            Self::EndCatch => "end.catch",
            Self::Comma(..) => "comma",
            Self::JumpTrue(_) => "jmptrue",
            Self::SwitchSel(_) => "switch",
            Self::EndFilter(_) => "end.filter",
            Self::Return(_) => "ret",
            Self::Throw(_) => "throw",
            Self::Nop => "nop",
        }
    }
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    /// `a + b`
    Add,
    /// `a - b`
    Sub,
    /// `a * b`
    Mul,
    /// `a / b`
    Div,
    /// `a % b`
    Rem,
    /// `a & b`
    And,
    /// `a | b`
    Or,
    /// `a ^ b`
    Xor,
    /// `a << b`
    Shl,
    /// `a >> b`
    Shr,
}

/// Unary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    /// `-a`
    Neg,
    /// `~a`
    Not,
}

/// Comparison operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    /// `a == b`
    Eq,
    /// `a != b`
    Ne,
    /// `a < b`
    Lt,
    /// `a <= b`
    Le,
    /// `a > b`
    Gt,
    /// `a >= b`
    Ge,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Rem => "rem",
            Self::And => "and",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::Shl => "shl",
            Self::Shr => "shr",
        };
        f.write_str(s)
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Neg => "neg",
            Self::Not => "not",
        })
    }
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Gt => "gt",
            Self::Ge => "ge",
        };
        f.write_str(s)
    }
}
