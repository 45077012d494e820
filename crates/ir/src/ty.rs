//! Verifier-level slot types and the widening lattice.

use std::fmt;

/// The type of a value on the evaluation stack.
///
/// These are verifier-level tags, not full metadata types: they carry exactly
/// the distinctions the importer needs to unify values flowing across block
/// boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// 32-bit integer.
    Int32,
    /// 64-bit integer.
    Int64,
    /// Platform pointer-sized integer.
    NativeInt,
    /// 32-bit float.
    Float32,
    /// 64-bit float.
    Float64,
    /// Object reference.
    Ref,
    /// Managed interior pointer.
    ByRef,
    /// Value type, identified by its metadata token.
    Struct(u32),
    /// No value (statement-only expressions).
    Void,
}

impl TypeTag {
    /// Returns `true` for the integer family (including native int).
    #[must_use]
    pub const fn is_int(self) -> bool {
        matches!(self, Self::Int32 | Self::Int64 | Self::NativeInt)
    }

    /// Returns `true` for `Float32`/`Float64`.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float32 | Self::Float64)
    }

    /// Returns `true` if `self` widens to `other` in one lattice step.
    ///
    /// The only legal widenings are `Int32 -> NativeInt`, `Float32 -> Float64`,
    /// `Int32 -> ByRef` and `ByRef -> NativeInt`. Each edge is one-directional,
    /// so repeated widening of a slot terminates.
    #[must_use]
    pub const fn widens_to(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Int32, Self::NativeInt)
                | (Self::Float32, Self::Float64)
                | (Self::Int32, Self::ByRef)
                | (Self::ByRef, Self::NativeInt)
        )
    }

    /// Least upper bound of two slot types under the widening lattice.
    ///
    /// Returns `None` when the two types have no common supertype, which the
    /// importer treats as a fatal type mismatch.
    #[must_use]
    pub fn lub(self, other: Self) -> Option<Self> {
        if self == other {
            return Some(self);
        }
        if self.le(other) {
            return Some(other);
        }
        if other.le(self) {
            return Some(self);
        }
        // Int32 and ByRef both widen to NativeInt; their join through distinct
        // chains still lands there.
        if self.le(Self::NativeInt) && other.le(Self::NativeInt) {
            return Some(Self::NativeInt);
        }
        None
    }

    /// Lattice partial order: `self` ⊑ `other`.
    fn le(self, other: Self) -> bool {
        self == other
            || self.widens_to(other)
            // Int32 -> ByRef -> NativeInt is the one two-step chain.
            || (self == Self::Int32 && other == Self::NativeInt)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int32 => write!(f, "i32"),
            Self::Int64 => write!(f, "i64"),
            Self::NativeInt => write!(f, "nint"),
            Self::Float32 => write!(f, "f32"),
            Self::Float64 => write!(f, "f64"),
            Self::Ref => write!(f, "ref"),
            Self::ByRef => write!(f, "byref"),
            Self::Struct(token) => write!(f, "struct#{token:#x}"),
            Self::Void => write!(f, "void"),
        }
    }
}
