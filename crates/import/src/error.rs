//! Importation errors.

use ingot_ir::TypeTag;

/// Importer result type.
pub type Result<T, E = ImportError> = std::result::Result<T, E>;

/// A fatal, method-level importation failure.
///
/// Every variant aborts translation of the current method; recoverable type
/// divergences never surface here, they are resolved by widening and bounded
/// retranslation inside the importer.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ImportError {
    /// More values pushed than the declared maximum stack depth allows.
    #[error("evaluation stack overflow at offset {offset:#x} (limit {limit})")]
    StackOverflow {
        /// Offset of the offending instruction.
        offset: u32,
        /// Effective stack limit, including any inlining headroom.
        limit: usize,
    },

    /// A pop from an empty (or too shallow) evaluation stack.
    #[error("evaluation stack underflow at offset {offset:#x}")]
    StackUnderflow {
        /// Offset of the offending instruction.
        offset: u32,
    },

    /// The spill path re-entered itself.
    #[error("reentrant stack spill at offset {offset:#x}")]
    ReentrantSpill {
        /// Offset of the offending instruction.
        offset: u32,
    },

    /// Predecessors disagree on a block's entry stack depth.
    #[error("predecessors of bb{block} disagree on entry stack depth ({expected} vs {found})")]
    DepthMismatch {
        /// Index of the join block.
        block: usize,
        /// Depth recorded by the block's accepted entry state.
        expected: usize,
        /// Depth offered by the newly-translated predecessor.
        found: usize,
    },

    /// A stack slot's type cannot be reconciled with its shared spill temp.
    #[error("type {found} does not unify with {expected} for shared temp loc{temp} at offset {offset:#x}")]
    TypeMismatch {
        /// Offset of the block exit that offered the value.
        offset: u32,
        /// Index of the shared temporary.
        temp: usize,
        /// Type currently recorded for the temporary.
        expected: TypeTag,
        /// Type offered by the value.
        found: TypeTag,
    },

    /// `leave` with a source offset inside a finally or fault handler body.
    #[error("leave out of a finally or fault handler at offset {offset:#x}")]
    LeaveFromHandler {
        /// Offset of the `leave` instruction.
        offset: u32,
    },

    /// Undecodable opcode byte.
    #[error("bad opcode {opcode:#x} at offset {offset:#x}")]
    BadOpcode {
        /// Offset of the undecodable byte.
        offset: u32,
        /// The byte value.
        opcode: u8,
    },

    /// The bytecode buffer ended inside an instruction.
    #[error("unexpected end of bytecode at offset {offset:#x}")]
    TruncatedCode {
        /// Offset where decoding stopped.
        offset: u32,
    },

    /// Any other structural violation of the input.
    #[error("malformed bytecode at offset {offset:#x}: {message}")]
    Malformed {
        /// Offset of the offending instruction or block start.
        offset: u32,
        /// What was violated.
        message: String,
    },

    /// An external collaborator asked to abandon translation of this method.
    #[error("translation abandoned: {0}")]
    Aborted(String),
}
