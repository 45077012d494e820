//! The symbol/type resolver collaborator.
//!
//! Metadata tokens are opaque to the importer; the resolver maps them to the
//! signature facts the stack model needs. A resolver may refuse to go on
//! (e.g. an inliner deciding the method is not worth it), which aborts
//! translation of the whole method.

use ingot_data_structures::map::FxHashMap;
use ingot_ir::TypeTag;

/// Signature of a callee, as far as the stack model cares.
#[derive(Clone, Debug)]
pub struct CallSig {
    /// Parameter types, left to right.
    pub params: Vec<TypeTag>,
    /// Return type; [`TypeTag::Void`] for no value.
    pub ret: TypeTag,
}

/// Raised by a resolver to abandon translation of the current method.
#[derive(Clone, Debug)]
pub struct ResolveAbort(pub String);

/// Maps metadata tokens to signatures.
pub trait TokenResolver {
    /// Resolves a call-site token.
    fn resolve_call(&self, token: u32) -> Result<CallSig, ResolveAbort>;
}

/// A table-backed resolver.
#[derive(Clone, Debug, Default)]
pub struct MapResolver {
    calls: FxHashMap<u32, CallSig>,
}

impl MapResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a call signature under `token`.
    pub fn define_call(&mut self, token: u32, sig: CallSig) -> &mut Self {
        self.calls.insert(token, sig);
        self
    }
}

impl TokenResolver for MapResolver {
    fn resolve_call(&self, token: u32) -> Result<CallSig, ResolveAbort> {
        self.calls
            .get(&token)
            .cloned()
            .ok_or_else(|| ResolveAbort(format!("unknown call token {token:#x}")))
    }
}
