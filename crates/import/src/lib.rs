//! Worklist-driven importation of stack-machine bytecode into tree IR.
//!
//! The importer translates one method body at a time. Basic blocks may be
//! reached before all of their predecessors are known, so translation is
//! incremental: blocks are pulled off a pending worklist, translated against a
//! saved entry stack, and re-queued when later discoveries widen the type of a
//! value flowing into them (the spill-clique correction). `leave` instructions
//! out of protected regions are expanded into explicit call-finally chains
//! during translation.

mod error;
pub use error::{ImportError, Result};

pub mod decode;
pub use decode::Opcode;

mod resolve;
pub use resolve::{CallSig, MapResolver, ResolveAbort, TokenResolver};

mod stack;
pub use stack::ImportStack;

mod pending;

mod clique;

mod flowgraph;
pub use flowgraph::build_flow_graph;

mod importer;
pub use importer::{ImportOptions, Importer};

mod translate;

mod leave;
