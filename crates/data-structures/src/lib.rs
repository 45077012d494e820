//! Common data structures for the ingot compiler.
//!
//! Mostly modified from [`rustc_data_structures`](https://github.com/rust-lang/rust/tree/master/compiler/rustc_data_structures).

pub mod bitset;
pub mod index;
pub mod map;

pub use smallvec;
