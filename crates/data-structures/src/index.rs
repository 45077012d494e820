//! Index types.

pub use index_vec::{index_vec, Idx, IndexSlice, IndexVec};

/// Declares a dense `u32` index newtype, usable as a key of [`IndexVec`].
///
/// The generated type implements [`Idx`], so `T::from_usize(i)` and
/// `t.index()` are available.
#[macro_export]
macro_rules! newtype_index {
    ($(#[$attr:meta])* $vis:vis struct $name:ident;) => {
        $crate::index::define_index_type! {
            $(#[$attr])*
            $vis struct $name = u32;

            DISABLE_MAX_INDEX_CHECK = cfg!(not(debug_assertions));
            DEBUG_FORMAT = concat!(stringify!($name), "({})");
        }
    };
}

// `define_index_type!` expands to paths under `index_vec`; re-export it here so
// `newtype_index!` works through `$crate`.
pub use index_vec::define_index_type;
