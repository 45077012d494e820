//! Dense bitsets over index newtypes.

use crate::index::Idx;
use std::marker::PhantomData;

const WORD_BITS: usize = u64::BITS as usize;

/// A fixed-domain bitset backed by a `Vec<u64>`, keyed by an index newtype.
///
/// Membership tests and insertions are O(1). The domain size is fixed at
/// construction; [`DenseBitSet::clear`] resets the set without shrinking the
/// allocation, so one set can be reused across independent walks.
#[derive(Clone, Debug)]
pub struct DenseBitSet<T: Idx> {
    words: Vec<u64>,
    domain_size: usize,
    marker: PhantomData<T>,
}

impl<T: Idx> Default for DenseBitSet<T> {
    fn default() -> Self {
        Self::new_empty(0)
    }
}

impl<T: Idx> DenseBitSet<T> {
    /// Creates an empty set over `domain_size` elements.
    pub fn new_empty(domain_size: usize) -> Self {
        Self { words: vec![0; domain_size.div_ceil(WORD_BITS)], domain_size, marker: PhantomData }
    }

    /// Returns the number of elements the set can hold.
    #[inline]
    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    /// Inserts `elem`. Returns `true` if the set changed.
    #[inline]
    pub fn insert(&mut self, elem: T) -> bool {
        let (word, mask) = word_mask(elem.index(), self.domain_size);
        let w = &mut self.words[word];
        let changed = *w & mask == 0;
        *w |= mask;
        changed
    }

    /// Removes `elem`. Returns `true` if the set changed.
    #[inline]
    pub fn remove(&mut self, elem: T) -> bool {
        let (word, mask) = word_mask(elem.index(), self.domain_size);
        let w = &mut self.words[word];
        let changed = *w & mask != 0;
        *w &= !mask;
        changed
    }

    /// Returns `true` if `elem` is in the set.
    #[inline]
    pub fn contains(&self, elem: T) -> bool {
        let (word, mask) = word_mask(elem.index(), self.domain_size);
        self.words[word] & mask != 0
    }

    /// Returns `true` if no element is set.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Removes all elements, keeping the allocation.
    pub fn clear(&mut self) {
        self.words.fill(0);
    }

    /// Grows the domain to `domain_size`, keeping existing members.
    pub fn ensure(&mut self, domain_size: usize) {
        if domain_size > self.domain_size {
            self.domain_size = domain_size;
            self.words.resize(domain_size.div_ceil(WORD_BITS), 0);
        }
    }

    /// Iterates the members in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            let base = wi * WORD_BITS;
            (0..WORD_BITS).filter_map(move |bit| {
                if word & (1 << bit) != 0 { Some(T::from_usize(base + bit)) } else { None }
            })
        })
    }

    /// Returns the number of members.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[inline]
fn word_mask(index: usize, domain_size: usize) -> (usize, u64) {
    assert!(index < domain_size, "index {index} out of bitset domain {domain_size}");
    (index / WORD_BITS, 1u64 << (index % WORD_BITS))
}
