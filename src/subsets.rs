//! Lazy subset enumeration.
//!
//! Yields subsets of a sorted slice grouped by size, largest first, and
//! lexicographically within a size. Nothing is materialized up front, so
//! searches that short-circuit after the first hit stay cheap even for
//! large ground sets.

use std::collections::BTreeSet;

pub struct DescendingSubsets<'a> {
    items: &'a [String],
    min_size: usize,
    size: usize,
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a> DescendingSubsets<'a> {
    /// Subsets of `items` with at least `min_size` elements. `items` must
    /// be sorted for the enumeration order to be deterministic.
    pub fn new(items: &'a [String], min_size: usize) -> Self {
        let min_size = min_size.max(1);
        let size = items.len();
        Self {
            items,
            min_size,
            size,
            indices: (0..size).collect(),
            exhausted: size < min_size,
        }
    }

    fn current(&self) -> BTreeSet<String> {
        self.indices.iter().map(|&i| self.items[i].clone()).collect()
    }

    /// Advance to the next combination of the current size, or shrink.
    fn advance(&mut self) {
        let n = self.items.len();
        let k = self.size;
        // Rightmost index that can still move right.
        let mut i = k;
        while i > 0 {
            i -= 1;
            if self.indices[i] < n - (k - i) {
                self.indices[i] += 1;
                for j in i + 1..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                return;
            }
        }
        // Size exhausted; start the next smaller one.
        if self.size <= self.min_size {
            self.exhausted = true;
            return;
        }
        self.size -= 1;
        self.indices = (0..self.size).collect();
    }
}

impl Iterator for DescendingSubsets<'_> {
    type Item = BTreeSet<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        let subset = self.current();
        self.advance();
        Some(subset)
    }
}
