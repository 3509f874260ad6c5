//! Ranking of occupied-slot sets with the combinatorial number system.
//!
//! The `i`-th smallest occupied slot `s_i` contributes `C(s_i, i + 1)` to the
//! rank, so the `C(n, k)` subsets of size `k` map densely onto `[0, C(n, k))`
//! in colexicographic order. Slot lists handed to these functions are always
//! sorted ascending.

use crate::error::{Error, Result};

/// Largest board supported by the 64-bit counters. `C(64, 32)` still fits a `u64`.
pub const MAX_SLOTS: usize = 64;

/// Cached Pascal triangle for `C(n, r)` with `n <= max`.
#[derive(Clone, Debug)]
pub struct Binomial {
    max: usize,
    table: Vec<u64>,
}

impl Binomial {
    pub fn new(max: usize) -> Result<Self> {
        if max > MAX_SLOTS {
            return Err(Error::overflow(format!(
                "binomial table for {max} slots (limit {MAX_SLOTS})"
            )));
        }
        let stride = max + 1;
        let mut table = vec![0u64; stride * stride];
        for n in 0..=max {
            table[n * stride] = 1;
            for r in 1..=n {
                let above = table[(n - 1) * stride + r - 1];
                let left = if r < n { table[(n - 1) * stride + r] } else { 0 };
                table[n * stride + r] = above
                    .checked_add(left)
                    .ok_or_else(|| Error::overflow(format!("C({n}, {r})")))?;
            }
        }
        Ok(Self { max, table })
    }

    /// Largest `n` in the table.
    pub fn max(&self) -> usize {
        self.max
    }

    /// `C(n, r)`, zero when `r > n`.
    #[inline(always)]
    pub fn get(&self, n: usize, r: usize) -> u64 {
        if r > n {
            return 0;
        }
        debug_assert!(n <= self.max, "C({n}, {r}) outside the cached table");
        self.table[n * (self.max + 1) + r]
    }
}

/// Rank of a sorted set of occupied slots.
pub fn rank(binomial: &Binomial, occupied: &[usize]) -> u64 {
    occupied
        .iter()
        .enumerate()
        .map(|(i, &slot)| binomial.get(slot, i + 1))
        .sum()
}

/// Inverse of [`rank`]: writes the `k` occupied slots of `rank` into `out`,
/// ascending. The caller guarantees `rank < C(n, k)`.
pub fn unrank(binomial: &Binomial, mut rank: u64, k: usize, n: usize, out: &mut Vec<usize>) {
    debug_assert!(rank < binomial.get(n, k).max(1));
    out.clear();
    out.resize(k, 0);
    let mut slot = n;
    for i in (0..k).rev() {
        // Greedy: the largest slot whose coefficient still fits.
        slot -= 1;
        while binomial.get(slot, i + 1) > rank {
            slot -= 1;
        }
        rank -= binomial.get(slot, i + 1);
        out[i] = slot;
    }
}

/// Advances `occupied` to the subset of rank + 1. Returns false, leaving the
/// slots untouched, when it already was the last subset of size `k` in `n`.
pub fn next(occupied: &mut [usize], n: usize) -> bool {
    let k = occupied.len();
    for i in 0..k {
        let limit = if i + 1 < k { occupied[i + 1] } else { n };
        if occupied[i] + 1 < limit {
            occupied[i] += 1;
            for (j, slot) in occupied[..i].iter_mut().enumerate() {
                *slot = j;
            }
            return true;
        }
    }
    false
}
