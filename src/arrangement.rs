//! Ranking of a fixed multiset of pieces over the occupied slots.
//!
//! Pieces are the non-blank symbols `1..=kinds`. `counts[p - 1]` is how many
//! copies of piece `p` the multiset holds. A sequence ranks lexicographically
//! among all distinct orderings of its multiset, so rank 0 is the sequence
//! sorted ascending and the space has `k! / prod(counts[i]!)` members.
//!
//! The rank of a prefix never depends on what follows it: after `i` pieces
//! the rank so far plus the remaining multiset is enough to answer what the
//! rank becomes for any choice of piece `i + 1`. [`PrefixRank`] exposes that
//! query and the child hasher builds on it.

use crate::combination::Binomial;

/// Most piece kinds a game may use (the alphabet is blank plus these).
pub const MAX_PIECE_KINDS: usize = 3;

/// Piece counts indexed by `piece - 1`.
pub type Counts = [usize; MAX_PIECE_KINDS];

/// Number of distinct arrangements of `counts`.
#[inline]
pub fn size(binomial: &Binomial, counts: &[usize]) -> u64 {
    let mut total = 0;
    let mut product = 1u64;
    for &c in counts {
        total += c;
        product *= binomial.get(total, c);
    }
    product
}

/// Like [`size`] but reports overflow instead of wrapping.
pub fn checked_size(binomial: &Binomial, counts: &[usize]) -> Option<u64> {
    let mut total = 0;
    let mut product = 1u64;
    for &c in counts {
        total += c;
        if total > binomial.max() {
            return None;
        }
        product = product.checked_mul(binomial.get(total, c))?;
    }
    Some(product)
}

/// Arrangements that start with a piece ordered below `piece`, given the
/// multiset `remaining` still to be placed.
#[inline]
pub fn weight_below(binomial: &Binomial, remaining: &[usize], piece: u8) -> u64 {
    let mut weight = 0;
    let mut scratch: Counts = [0; MAX_PIECE_KINDS];
    scratch[..remaining.len()].copy_from_slice(remaining);
    for t in 0..(piece as usize).saturating_sub(1) {
        if scratch[t] == 0 {
            continue;
        }
        scratch[t] -= 1;
        weight += size(binomial, &scratch[..remaining.len()]);
        scratch[t] += 1;
    }
    weight
}

/// Rank of `sequence`, whose piece counts must equal `counts`.
pub fn rank(binomial: &Binomial, sequence: &[u8], counts: &[usize]) -> u64 {
    let mut prefix = PrefixRank::new(counts);
    for &piece in sequence {
        let placed = prefix.push(binomial, piece);
        debug_assert!(placed, "sequence does not match its counts");
    }
    prefix.rank()
}

/// Inverse of [`rank`]. The caller guarantees `rank < size(counts)`.
pub fn unrank(binomial: &Binomial, mut rank: u64, counts: &[usize], out: &mut Vec<u8>) {
    let kinds = counts.len();
    let mut remaining: Counts = [0; MAX_PIECE_KINDS];
    remaining[..kinds].copy_from_slice(counts);
    let total: usize = counts.iter().sum();
    out.clear();
    for _ in 0..total {
        for t in 0..kinds {
            if remaining[t] == 0 {
                continue;
            }
            remaining[t] -= 1;
            let weight = size(binomial, &remaining[..kinds]);
            if rank < weight {
                out.push(t as u8 + 1);
                break;
            }
            remaining[t] += 1;
            rank -= weight;
        }
    }
    debug_assert_eq!(out.len(), total, "rank outside the arrangement space");
}

/// Advances `sequence` to its lexicographic successor. Returns the first
/// index that may have changed, or `None` if `sequence` was the last
/// arrangement (it is then left untouched).
pub fn next(sequence: &mut [u8]) -> Option<usize> {
    let len = sequence.len();
    if len < 2 {
        return None;
    }
    let mut pivot = len - 1;
    while pivot > 0 && sequence[pivot - 1] >= sequence[pivot] {
        pivot -= 1;
    }
    if pivot == 0 {
        return None;
    }
    let pivot = pivot - 1;
    let mut swap = len - 1;
    while sequence[swap] <= sequence[pivot] {
        swap -= 1;
    }
    sequence.swap(pivot, swap);
    sequence[pivot + 1..].reverse();
    Some(pivot)
}

/// Rank state after placing a prefix of an arrangement.
#[derive(Clone, Debug)]
pub struct PrefixRank {
    rank: u64,
    kinds: usize,
    remaining: Counts,
}

impl PrefixRank {
    pub fn new(counts: &[usize]) -> Self {
        let mut remaining = [0; MAX_PIECE_KINDS];
        remaining[..counts.len()].copy_from_slice(counts);
        Self {
            rank: 0,
            kinds: counts.len(),
            remaining,
        }
    }

    /// The rank contributed by the pieces placed so far.
    pub fn rank(&self) -> u64 {
        self.rank
    }

    pub fn remaining(&self) -> &[usize] {
        &self.remaining[..self.kinds]
    }

    /// What the rank would become if `piece` came next, without placing it.
    /// `None` when no copy of `piece` is left.
    #[inline]
    pub fn peek(&self, binomial: &Binomial, piece: u8) -> Option<u64> {
        let index = (piece as usize).checked_sub(1)?;
        if index >= self.kinds || self.remaining[index] == 0 {
            return None;
        }
        Some(self.rank + weight_below(binomial, self.remaining(), piece))
    }

    /// Places `piece`. Returns false, changing nothing, when none is left.
    pub fn push(&mut self, binomial: &Binomial, piece: u8) -> bool {
        match self.peek(binomial, piece) {
            Some(rank) => {
                self.rank = rank;
                self.remaining[piece as usize - 1] -= 1;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binomial() -> Binomial {
        Binomial::new(12).unwrap()
    }

    #[test]
    fn space_size() {
        let b = binomial();
        assert_eq!(size(&b, &[2, 3]), 10);
        assert_eq!(size(&b, &[1, 1, 1]), 6);
        assert_eq!(size(&b, &[0, 0]), 1);
        assert_eq!(checked_size(&b, &[4, 4, 4]), Some(34_650));
    }

    #[test]
    fn successor_agrees_with_rank() {
        let b = binomial();
        let counts = [2, 1, 2];
        let mut sequence = Vec::new();
        unrank(&b, 0, &counts, &mut sequence);
        assert_eq!(sequence, vec![1, 1, 2, 3, 3]);
        let mut expected = 0;
        loop {
            assert_eq!(rank(&b, &sequence, &counts), expected);
            let mut back = Vec::new();
            unrank(&b, expected, &counts, &mut back);
            assert_eq!(back, sequence);
            expected += 1;
            if next(&mut sequence).is_none() {
                break;
            }
        }
        assert_eq!(expected, size(&b, &counts));
        assert_eq!(sequence, vec![3, 3, 2, 1, 1]);
    }

    #[test]
    fn prefix_queries_do_not_mutate() {
        let b = binomial();
        let mut prefix = PrefixRank::new(&[1, 2]);
        assert_eq!(prefix.peek(&b, 1), Some(0));
        assert_eq!(prefix.peek(&b, 2), Some(1));
        assert_eq!(prefix.peek(&b, 3), None);
        assert!(prefix.push(&b, 2));
        assert_eq!(prefix.rank(), 1);
        assert_eq!(prefix.peek(&b, 1), Some(1));
        assert_eq!(prefix.peek(&b, 2), Some(2));
        assert!(prefix.push(&b, 2));
        assert!(!prefix.push(&b, 2));
        assert!(prefix.push(&b, 1));
        assert_eq!(prefix.rank(), rank(&b, &[2, 2, 1], &[1, 2]));
        assert_eq!(prefix.rank(), 2);
    }
}
