//! Walks a tier rank by rank without re-running the full unhash.
//!
//! The arrangement advances first; when it is exhausted the occupied set
//! moves to its colex successor and the arrangement restarts sorted; when the
//! occupied set is exhausted the cursor moves to the next signature of the
//! tier. Each step reports the slots whose symbol changed, ascending.

use crate::arrangement;
use crate::combination;
use crate::error::{Error, Result};
use crate::tier::{Signature, SignatureLayout, Symbol, TierIndex, BLANK};

/// Explicit iteration state over one tier. Owned by whoever walks the tier.
#[derive(Clone, Debug)]
pub struct TierCursor<'a> {
    index: &'a TierIndex,
    tier: usize,
    signatures: &'a [SignatureLayout],
    signature: usize,
    rank: u64,
    size: u64,
    occupied: Vec<usize>,
    pieces: Vec<Symbol>,
    board: Vec<Symbol>,
    changed: Vec<usize>,
}

impl<'a> TierCursor<'a> {
    /// Cursor at rank 0 of `tier`.
    pub fn new(index: &'a TierIndex, tier: usize) -> Result<Self> {
        Self::at(index, tier, 0)
    }

    /// Cursor at an arbitrary rank of `tier`.
    pub fn at(index: &'a TierIndex, tier: usize, rank: u64) -> Result<Self> {
        let address = index.address_for_tier_and_rank(tier, rank)?;
        let (layout, local) = index.locate(address)?;
        let signatures = index.signatures(tier)?;
        let signature = signatures
            .iter()
            .position(|s| s.base == layout.base)
            .ok_or(Error::UnknownSignature(layout.signature))?;
        let mut cursor = Self {
            index,
            tier,
            signatures,
            signature,
            rank,
            size: index.tier_size(tier)?,
            occupied: Vec::with_capacity(index.slots()),
            pieces: Vec::with_capacity(index.slots()),
            board: vec![BLANK; index.slots()],
            changed: Vec::with_capacity(index.slots()),
        };
        combination::unrank(
            index.binomial(),
            local / layout.arrangements,
            layout.occupied,
            index.slots(),
            &mut cursor.occupied,
        );
        arrangement::unrank(
            index.binomial(),
            local % layout.arrangements,
            layout.signature.counts(),
            &mut cursor.pieces,
        );
        for (&slot, &piece) in cursor.occupied.iter().zip(&cursor.pieces) {
            cursor.board[slot] = piece;
        }
        Ok(cursor)
    }

    pub fn tier(&self) -> usize {
        self.tier
    }

    /// Tier-local rank of the current position.
    pub fn rank(&self) -> u64 {
        self.rank
    }

    pub fn address(&self) -> u64 {
        self.layout().base - self.layout().offset + self.rank
    }

    pub fn board(&self) -> &[Symbol] {
        &self.board
    }

    pub fn signature(&self) -> &Signature {
        &self.layout().signature
    }

    /// Occupied slots, ascending.
    pub fn occupied(&self) -> &[usize] {
        &self.occupied
    }

    /// Pieces on the occupied slots, in slot order.
    pub fn pieces(&self) -> &[Symbol] {
        &self.pieces
    }

    pub fn has_next(&self) -> bool {
        self.rank + 1 < self.size
    }

    /// Moves to the next rank and returns the slots that changed. Returns
    /// `None`, leaving the cursor in place, at the end of the tier.
    pub fn next(&mut self) -> Option<&[usize]> {
        self.changed.clear();
        if let Some(pivot) = arrangement::next(&mut self.pieces) {
            for i in pivot..self.pieces.len() {
                let slot = self.occupied[i];
                if self.board[slot] != self.pieces[i] {
                    self.board[slot] = self.pieces[i];
                    self.changed.push(slot);
                }
            }
        } else if combination::next(&mut self.occupied, self.index.slots()) {
            self.reset_pieces();
            self.sync_board();
        } else if self.signature + 1 < self.signatures.len() {
            self.signature += 1;
            let occupied = self.layout().occupied;
            self.occupied.clear();
            self.occupied.extend(0..occupied);
            self.reset_pieces();
            self.sync_board();
        } else {
            return None;
        }
        self.rank += 1;
        Some(&self.changed)
    }

    fn layout(&self) -> &'a SignatureLayout {
        &self.signatures[self.signature]
    }

    /// Arrangement rank 0: pieces sorted ascending.
    fn reset_pieces(&mut self) {
        let counts = *self.layout().signature.counts();
        self.pieces.clear();
        for (kind, &count) in counts.iter().enumerate() {
            self.pieces
                .extend(std::iter::repeat(kind as Symbol + 1).take(count));
        }
    }

    fn sync_board(&mut self) {
        let mut next = self.occupied.iter().zip(&self.pieces).peekable();
        for slot in 0..self.board.len() {
            let symbol = match next.peek() {
                Some(&(&s, &piece)) if s == slot => {
                    next.next();
                    piece
                }
                _ => BLANK,
            };
            if self.board[slot] != symbol {
                self.board[slot] = symbol;
                self.changed.push(slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> TierIndex {
        // Tier 2 mixes three signatures to exercise the signature carry.
        let tiers = vec![
            vec![Signature::new(&[0, 0])],
            vec![Signature::new(&[1, 0]), Signature::new(&[0, 1])],
            vec![
                Signature::new(&[2, 0]),
                Signature::new(&[1, 1]),
                Signature::new(&[0, 2]),
            ],
            vec![Signature::new(&[2, 2])],
        ];
        TierIndex::new(5, &['-', 'x', 'o'], tiers).unwrap()
    }

    #[test]
    fn visits_ranks_in_order() {
        let index = index();
        for tier in 0..index.num_tiers() {
            let mut cursor = TierCursor::new(&index, tier).unwrap();
            let base = index.tier_offset(tier).unwrap();
            let mut previous = cursor.board().to_vec();
            let mut count = 1u64;
            assert_eq!(cursor.board(), index.unhash(base).unwrap().as_slice());
            while cursor.has_next() {
                let changed = cursor.next().unwrap().to_vec();
                let expected = index.unhash(base + cursor.rank()).unwrap();
                assert_eq!(cursor.board(), expected.as_slice());
                assert_eq!(cursor.address(), base + cursor.rank());
                let diff: Vec<usize> = (0..5).filter(|&s| previous[s] != expected[s]).collect();
                assert_eq!(changed, diff);
                previous = expected;
                count += 1;
            }
            assert!(cursor.next().is_none());
            assert_eq!(count, index.tier_size(tier).unwrap());
        }
    }

    #[test]
    fn starts_mid_tier() {
        let index = index();
        let cursor = TierCursor::at(&index, 2, 17).unwrap();
        let address = index.address_for_tier_and_rank(2, 17).unwrap();
        assert_eq!(cursor.board(), index.unhash(address).unwrap().as_slice());
        assert_eq!(cursor.signature(), &Signature::new(&[1, 1]));
        assert!(TierCursor::at(&index, 2, index.tier_size(2).unwrap()).is_err());
    }
}
