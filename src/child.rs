//! Child addresses straight from the parent's rank state.
//!
//! A move writes one symbol into one slot: blank to piece is a placement,
//! piece to blank a removal, piece to piece a replacement. For every
//! `(from, to)` pair a game registers, [`ChildHasher::load`] precomputes per
//! source position:
//!
//! - prefix sums of the occupied-set rank, plus the same sums shifted by one
//!   position for an inserted or removed slot;
//! - prefix sums of the arrangement rank with the remaining multiset adjusted
//!   by the replacement, and the suffix sums of the unchanged tail.
//!
//! The child's rank is then a constant number of table reads, so all children
//! of a position cost `O(slots * replacements + moves)` instead of a full
//! rehash per move. Walking a tier with [`ChildHasher::advance`] rebuilds only
//! the entries after the first piece the step rearranged.

use crate::arrangement::{self, Counts, MAX_PIECE_KINDS};
use crate::error::{Error, Result};
use crate::tier::{Signature, Symbol, TierIndex, BLANK};

/// Write `symbol` into `slot`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
    pub slot: usize,
    pub symbol: Symbol,
}

impl Move {
    pub fn new(slot: usize, symbol: Symbol) -> Self {
        Self { slot, symbol }
    }
}

/// A kind of slot change a game's moves make.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Replacement {
    pub from: Symbol,
    pub to: Symbol,
}

impl Replacement {
    pub fn new(from: Symbol, to: Symbol) -> Self {
        Self { from, to }
    }

    /// Blank to `piece`.
    pub fn place(piece: Symbol) -> Self {
        Self::new(BLANK, piece)
    }
}

/// A child's tier and global address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Child {
    pub tier: usize,
    pub address: u64,
}

#[derive(Clone, Copy, Debug)]
struct ChildBlock {
    tier: usize,
    base: u64,
    arrangements: u64,
}

#[derive(Clone, Debug)]
struct Table {
    replacement: Replacement,
    /// `Err` holds the child signature when it has no block in the index.
    child: std::result::Result<ChildBlock, Option<Signature>>,
    /// Arrangement rank of positions before `j`, remaining multiset adjusted.
    prefix: Vec<u64>,
    /// Contribution of the written piece at position `j`.
    middle: Vec<u64>,
}

/// Precomputed child ranks for one source position at a time.
#[derive(Clone, Debug)]
pub struct ChildHasher<'a> {
    index: &'a TierIndex,
    tables: Vec<Table>,
    lookup: [[Option<u8>; MAX_PIECE_KINDS + 1]; MAX_PIECE_KINDS + 1],
    tier: usize,
    board: Vec<Symbol>,
    /// `below[slot]`: occupied slots with a smaller index.
    below: Vec<usize>,
    occupied: Vec<usize>,
    pieces: Vec<Symbol>,
    remaining: Vec<Counts>,
    /// `Σ_{i<j} C(s_i, i + 1)`
    combination_prefix: Vec<u64>,
    /// `Σ_{i>=j} C(s_i, i + 2)`: the tail after inserting a slot at `j`.
    combination_up: Vec<u64>,
    /// `Σ_{i>j} C(s_i, i)`: the tail after removing the slot at `j`.
    combination_down: Vec<u64>,
    /// `Σ_{q>=j}` of the source's own arrangement contributions.
    arrangement_suffix: Vec<u64>,
    loaded: bool,
}

impl<'a> ChildHasher<'a> {
    pub fn new(index: &'a TierIndex, replacements: &[Replacement]) -> Result<Self> {
        let mut lookup = [[None; MAX_PIECE_KINDS + 1]; MAX_PIECE_KINDS + 1];
        let mut tables = Vec::with_capacity(replacements.len());
        for &replacement in replacements {
            let Replacement { from, to } = replacement;
            if from as usize > index.kinds() || to as usize > index.kinds() || from == to {
                return Err(Error::UnknownReplacement { from, to });
            }
            let entry = &mut lookup[from as usize][to as usize];
            if entry.is_none() {
                *entry = Some(tables.len() as u8);
                tables.push(Table {
                    replacement,
                    child: Err(None),
                    prefix: Vec::with_capacity(index.slots() + 1),
                    middle: Vec::with_capacity(index.slots() + 1),
                });
            }
        }
        let slots = index.slots();
        Ok(Self {
            index,
            tables,
            lookup,
            tier: 0,
            board: Vec::with_capacity(slots),
            below: Vec::with_capacity(slots),
            occupied: Vec::with_capacity(slots),
            pieces: Vec::with_capacity(slots),
            remaining: Vec::with_capacity(slots + 1),
            combination_prefix: Vec::with_capacity(slots + 1),
            combination_up: Vec::with_capacity(slots + 1),
            combination_down: Vec::with_capacity(slots + 1),
            arrangement_suffix: Vec::with_capacity(slots + 1),
            loaded: false,
        })
    }

    /// Tier of the loaded source position.
    pub fn tier(&self) -> usize {
        self.tier
    }

    /// Precomputes the child tables for `board`.
    pub fn load(&mut self, board: &[Symbol]) -> Result<()> {
        let index = self.index;
        let binomial = index.binomial();
        self.loaded = false;
        self.tier = index.tier_of(board)?;
        let signature = Signature::of_board(board);

        self.board.clear();
        self.board.extend_from_slice(board);
        self.below.clear();
        self.occupied.clear();
        self.pieces.clear();
        for (slot, &symbol) in board.iter().enumerate() {
            self.below.push(self.occupied.len());
            if symbol != BLANK {
                self.occupied.push(slot);
                self.pieces.push(symbol);
            }
        }
        let k = self.occupied.len();

        self.remaining.clear();
        self.remaining.resize(k + 1, [0; MAX_PIECE_KINDS]);
        for j in (0..k).rev() {
            self.remaining[j] = self.remaining[j + 1];
            self.remaining[j][self.pieces[j] as usize - 1] += 1;
        }

        self.combination_prefix.clear();
        self.combination_prefix.push(0);
        for (i, &slot) in self.occupied.iter().enumerate() {
            let last = self.combination_prefix[i];
            self.combination_prefix.push(last + binomial.get(slot, i + 1));
        }

        self.combination_up.clear();
        self.combination_up.resize(k + 1, 0);
        self.combination_down.clear();
        self.combination_down.resize(k + 1, 0);
        self.arrangement_suffix.clear();
        self.arrangement_suffix.resize(k + 1, 0);
        for j in (0..k).rev() {
            let slot = self.occupied[j];
            self.combination_up[j] = self.combination_up[j + 1] + binomial.get(slot, j + 2);
            if j + 1 < k {
                let next = self.occupied[j + 1];
                self.combination_down[j] = self.combination_down[j + 1] + binomial.get(next, j + 1);
            }
            self.arrangement_suffix[j] = self.arrangement_suffix[j + 1]
                + arrangement::weight_below(binomial, &self.remaining[j], self.pieces[j]);
        }

        for table in &mut self.tables {
            let Replacement { from, to } = table.replacement;
            table.child = match signature.replaced(from, to) {
                None => Err(None),
                Some(child) => match index.signature_layout(&child) {
                    Ok(layout) => Ok(ChildBlock {
                        tier: layout.tier,
                        base: layout.base,
                        arrangements: layout.arrangements,
                    }),
                    Err(_) => Err(Some(child)),
                },
            };
            table.prefix.clear();
            table.middle.clear();
            if table.child.is_err() {
                continue;
            }
            table.prefix.push(0);
            for j in 0..=k {
                let adjusted = adjust(&self.remaining[j], from, to);
                if j < k {
                    let term = adjusted
                        .map(|r| arrangement::weight_below(binomial, &r, self.pieces[j]))
                        .unwrap_or(0);
                    table.prefix.push(table.prefix[j] + term);
                }
                if to != BLANK {
                    let term = adjusted
                        .map(|r| arrangement::weight_below(binomial, &r, to))
                        .unwrap_or(0);
                    table.middle.push(term);
                }
            }
        }
        self.loaded = true;
        Ok(())
    }

    /// Moves the tables to `board`, usually the loaded position's successor
    /// in tier order.
    ///
    /// When `board` only permutes pieces among the occupied slots, the
    /// occupied set, the signature and every entry before the first changed
    /// piece carry over, and only the tail is recomputed. Any other change
    /// falls back to [`ChildHasher::load`].
    pub fn advance(&mut self, board: &[Symbol]) -> Result<()> {
        if !self.loaded || board.len() != self.board.len() {
            return self.load(board);
        }
        let kinds = self.index.kinds();
        let mut first = None;
        let mut balance = [0i64; MAX_PIECE_KINDS + 1];
        for (slot, (&old, &new)) in self.board.iter().zip(board).enumerate() {
            if old == new {
                continue;
            }
            if old == BLANK || new == BLANK || new as usize > kinds {
                return self.load(board);
            }
            first.get_or_insert(self.below[slot]);
            balance[old as usize] -= 1;
            balance[new as usize] += 1;
        }
        let Some(pivot) = first else {
            return Ok(());
        };
        if balance.iter().any(|&b| b != 0) {
            return self.load(board);
        }

        let index = self.index;
        let binomial = index.binomial();
        let k = self.occupied.len();
        self.board.copy_from_slice(board);
        for j in pivot..k {
            self.pieces[j] = board[self.occupied[j]];
        }
        // The multiset from `pivot` on is unchanged, so `remaining[..=pivot]` is too.
        for j in (pivot + 1..k).rev() {
            self.remaining[j] = self.remaining[j + 1];
            self.remaining[j][self.pieces[j] as usize - 1] += 1;
        }
        let old_tail = self.arrangement_suffix[pivot];
        for j in (pivot..k).rev() {
            self.arrangement_suffix[j] = self.arrangement_suffix[j + 1]
                + arrangement::weight_below(binomial, &self.remaining[j], self.pieces[j]);
        }
        let new_tail = self.arrangement_suffix[pivot];
        for suffix in &mut self.arrangement_suffix[..pivot] {
            *suffix = *suffix - old_tail + new_tail;
        }

        for table in &mut self.tables {
            if table.child.is_err() {
                continue;
            }
            let Replacement { from, to } = table.replacement;
            for j in pivot..=k {
                let adjusted = adjust(&self.remaining[j], from, to);
                if j < k {
                    let term = adjusted
                        .map(|r| arrangement::weight_below(binomial, &r, self.pieces[j]))
                        .unwrap_or(0);
                    table.prefix[j + 1] = table.prefix[j] + term;
                }
                if to != BLANK {
                    table.middle[j] = adjusted
                        .map(|r| arrangement::weight_below(binomial, &r, to))
                        .unwrap_or(0);
                }
            }
        }
        Ok(())
    }

    /// Address of the child reached by `mv` from the loaded position.
    pub fn child_address(&self, mv: Move) -> Result<u64> {
        self.child(mv).map(|c| c.address)
    }

    /// Tier and address of the child reached by `mv`.
    pub fn child(&self, mv: Move) -> Result<Child> {
        if !self.loaded {
            return Err(Error::invalid("no source position loaded"));
        }
        let &from = self
            .board
            .get(mv.slot)
            .ok_or_else(|| Error::invalid(format!("move to slot {} off the board", mv.slot)))?;
        let to = mv.symbol;
        let table = self
            .lookup
            .get(from as usize)
            .and_then(|row| row.get(to as usize))
            .copied()
            .flatten()
            .map(|t| &self.tables[t as usize])
            .ok_or(Error::UnknownReplacement { from, to })?;
        let block = match table.child {
            Ok(block) => block,
            Err(Some(signature)) => return Err(Error::UnknownSignature(signature)),
            Err(None) => return Err(Error::UnknownReplacement { from, to }),
        };

        let k = self.occupied.len();
        let j = self.below[mv.slot];
        let (combination, arrangement) = if from == BLANK {
            (
                self.combination_prefix[j]
                    + self.index.binomial().get(mv.slot, j + 1)
                    + self.combination_up[j],
                table.prefix[j] + table.middle[j] + self.arrangement_suffix[j],
            )
        } else if to == BLANK {
            (
                self.combination_prefix[j] + self.combination_down[j],
                table.prefix[j] + self.arrangement_suffix[j + 1],
            )
        } else {
            (
                self.combination_prefix[k],
                table.prefix[j] + table.middle[j] + self.arrangement_suffix[j + 1],
            )
        };
        Ok(Child {
            tier: block.tier,
            address: block.base + combination * block.arrangements + arrangement,
        })
    }

    /// Children for every slot holding `from`, each rewritten to `to`.
    /// Appends `(slot, address)` pairs to `out` in slot order.
    pub fn children_for(
        &self,
        from: Symbol,
        to: Symbol,
        out: &mut Vec<(usize, u64)>,
    ) -> Result<usize> {
        let before = out.len();
        for slot in 0..self.board.len() {
            if self.board[slot] == from {
                out.push((slot, self.child_address(Move::new(slot, to))?));
            }
        }
        Ok(out.len() - before)
    }
}

/// `remaining` with one `from` taken out and one `to` put in, or `None`
/// when no `from` is left.
#[inline]
fn adjust(remaining: &Counts, from: Symbol, to: Symbol) -> Option<Counts> {
    let mut counts = *remaining;
    if from != BLANK {
        let c = &mut counts[from as usize - 1];
        *c = c.checked_sub(1)?;
    }
    if to != BLANK {
        counts[to as usize - 1] += 1;
    }
    Some(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Every board of 5 slots over {-, a, b} in one tier per signature.
    fn full_index() -> TierIndex {
        let mut tiers = Vec::new();
        for a in 0..=5 {
            for b in 0..=(5 - a) {
                tiers.push(vec![Signature::new(&[a, b])]);
            }
        }
        TierIndex::new(5, &['-', 'a', 'b'], tiers).unwrap()
    }

    #[test]
    fn agrees_with_rehash_for_every_replacement() {
        let index = full_index();
        let replacements: Vec<Replacement> = (0..3u8)
            .flat_map(|from| (0..3u8).map(move |to| Replacement::new(from, to)))
            .filter(|r| r.from != r.to)
            .collect();
        let mut hasher = ChildHasher::new(&index, &replacements).unwrap();
        let mut checked = 0;
        for address in 0..index.total() {
            let board = index.unhash(address).unwrap();
            hasher.load(&board).unwrap();
            for slot in 0..5 {
                for symbol in 0..3u8 {
                    if board[slot] == symbol {
                        continue;
                    }
                    let mut child = board.clone();
                    child[slot] = symbol;
                    let expected = index.hash(&child).unwrap();
                    let got = hasher.child(Move::new(slot, symbol)).unwrap();
                    assert_eq!(got.address, expected, "{board:?} slot {slot} -> {symbol}");
                    assert_eq!(got.tier, index.tier_of(&child).unwrap());
                    checked += 1;
                }
            }
        }
        // Each of the 3^5 boards has 5 slots with 2 alternatives.
        assert_eq!(checked, 243 * 10);
    }

    #[test]
    fn unregistered_replacement_is_rejected() {
        let index = full_index();
        let mut hasher = ChildHasher::new(&index, &[Replacement::place(1)]).unwrap();
        hasher.load(&[0, 1, 0, 2, 0]).unwrap();
        assert!(hasher.child_address(Move::new(0, 1)).is_ok());
        assert!(matches!(
            hasher.child_address(Move::new(0, 2)),
            Err(Error::UnknownReplacement { from: 0, to: 2 })
        ));
        assert!(ChildHasher::new(&index, &[Replacement::new(0, 3)]).is_err());
    }

    #[test]
    fn children_for_lists_every_blank() {
        let index = full_index();
        let mut hasher = ChildHasher::new(&index, &[Replacement::place(2)]).unwrap();
        let board = [1, 0, 0, 2, 0];
        hasher.load(&board).unwrap();
        let mut children = Vec::new();
        assert_eq!(hasher.children_for(0, 2, &mut children).unwrap(), 3);
        let slots: Vec<usize> = children.iter().map(|c| c.0).collect();
        assert_eq!(slots, vec![1, 2, 4]);
        for (slot, address) in children {
            let mut child = board.to_vec();
            child[slot] = 2;
            assert_eq!(index.hash(&child).unwrap(), address);
        }
    }

    #[test]
    fn advance_matches_fresh_load() {
        let index = full_index();
        let replacements: Vec<Replacement> = (0..3u8)
            .flat_map(|from| (0..3u8).map(move |to| Replacement::new(from, to)))
            .filter(|r| r.from != r.to)
            .collect();
        let mut walking = ChildHasher::new(&index, &replacements).unwrap();
        let mut fresh = ChildHasher::new(&index, &replacements).unwrap();
        for tier in 0..index.num_tiers() {
            let mut cursor = crate::cursor::TierCursor::new(&index, tier).unwrap();
            loop {
                let board = cursor.board().to_vec();
                walking.advance(&board).unwrap();
                fresh.load(&board).unwrap();
                for slot in 0..5 {
                    for symbol in 0..3u8 {
                        if board[slot] == symbol {
                            continue;
                        }
                        let mv = Move::new(slot, symbol);
                        assert_eq!(walking.child(mv).unwrap(), fresh.child(mv).unwrap());
                    }
                }
                if cursor.next().is_none() {
                    break;
                }
            }
        }
        // Jumps that are not a single cursor step still agree.
        for address in (0..index.total()).rev().step_by(7) {
            let board = index.unhash(address).unwrap();
            walking.advance(&board).unwrap();
            fresh.load(&board).unwrap();
            for slot in 0..5 {
                let mv = Move::new(slot, (board[slot] + 1) % 3);
                assert_eq!(walking.child(mv).unwrap(), fresh.child(mv).unwrap());
            }
        }
    }

    #[test]
    fn failed_load_clears_previous_position() {
        let index = full_index();
        let mut hasher = ChildHasher::new(&index, &[Replacement::place(1)]).unwrap();
        hasher.load(&[0, 1, 0, 2, 0]).unwrap();
        assert!(hasher.child(Move::new(0, 1)).is_ok());
        // Symbol 3 is not in the alphabet.
        assert!(hasher.load(&[0, 3, 0, 2, 0]).is_err());
        assert!(hasher.child(Move::new(0, 1)).is_err());
        assert!(hasher.advance(&[0, 1, 0, 2, 0]).is_ok());
        assert!(hasher.child(Move::new(0, 1)).is_ok());
    }

    #[test]
    fn missing_child_signature() {
        let tiers = vec![vec![Signature::new(&[0, 0])], vec![Signature::new(&[1, 0])]];
        let index = TierIndex::new(3, &['-', 'a', 'b'], tiers).unwrap();
        let mut hasher =
            ChildHasher::new(&index, &[Replacement::place(1), Replacement::place(2)]).unwrap();
        hasher.load(&[0, 0, 0]).unwrap();
        assert_eq!(hasher.child_address(Move::new(2, 1)).unwrap(), 3);
        assert!(matches!(
            hasher.child_address(Move::new(2, 2)),
            Err(Error::UnknownSignature(_))
        ));
    }
}
