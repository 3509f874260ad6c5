//! Partition of a game's positions into tiers and the flat address space.
//!
//! A tier is an ordered list of signatures. Each signature owns a contiguous
//! block of `C(slots, occupied) * arrangements` ranks inside its tier, laid
//! out as `combination * arrangements + arrangement`. Tiers are glued into
//! one address space with a prefix-sum offset table:
//!
//! ```text
//! address = tier_offset[tier] + signature_offset + combination * arrangements + arrangement
//! ```

use std::fmt;

use rustc_hash::FxHashMap;

use crate::arrangement::{self, Counts, MAX_PIECE_KINDS};
use crate::combination::{self, Binomial, MAX_SLOTS};
use crate::error::{Error, Result};

/// A slot's content: 0 is blank, `1..=kinds` are pieces.
pub type Symbol = u8;

pub const BLANK: Symbol = 0;

/// How many copies of each piece are on the board.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Signature {
    counts: Counts,
}

impl Signature {
    /// Counts for pieces `1, 2, ...`; missing kinds are zero.
    ///
    /// # Panics
    ///
    /// If more than `MAX_PIECE_KINDS` counts are given.
    pub fn new(counts: &[usize]) -> Self {
        assert!(
            counts.len() <= MAX_PIECE_KINDS,
            "at most {MAX_PIECE_KINDS} piece kinds"
        );
        let mut padded = [0; MAX_PIECE_KINDS];
        padded[..counts.len()].copy_from_slice(counts);
        Self { counts: padded }
    }

    /// Counts the pieces of a board. Symbols must already be validated.
    pub fn of_board(board: &[Symbol]) -> Self {
        let mut counts = [0; MAX_PIECE_KINDS];
        for &symbol in board {
            if symbol != BLANK {
                counts[symbol as usize - 1] += 1;
            }
        }
        Self { counts }
    }

    pub fn counts(&self) -> &Counts {
        &self.counts
    }

    /// Copies of `piece` (a non-blank symbol).
    pub fn count(&self, piece: Symbol) -> usize {
        self.counts[piece as usize - 1]
    }

    /// Number of non-blank slots.
    pub fn occupied(&self) -> usize {
        self.counts.iter().sum()
    }

    /// The signature after one slot changes from `from` to `to`, or `None`
    /// if `from` is a piece this signature does not hold.
    pub fn replaced(&self, from: Symbol, to: Symbol) -> Option<Self> {
        let mut counts = self.counts;
        if from != BLANK {
            let slot = &mut counts[from as usize - 1];
            *slot = slot.checked_sub(1)?;
        }
        if to != BLANK {
            counts[to as usize - 1] += 1;
        }
        Some(Self { counts })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.counts.iter()).finish()
    }
}

/// An explicit `(tier, rank)` pair naming one position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TierPosition {
    pub tier: usize,
    pub rank: u64,
}

/// Where one signature lives in the address space.
#[derive(Clone, Debug)]
pub struct SignatureLayout {
    pub signature: Signature,
    pub tier: usize,
    pub occupied: usize,
    /// `C(slots, occupied)`.
    pub combinations: u64,
    /// Distinct arrangements of the signature's pieces.
    pub arrangements: u64,
    /// First rank of this block inside its tier.
    pub offset: u64,
    /// First global address of this block.
    pub base: u64,
    pub size: u64,
}

#[derive(Clone, Debug)]
struct TierLayout {
    signatures: Vec<SignatureLayout>,
    size: u64,
}

/// Dense hash of every position of a game, built once per configuration.
#[derive(Clone, Debug)]
pub struct TierIndex {
    slots: usize,
    alphabet: Vec<char>,
    binomial: Binomial,
    tiers: Vec<TierLayout>,
    /// `offsets[t]` is the first address of tier `t`; one extra entry holds the total.
    offsets: Vec<u64>,
    lookup: FxHashMap<Signature, (usize, usize)>,
}

impl TierIndex {
    /// Builds the index for `slots` slots drawn from `alphabet` (blank first)
    /// with the given signatures per tier.
    pub fn new(slots: usize, alphabet: &[char], tiers: Vec<Vec<Signature>>) -> Result<Self> {
        if slots > MAX_SLOTS {
            return Err(Error::overflow(format!(
                "hash space of {slots} slots (limit {MAX_SLOTS})"
            )));
        }
        check_alphabet(alphabet)?;
        for (i, c) in alphabet.iter().enumerate() {
            if alphabet[..i].contains(c) {
                return Err(Error::InvalidLayout(format!("symbol {c:?} repeated")));
            }
        }
        let kinds = alphabet.len() - 1;
        let binomial = Binomial::new(slots)?;

        let mut layouts = Vec::with_capacity(tiers.len());
        let mut offsets = Vec::with_capacity(tiers.len() + 1);
        let mut lookup = FxHashMap::default();
        let mut total = 0u64;
        for (tier, signatures) in tiers.into_iter().enumerate() {
            offsets.push(total);
            let mut tier_size = 0u64;
            let mut layout = Vec::with_capacity(signatures.len());
            for (index, signature) in signatures.into_iter().enumerate() {
                if signature.counts()[kinds..].iter().any(|&c| c > 0) {
                    return Err(Error::InvalidLayout(format!(
                        "signature {signature:?} uses pieces outside the alphabet"
                    )));
                }
                let occupied = signature.occupied();
                if occupied > slots {
                    return Err(Error::InvalidLayout(format!(
                        "signature {signature:?} holds more pieces than {slots} slots"
                    )));
                }
                if lookup.insert(signature, (tier, index)).is_some() {
                    return Err(Error::InvalidLayout(format!(
                        "signature {signature:?} listed twice"
                    )));
                }
                let combinations = binomial.get(slots, occupied);
                let arrangements = arrangement::checked_size(&binomial, signature.counts())
                    .ok_or_else(|| Error::overflow(format!("arrangements of {signature:?}")))?;
                let size = combinations
                    .checked_mul(arrangements)
                    .ok_or_else(|| Error::overflow(format!("size of {signature:?}")))?;
                let base = total
                    .checked_add(tier_size)
                    .ok_or_else(|| Error::overflow("total hash space"))?;
                layout.push(SignatureLayout {
                    signature,
                    tier,
                    occupied,
                    combinations,
                    arrangements,
                    offset: tier_size,
                    base,
                    size,
                });
                tier_size = tier_size
                    .checked_add(size)
                    .ok_or_else(|| Error::overflow(format!("size of tier {tier}")))?;
            }
            total = total
                .checked_add(tier_size)
                .ok_or_else(|| Error::overflow("total hash space"))?;
            layouts.push(TierLayout {
                signatures: layout,
                size: tier_size,
            });
        }
        offsets.push(total);

        log::debug!(
            "tier index: {} slots, {} tiers, {} signatures, {} positions",
            slots,
            layouts.len(),
            lookup.len(),
            total
        );

        Ok(Self {
            slots,
            alphabet: alphabet.to_vec(),
            binomial,
            tiers: layouts,
            offsets,
            lookup,
        })
    }

    /// Builds the index for a game's tier layout.
    pub fn for_game<G: crate::game::TierGame + ?Sized>(game: &G) -> Result<Self> {
        check_alphabet(game.alphabet())?;
        let tiers = (0..game.num_tiers()).map(|t| game.signatures(t)).collect();
        Self::new(game.slots(), game.alphabet(), tiers)
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    /// Number of piece kinds (alphabet minus blank).
    pub fn kinds(&self) -> usize {
        self.alphabet.len() - 1
    }

    pub fn binomial(&self) -> &Binomial {
        &self.binomial
    }

    pub fn num_tiers(&self) -> usize {
        self.tiers.len()
    }

    /// Total number of addresses.
    pub fn total(&self) -> u64 {
        self.offsets[self.tiers.len()]
    }

    pub fn tier_size(&self, tier: usize) -> Result<u64> {
        self.tier_layout(tier).map(|t| t.size)
    }

    /// First address of `tier`. `tier == num_tiers()` yields the total.
    pub fn tier_offset(&self, tier: usize) -> Result<u64> {
        self.offsets
            .get(tier)
            .copied()
            .ok_or(Error::TierOutOfRange {
                tier,
                tiers: self.tiers.len(),
            })
    }

    pub fn signatures(&self, tier: usize) -> Result<&[SignatureLayout]> {
        self.tier_layout(tier).map(|t| t.signatures.as_slice())
    }

    pub fn signature_layout(&self, signature: &Signature) -> Result<&SignatureLayout> {
        let &(tier, index) = self
            .lookup
            .get(signature)
            .ok_or(Error::UnknownSignature(*signature))?;
        Ok(&self.tiers[tier].signatures[index])
    }

    pub fn tier_for_address(&self, address: u64) -> Result<usize> {
        self.check_address(address)?;
        // Empty tiers share their offset with the next tier, so take the last match.
        Ok(self.offsets.partition_point(|&offset| offset <= address) - 1)
    }

    pub fn address_for_tier_and_rank(&self, tier: usize, rank: u64) -> Result<u64> {
        let layout = self.tier_layout(tier)?;
        if rank >= layout.size {
            return Err(Error::RankOutOfRange {
                tier,
                rank,
                size: layout.size,
            });
        }
        Ok(self.offsets[tier] + rank)
    }

    pub fn position(&self, address: u64) -> Result<TierPosition> {
        let tier = self.tier_for_address(address)?;
        Ok(TierPosition {
            tier,
            rank: address - self.offsets[tier],
        })
    }

    pub fn address(&self, position: TierPosition) -> Result<u64> {
        self.address_for_tier_and_rank(position.tier, position.rank)
    }

    /// The signature block holding `address` and the offset inside it.
    pub fn locate(&self, address: u64) -> Result<(&SignatureLayout, u64)> {
        let tier = self.tier_for_address(address)?;
        let signatures = &self.tiers[tier].signatures;
        let index = signatures.partition_point(|s| s.base <= address) - 1;
        let layout = &signatures[index];
        Ok((layout, address - layout.base))
    }

    /// Address of a full board.
    pub fn hash(&self, board: &[Symbol]) -> Result<u64> {
        self.check_board(board)?;
        let layout = self.signature_layout(&Signature::of_board(board))?;
        Ok(self.hash_in(layout, board))
    }

    /// Address of `board` inside a signature the caller already knows.
    pub fn hash_with_signature(&self, signature: &Signature, board: &[Symbol]) -> Result<u64> {
        self.check_board(board)?;
        let found = Signature::of_board(board);
        if found != *signature {
            return Err(Error::SignatureMismatch {
                expected: *signature,
                found,
            });
        }
        Ok(self.hash_in(self.signature_layout(signature)?, board))
    }

    fn hash_in(&self, layout: &SignatureLayout, board: &[Symbol]) -> u64 {
        let mut occupied = [0usize; MAX_SLOTS];
        let mut pieces = [0u8; MAX_SLOTS];
        let mut k = 0;
        for (slot, &symbol) in board.iter().enumerate() {
            if symbol != BLANK {
                occupied[k] = slot;
                pieces[k] = symbol;
                k += 1;
            }
        }
        let combination = combination::rank(&self.binomial, &occupied[..k]);
        let arrangement =
            arrangement::rank(&self.binomial, &pieces[..k], layout.signature.counts());
        layout.base + combination * layout.arrangements + arrangement
    }

    /// Board stored at `address`.
    pub fn unhash(&self, address: u64) -> Result<Vec<Symbol>> {
        let mut board = Vec::with_capacity(self.slots);
        self.unhash_into(address, &mut board)?;
        Ok(board)
    }

    /// Like [`TierIndex::unhash`] but reuses `board`. Returns the tier.
    pub fn unhash_into(&self, address: u64, board: &mut Vec<Symbol>) -> Result<usize> {
        let (layout, local) = self.locate(address)?;
        let mut occupied = Vec::with_capacity(layout.occupied);
        let mut pieces = Vec::with_capacity(layout.occupied);
        combination::unrank(
            &self.binomial,
            local / layout.arrangements,
            layout.occupied,
            self.slots,
            &mut occupied,
        );
        arrangement::unrank(
            &self.binomial,
            local % layout.arrangements,
            layout.signature.counts(),
            &mut pieces,
        );
        board.clear();
        board.resize(self.slots, BLANK);
        for (&slot, &piece) in occupied.iter().zip(&pieces) {
            board[slot] = piece;
        }
        Ok(layout.tier)
    }

    /// Tier a board belongs to.
    pub fn tier_of(&self, board: &[Symbol]) -> Result<usize> {
        self.check_board(board)?;
        Ok(self.signature_layout(&Signature::of_board(board))?.tier)
    }

    pub fn board_to_string(&self, board: &[Symbol]) -> String {
        board
            .iter()
            .map(|&s| self.alphabet.get(s as usize).copied().unwrap_or('?'))
            .collect()
    }

    pub fn board_from_string(&self, position: &str) -> Result<Vec<Symbol>> {
        let board = position
            .chars()
            .map(|c| {
                self.alphabet
                    .iter()
                    .position(|&a| a == c)
                    .map(|s| s as Symbol)
                    .ok_or_else(|| Error::invalid(format!("unknown symbol {c:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        self.check_board(&board)?;
        Ok(board)
    }

    pub fn address_to_string(&self, address: u64) -> Result<String> {
        Ok(self.board_to_string(&self.unhash(address)?))
    }

    pub fn string_to_address(&self, position: &str) -> Result<u64> {
        self.hash(&self.board_from_string(position)?)
    }

    fn tier_layout(&self, tier: usize) -> Result<&TierLayout> {
        self.tiers.get(tier).ok_or(Error::TierOutOfRange {
            tier,
            tiers: self.tiers.len(),
        })
    }

    fn check_address(&self, address: u64) -> Result<()> {
        if address >= self.total() {
            return Err(Error::AddressOutOfRange {
                address,
                total: self.total(),
            });
        }
        Ok(())
    }

    fn check_board(&self, board: &[Symbol]) -> Result<()> {
        if board.len() != self.slots {
            return Err(Error::invalid(format!(
                "expected {} slots, got {}",
                self.slots,
                board.len()
            )));
        }
        if let Some(slot) = board.iter().position(|&s| s as usize >= self.alphabet.len()) {
            return Err(Error::invalid(format!(
                "slot {slot} holds symbol {} outside the alphabet",
                board[slot]
            )));
        }
        Ok(())
    }
}

fn check_alphabet(alphabet: &[char]) -> Result<()> {
    if alphabet.len() < 2 || alphabet.len() > MAX_PIECE_KINDS + 1 {
        return Err(Error::InvalidLayout(format!(
            "alphabet must hold blank plus 1..={MAX_PIECE_KINDS} pieces, got {}",
            alphabet.len()
        )));
    }
    Ok(())
}
