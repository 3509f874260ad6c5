//! The trait a game implements to be solved.
//!
//! To use the crate, implement [`TierGame`] for your game. A game describes
//! its board as a fixed row of slots, lists the signatures of each tier,
//! generates moves and judges terminal positions. Hashing, enumeration and
//! child addressing are handled by the crate.

use crate::arrangement::MAX_PIECE_KINDS;
use crate::child::{Move, Replacement};
use crate::record::{RecordFormat, Value};
use crate::tier::{Signature, Symbol};

/// A finite game whose every move advances to a strictly later tier.
///
/// You must implement [`TierGame::slots`], [`TierGame::alphabet`],
/// [`TierGame::primitive_value`] and [`TierGame::generate_moves`]. The
/// defaults tier positions by piece count, allow every signature and let
/// moves place any piece on a blank slot.
pub trait TierGame: Sync {
    /// Number of slots on the board.
    fn slots(&self) -> usize;

    /// Characters for each symbol; index 0 is blank.
    fn alphabet(&self) -> &[char];

    fn num_tiers(&self) -> usize {
        self.slots() + 1
    }

    /// Signatures of `tier`, in address order. By default every signature
    /// with `tier` pieces, or none if the alphabet has too many symbols.
    fn signatures(&self, tier: usize) -> Vec<Signature> {
        let kinds = self.alphabet().len().saturating_sub(1);
        let mut out = Vec::new();
        if kinds == 0 || kinds > MAX_PIECE_KINDS {
            return out;
        }
        let mut counts = [0usize; MAX_PIECE_KINDS];
        compositions(tier, kinds, 0, &mut counts, &mut out);
        out
    }

    /// The board a game starts from.
    fn start(&self) -> Vec<Symbol> {
        vec![0; self.slots()]
    }

    /// Slot changes the game's moves make. Children are only addressable
    /// for these.
    fn replacements(&self) -> Vec<Replacement> {
        (1..self.alphabet().len() as Symbol)
            .map(Replacement::place)
            .collect()
    }

    /// The value of a finished game for the player about to move, or
    /// [`Value::Undecided`] if play continues.
    fn primitive_value(&self, board: &[Symbol]) -> Value;

    /// Legal moves of a position that is not primitive.
    fn generate_moves(&self, board: &[Symbol], moves: &mut Vec<Move>);

    /// How records of this game are packed. Every move reaches a later
    /// tier, so remoteness never exceeds the number of tiers less one.
    fn record_format(&self) -> RecordFormat {
        RecordFormat::two_player(self.num_tiers().saturating_sub(1) as u32)
    }
}

fn compositions(
    total: usize,
    kinds: usize,
    kind: usize,
    counts: &mut [usize; MAX_PIECE_KINDS],
    out: &mut Vec<Signature>,
) {
    if kind + 1 == kinds {
        counts[kind] = total;
        out.push(Signature::new(&counts[..kinds]));
        return;
    }
    for c in 0..=total {
        counts[kind] = c;
        compositions(total - c, kinds, kind + 1, counts, out);
    }
}

/// The misère version of a game: the primitive outcome is reversed.
#[derive(Clone, Debug, Default)]
pub struct Misere<G>(pub G);

impl<G: TierGame> TierGame for Misere<G> {
    fn slots(&self) -> usize {
        self.0.slots()
    }

    fn alphabet(&self) -> &[char] {
        self.0.alphabet()
    }

    fn num_tiers(&self) -> usize {
        self.0.num_tiers()
    }

    fn signatures(&self, tier: usize) -> Vec<Signature> {
        self.0.signatures(tier)
    }

    fn start(&self) -> Vec<Symbol> {
        self.0.start()
    }

    fn replacements(&self) -> Vec<Replacement> {
        self.0.replacements()
    }

    fn primitive_value(&self, board: &[Symbol]) -> Value {
        self.0.primitive_value(board).flip()
    }

    fn generate_moves(&self, board: &[Symbol], moves: &mut Vec<Move>) {
        self.0.generate_moves(board, moves)
    }

    fn record_format(&self) -> RecordFormat {
        self.0.record_format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tier::TierIndex;

    struct Fill;

    impl TierGame for Fill {
        fn slots(&self) -> usize {
            4
        }

        fn alphabet(&self) -> &[char] {
            &['.', 'a', 'b', 'c']
        }

        fn primitive_value(&self, board: &[Symbol]) -> Value {
            if board.iter().all(|&s| s != 0) {
                Value::Lose
            } else {
                Value::Undecided
            }
        }

        fn generate_moves(&self, _board: &[Symbol], _moves: &mut Vec<Move>) {}
    }

    #[test]
    fn default_signatures_cover_piece_counts() {
        let game = Fill;
        assert_eq!(game.num_tiers(), 5);
        assert_eq!(game.signatures(0), vec![Signature::new(&[0, 0, 0])]);
        // Compositions of 2 into 3 parts.
        let two = game.signatures(2);
        assert_eq!(two.len(), 6);
        assert!(two.iter().all(|s| s.occupied() == 2));
        assert_eq!(game.replacements().len(), 3);
    }

    #[test]
    fn misere_flips_primitives() {
        let game = Misere(Fill);
        assert_eq!(game.primitive_value(&[1, 2, 3, 1]), Value::Win);
        assert_eq!(game.primitive_value(&[1, 0, 3, 1]), Value::Undecided);
        assert_eq!(game.signatures(4), Fill.signatures(4));
    }

    /// Five symbols: one piece kind more than a signature can count.
    struct Wide;

    impl TierGame for Wide {
        fn slots(&self) -> usize {
            3
        }

        fn alphabet(&self) -> &[char] {
            &['.', 'a', 'b', 'c', 'd']
        }

        fn primitive_value(&self, _board: &[Symbol]) -> Value {
            Value::Lose
        }

        fn generate_moves(&self, _board: &[Symbol], _moves: &mut Vec<Move>) {}
    }

    #[test]
    fn oversized_alphabet_is_rejected() {
        assert!(Wide.signatures(2).is_empty());
        assert!(matches!(
            TierIndex::for_game(&Wide),
            Err(crate::Error::InvalidLayout(_))
        ));
    }

    /// Each move adds a piece but only every other tier is kept.
    struct Skipping;

    impl TierGame for Skipping {
        fn slots(&self) -> usize {
            6
        }

        fn alphabet(&self) -> &[char] {
            &['.', 'a']
        }

        fn num_tiers(&self) -> usize {
            4
        }

        fn signatures(&self, tier: usize) -> Vec<Signature> {
            vec![Signature::new(&[2 * tier])]
        }

        fn primitive_value(&self, _board: &[Symbol]) -> Value {
            Value::Lose
        }

        fn generate_moves(&self, _board: &[Symbol], _moves: &mut Vec<Move>) {}
    }

    #[test]
    fn default_remoteness_bound_follows_tiers() {
        assert_eq!(Fill.record_format().max_remoteness(), 4);
        assert_eq!(Skipping.record_format().max_remoteness(), 3);
        let index = TierIndex::for_game(&Skipping).unwrap();
        assert_eq!(index.num_tiers(), 4);
    }
}
