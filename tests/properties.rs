//! Property-based tests for hashing, enumeration and child addressing.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use tiersolve::child::{ChildHasher, Move, Replacement};
use tiersolve::combination::Binomial;
use tiersolve::cursor::TierCursor;
use tiersolve::game::TierGame;
use tiersolve::games::TicTacToe;
use tiersolve::record::Value;
use tiersolve::tier::{Signature, Symbol, TierIndex};

/// Every board over `kinds` piece kinds, tiered by piece count.
struct Free {
    slots: usize,
    kinds: usize,
}

const ALPHABET: [char; 4] = ['-', 'a', 'b', 'c'];

impl TierGame for Free {
    fn slots(&self) -> usize {
        self.slots
    }

    fn alphabet(&self) -> &[char] {
        &ALPHABET[..=self.kinds]
    }

    fn replacements(&self) -> Vec<Replacement> {
        let symbols = 0..=self.kinds as Symbol;
        symbols
            .clone()
            .flat_map(|from| symbols.clone().map(move |to| (from, to)))
            .filter(|(from, to)| from != to)
            .map(|(from, to)| Replacement::new(from, to))
            .collect()
    }

    fn primitive_value(&self, _board: &[Symbol]) -> Value {
        Value::Lose
    }

    fn generate_moves(&self, _board: &[Symbol], _moves: &mut Vec<Move>) {}
}

fn board_strategy(max_slots: usize, kinds: Symbol) -> impl Strategy<Value = Vec<Symbol>> {
    prop::collection::vec(0..=kinds, 1..=max_slots)
}

/// A tic-tac-toe board reached by playing the given slot choices.
fn play(choices: &[usize]) -> Vec<Symbol> {
    let game = TicTacToe::default();
    let mut board = game.start();
    let mut moves = Vec::new();
    for &choice in choices {
        if game.primitive_value(&board) != Value::Undecided {
            break;
        }
        moves.clear();
        game.generate_moves(&board, &mut moves);
        let m = moves[choice % moves.len()];
        board[m.slot] = m.symbol;
    }
    board
}

#[test]
fn every_tictactoe_address_round_trips() {
    let index = TierIndex::for_game(&TicTacToe::default()).unwrap();
    let mut board = Vec::new();
    for address in 0..index.total() {
        let tier = index.unhash_into(address, &mut board).unwrap();
        assert_eq!(tier, index.tier_for_address(address).unwrap());
        assert_eq!(index.hash(&board).unwrap(), address);
    }
}

#[test]
fn tier_sizes_match_enumeration() {
    for slots in 1..=8 {
        let game = Free { slots, kinds: 3 };
        let index = TierIndex::for_game(&game).unwrap();
        let binomial = Binomial::new(slots).unwrap();

        let mut counts: FxHashMap<Signature, u64> = FxHashMap::default();
        let mut board = vec![0 as Symbol; slots];
        'boards: loop {
            *counts.entry(Signature::of_board(&board)).or_default() += 1;
            // Next board in base-4 order.
            for slot in 0..slots {
                if board[slot] < 3 {
                    board[slot] += 1;
                    continue 'boards;
                }
                board[slot] = 0;
            }
            break;
        }

        assert_eq!(index.total(), 4u64.pow(slots as u32));
        for (signature, count) in counts {
            let layout = index.signature_layout(&signature).unwrap();
            assert_eq!(layout.combinations, binomial.get(slots, signature.occupied()));
            assert_eq!(layout.size, layout.combinations * layout.arrangements);
            assert_eq!(layout.size, count, "{signature:?} with {slots} slots");
        }
    }
}

#[test]
fn cursor_visits_ranks_in_order() {
    let game = Free { slots: 6, kinds: 3 };
    let index = TierIndex::for_game(&game).unwrap();
    for tier in 0..index.num_tiers() {
        let offset = index.tier_offset(tier).unwrap();
        let mut cursor = TierCursor::new(&index, tier).unwrap();
        let mut rank = 0;
        loop {
            assert_eq!(cursor.board(), index.unhash(offset + rank).unwrap());
            rank += 1;
            if cursor.next().is_none() {
                break;
            }
        }
        assert_eq!(rank, index.tier_size(tier).unwrap());
        assert!(!cursor.has_next());
    }
}

proptest! {
    #[test]
    fn hash_is_a_bijection(board in board_strategy(12, 3)) {
        let game = Free { slots: board.len(), kinds: 3 };
        let index = TierIndex::for_game(&game).unwrap();
        let address = index.hash(&board).unwrap();
        prop_assert!(address < index.total());
        prop_assert_eq!(index.unhash(address).unwrap(), board);
    }

    #[test]
    fn rank_unrank_within_tier(slots in 1usize..=10, tier in 0usize..=10, pick in any::<u64>()) {
        let game = Free { slots, kinds: 2 };
        let index = TierIndex::for_game(&game).unwrap();
        let tier = tier.min(slots);
        let size = index.tier_size(tier).unwrap();
        let rank = pick % size;
        let address = index.address_for_tier_and_rank(tier, rank).unwrap();
        let board = index.unhash(address).unwrap();
        prop_assert_eq!(index.tier_of(&board).unwrap(), tier);
        prop_assert_eq!(index.hash(&board).unwrap(), address);
        prop_assert!(index.address_for_tier_and_rank(tier, size).is_err());
    }

    #[test]
    fn tictactoe_moves_advance_tiers(choices in prop::collection::vec(0usize..9, 0..9)) {
        let game = TicTacToe::default();
        let index = TierIndex::for_game(&game).unwrap();
        let board = play(&choices);
        let tier = index.tier_of(&board).unwrap();
        let mut moves = Vec::new();
        game.generate_moves(&board, &mut moves);
        for m in moves {
            let mut child = board.clone();
            child[m.slot] = m.symbol;
            prop_assert!(index.tier_of(&child).unwrap() > tier);
        }
    }

    #[test]
    fn child_addresses_match_rehash(board in board_strategy(10, 3)) {
        let game = Free { slots: board.len(), kinds: 3 };
        let index = TierIndex::for_game(&game).unwrap();
        let mut hasher = ChildHasher::new(&index, &game.replacements()).unwrap();
        hasher.load(&board).unwrap();
        for slot in 0..board.len() {
            for symbol in 0..=3 {
                if symbol == board[slot] {
                    continue;
                }
                let mut child = board.clone();
                child[slot] = symbol;
                let expected = index.hash(&child).unwrap();
                let found = hasher.child(Move::new(slot, symbol)).unwrap();
                prop_assert_eq!(found.address, expected);
                prop_assert_eq!(found.tier, index.tier_of(&child).unwrap());
            }
        }
    }
}
