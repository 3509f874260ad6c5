//! Reading a solved store back: single lookups, per-tier statistics and
//! perfect-play moves.

use std::fmt;

use rayon::prelude::*;

use crate::child::{ChildHasher, Move};
use crate::error::Result;
use crate::game::TierGame;
use crate::record::{Record, RecordFormat, Value};
use crate::store::RecordStore;
use crate::tier::{Symbol, TierIndex};

/// The stored record of `board`, `None` if it was never solved.
pub fn lookup(
    index: &TierIndex,
    store: &dyn RecordStore,
    format: &RecordFormat,
    board: &[Symbol],
) -> Result<Option<Record>> {
    let address = index.hash(board)?;
    store
        .read(address)?
        .map(|packed| format.decode(packed))
        .transpose()
}

/// Value counts of one tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierStats {
    pub tier: usize,
    pub positions: u64,
    /// Count per value of the record format, unsolved positions under
    /// [`Value::Undecided`].
    pub counts: Vec<(Value, u64)>,
    pub max_remoteness: u32,
}

impl TierStats {
    pub fn count(&self, value: Value) -> u64 {
        self.counts
            .iter()
            .find(|(v, _)| *v == value)
            .map_or(0, |&(_, n)| n)
    }
}

impl fmt::Display for TierStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier {:>2}: {:>10} positions", self.tier, self.positions)?;
        for (value, n) in &self.counts {
            if *n > 0 {
                write!(f, ", {value:?} {n}")?;
            }
        }
        write!(f, ", max remoteness {}", self.max_remoteness)
    }
}

/// Statistics for every tier, scanned in parallel.
pub fn tier_stats(
    index: &TierIndex,
    store: &dyn RecordStore,
    format: &RecordFormat,
) -> Result<Vec<TierStats>> {
    (0..index.num_tiers())
        .into_par_iter()
        .map(|tier| {
            let begin = index.tier_offset(tier)?;
            let end = index.tier_offset(tier + 1)?;
            let mut counts: Vec<(Value, u64)> = format.values().iter().map(|&v| (v, 0)).collect();
            let mut max_remoteness = 0;
            for address in begin..end {
                let record = match store.read(address)? {
                    Some(packed) => format.decode(packed)?,
                    None => Record::UNDECIDED,
                };
                if let Some(entry) = counts.iter_mut().find(|(v, _)| *v == record.value) {
                    entry.1 += 1;
                }
                max_remoteness = max_remoteness.max(record.remoteness);
            }
            Ok(TierStats {
                tier,
                positions: end - begin,
                counts,
                max_remoteness,
            })
        })
        .collect()
}

/// Moves of `board` that keep its stored record, with the child record each
/// one leads to. Empty for primitive or unsolved positions.
pub fn best_moves<G: TierGame + ?Sized>(
    game: &G,
    index: &TierIndex,
    store: &dyn RecordStore,
    board: &[Symbol],
) -> Result<Vec<(Move, Record)>> {
    let format = game.record_format();
    let Some(parent) = lookup(index, store, &format, board)? else {
        return Ok(Vec::new());
    };
    if game.primitive_value(board) != Value::Undecided {
        return Ok(Vec::new());
    }
    let mut moves = Vec::new();
    game.generate_moves(board, &mut moves);
    let mut hasher = ChildHasher::new(index, &game.replacements())?;
    hasher.load(board)?;

    let mut best = Vec::new();
    for mv in moves {
        let address = hasher.child_address(mv)?;
        let Some(packed) = store.read(address)? else {
            continue;
        };
        let child = format.decode(packed)?;
        let realises = match parent.value {
            // Ties are reached through tied or drawn children alike.
            Value::Tie => {
                matches!(child.value, Value::Tie | Value::Draw)
                    && child.remoteness + 1 == parent.remoteness
            }
            _ => child.previous_position() == parent,
        };
        if realises {
            best.push((mv, child));
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::TicTacToe;
    use crate::solver::{SolverOptions, TierSolver};
    use crate::store::MemoryStore;

    #[test]
    fn stats_and_best_moves_of_tictactoe() {
        let game = TicTacToe::default();
        let solver = TierSolver::new(&game, SolverOptions::default()).unwrap();
        let index = solver.index();
        let store = MemoryStore::new(index.total());
        solver.solve(&store).unwrap();

        let stats = tier_stats(index, &store, &game.record_format()).unwrap();
        assert_eq!(stats.len(), 10);
        assert_eq!(stats[0].positions, 1);
        assert_eq!(stats[0].count(Value::Tie), 1);
        assert_eq!(stats[0].max_remoteness, 9);
        assert!(stats.iter().all(|s| s.count(Value::Undecided) == 0));
        let total: u64 = stats.iter().map(|s| s.positions).sum();
        assert_eq!(total, index.total());
        assert!(stats[1].to_string().starts_with("tier  1:"));

        // X has two in a row on top, X to move after O's reply.
        let board = index.board_from_string("XX OO    ").unwrap();
        let best = best_moves(&game, index, &store, &board).unwrap();
        assert_eq!(best, vec![(Move::new(2, 1), Record::new(Value::Lose, 0))]);
        // Every opening move keeps the draw.
        let empty = game.start();
        assert_eq!(best_moves(&game, index, &store, &empty).unwrap().len(), 9);
        assert_eq!(
            lookup(index, &store, &game.record_format(), &empty).unwrap(),
            Some(Record::new(Value::Tie, 9))
        );
    }
}
