//! Tic-tac-toe on an `n x n` board with `n` in a row to win.
//!
//! X moves first, so a tier of `k` pieces holds exactly one signature:
//! `ceil(k / 2)` X's and `floor(k / 2)` O's.

use crate::child::{Move, Replacement};
use crate::game::TierGame;
use crate::record::{RecordFormat, Value};
use crate::tier::{Signature, Symbol, BLANK};

pub const X: Symbol = 1;
pub const O: Symbol = 2;

#[derive(Clone, Debug)]
pub struct TicTacToe {
    width: usize,
    lines: Vec<Vec<usize>>,
}

impl Default for TicTacToe {
    fn default() -> Self {
        Self::new(3)
    }
}

impl TicTacToe {
    pub fn new(width: usize) -> Self {
        let mut lines = Vec::with_capacity(2 * width + 2);
        for i in 0..width {
            // rows, then columns
            lines.push((0..width).map(|j| i * width + j).collect());
            lines.push((0..width).map(|j| j * width + i).collect());
        }
        lines.push((0..width).map(|i| i * width + i).collect());
        lines.push((0..width).map(|i| i * width + width - 1 - i).collect());
        Self { width, lines }
    }

    /// The player about to move.
    pub fn to_move(board: &[Symbol]) -> Symbol {
        let xs = board.iter().filter(|&&s| s == X).count();
        let os = board.iter().filter(|&&s| s == O).count();
        if xs > os {
            O
        } else {
            X
        }
    }

    fn has_line(&self, board: &[Symbol], player: Symbol) -> bool {
        self.lines
            .iter()
            .any(|line| line.iter().all(|&slot| board[slot] == player))
    }

    /// Board as a grid, one row per line.
    pub fn display(&self, board: &[Symbol]) -> String {
        let cell = |s: Symbol| match s {
            X => 'X',
            O => 'O',
            _ => ' ',
        };
        let rows: Vec<String> = board
            .chunks(self.width)
            .map(|row| {
                row.iter()
                    .map(|&s| cell(s).to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .collect();
        rows.join(&format!("\n{}\n", "-".repeat(4 * self.width - 3)))
    }
}

impl TierGame for TicTacToe {
    fn slots(&self) -> usize {
        self.width * self.width
    }

    fn alphabet(&self) -> &[char] {
        &[' ', 'X', 'O']
    }

    fn signatures(&self, tier: usize) -> Vec<Signature> {
        vec![Signature::new(&[tier.div_ceil(2), tier / 2])]
    }

    fn replacements(&self) -> Vec<Replacement> {
        vec![Replacement::place(X), Replacement::place(O)]
    }

    fn primitive_value(&self, board: &[Symbol]) -> Value {
        let mover = Self::to_move(board);
        let last = if mover == X { O } else { X };
        if self.has_line(board, last) {
            return Value::Lose;
        }
        if self.has_line(board, mover) {
            // Play would have stopped before the mover's line was completed.
            return Value::Impossible;
        }
        if board.iter().all(|&s| s != BLANK) {
            return Value::Tie;
        }
        Value::Undecided
    }

    fn generate_moves(&self, board: &[Symbol], moves: &mut Vec<Move>) {
        let mover = Self::to_move(board);
        moves.extend(
            board
                .iter()
                .enumerate()
                .filter(|(_, &s)| s == BLANK)
                .map(|(slot, _)| Move::new(slot, mover)),
        );
    }

    fn record_format(&self) -> RecordFormat {
        RecordFormat::new(
            &[Value::Win, Value::Lose, Value::Tie, Value::Impossible],
            self.slots() as u32,
        )
    }
}
