//! Reference games.

pub mod tictactoe;

pub use tictactoe::TicTacToe;
