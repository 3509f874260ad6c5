//! Strong solving of tiered board games by retrograde analysis.
//!
//! Positions are boards of fixed slots holding symbols. A game groups them
//! into tiers such that every move leads to a strictly later tier, and the
//! crate assigns every position a dense address: the position's tier offset,
//! plus the offset of its piece-count signature, plus the rank of its
//! occupied slots (combinatorial number system) times the number of piece
//! arrangements, plus the rank of its piece arrangement.
//!
//! To use this package, implement the trait [`game::TierGame`] for your
//! game, then run a [`solver::TierSolver`] or [`solver::ParallelSolver`]
//! into a [`store::RecordStore`].

pub mod analysis;
pub mod arrangement;
pub mod cache;
pub mod child;
pub mod combination;
pub mod cursor;
pub mod error;
pub mod game;
pub mod games;
pub mod record;
pub mod solver;
pub mod store;
pub mod tier;

pub use error::{Error, Result};
