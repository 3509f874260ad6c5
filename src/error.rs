//! Errors raised while hashing positions or solving a game.
//!
//! Every variant except [`Error::Io`] and [`Error::ThreadPool`] is fatal for a
//! solve run and carries the tier, address or slot at fault. A child record
//! that another thread has not published yet is not an error; the concurrent
//! read path reports it as [`crate::cache::Lookup::Pending`].

use thiserror::Error;

use crate::record::Value;
use crate::tier::Signature;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("rank {rank} is out of range for tier {tier} (size {size})")]
    RankOutOfRange { tier: usize, rank: u64, size: u64 },

    #[error("address {address} is out of range (hash space {total})")]
    AddressOutOfRange { address: u64, total: u64 },

    #[error("tier {tier} does not exist ({tiers} tiers)")]
    TierOutOfRange { tier: usize, tiers: usize },

    #[error("signature mismatch: expected {expected:?}, found {found:?}")]
    SignatureMismatch {
        expected: Signature,
        found: Signature,
    },

    #[error("signature {0:?} does not belong to any tier")]
    UnknownSignature(Signature),

    #[error("invalid tier layout: {0}")]
    InvalidLayout(String),

    #[error("64-bit overflow while computing {what}")]
    Overflow { what: String },

    #[error("record for address {address} (tier {tier}) is missing from the store")]
    MissingRecord { address: u64, tier: usize },

    #[error("adapter violation in tier {tier} at address {address}, slot {slot:?}: {reason}")]
    AdapterViolation {
        tier: usize,
        address: u64,
        slot: Option<usize>,
        reason: String,
    },

    #[error("record {value:?} in {remoteness} at address {address} does not fit the record format")]
    UnencodableRecord {
        address: u64,
        value: Value,
        remoteness: u32,
    },

    #[error("no precomputed replacement {from} -> {to}")]
    UnknownReplacement { from: u8, to: u8 },

    #[error("invalid position: {reason}")]
    InvalidPosition { reason: String },

    #[error("corrupt store: {reason}")]
    CorruptStore { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn overflow(what: impl Into<String>) -> Self {
        Self::Overflow { what: what.into() }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidPosition {
            reason: reason.into(),
        }
    }
}
