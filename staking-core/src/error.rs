//! Error types for the staking ledger

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type for staking operations
pub type Result<T> = std::result::Result<T, Error>;

/// Staking errors
#[derive(Error, Debug)]
pub enum Error {
    /// Requested stake would exceed the account's token balance
    #[error("Stake too large: staked total would reach {requested}, balance is {available}")]
    StakeTooLarge {
        /// Total staked amount the operation would produce
        requested: u128,
        /// Underlying token balance of the account
        available: u128,
    },

    /// Per-account stake record cap reached
    #[error("Too many stakes: account already holds the maximum of {max} records")]
    TooManyStakes {
        /// Configured per-account record cap
        max: u32,
    },

    /// Lock has not matured yet
    #[error("Cannot unstake: lock matures at {maturity}")]
    CannotUnstake {
        /// Maturity timestamp of the locked record
        maturity: DateTime<Utc>,
    },

    /// Slot index out of range for the account
    #[error("Stake not found at slot {slot}")]
    StakeNotFound {
        /// Requested slot index
        slot: u32,
    },

    /// Tier index out of range
    #[error("Tier not found at index {index}")]
    TierNotFound {
        /// Requested tier index
        index: u32,
    },

    /// Caller lacks tier-management authority
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Zero-amount stakes are rejected
    #[error("Stake amount must be positive")]
    ZeroAmount,

    /// Derivative-token issuer failure (mint, burn, or unknown issuer)
    #[error("Issuer error: {0}")]
    Issuer(String),

    /// Storage error (RocksDB)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
