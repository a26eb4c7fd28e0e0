//! Core types for the staking ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integer raw token units)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account identifier (wallet address, account number, etc.)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// By-value handle to a derivative-token issuer service
///
/// Stake records capture issuer addresses at creation time, not live
/// references into the tier registry. An issuer outlives any tier that
/// pointed at it, so a record's burn step still resolves even after the
/// tier has been removed from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuerAddress(String);

impl IssuerAddress {
    /// Create new issuer address
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IssuerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single time-locked stake owned by one account
///
/// Immutable after creation; destroyed by swap-remove compaction when the
/// stake is released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeRecord {
    /// Staked amount in raw token units
    pub amount: u128,

    /// Creation timestamp
    pub staked_at: DateTime<Utc>,

    /// Timestamp after which release is permitted (strict inequality)
    pub maturity: DateTime<Utc>,

    /// Issuers of the tiers this stake was enrolled into, in tier registry
    /// order at creation time
    pub enrolled_issuers: Vec<IssuerAddress>,
}

impl StakeRecord {
    /// Whether the lock has matured relative to `now`
    ///
    /// Maturity is strict: a release exactly at the maturity instant is
    /// still rejected.
    pub fn is_matured(&self, now: DateTime<Utc>) -> bool {
        now > self.maturity
    }
}

/// Per-account counters backing the sparse stake record table
///
/// `stake_count` is the live length of the account's record table; slots
/// `[0, stake_count)` hold records. `total_staked` is the sum of `amount`
/// over all live records and never exceeds the account's underlying token
/// balance immediately after any operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountPosition {
    /// Number of live stake records
    pub stake_count: u32,

    /// Sum of staked amounts over all live records (raw token units)
    pub total_staked: u128,
}
