//! Staking tier definitions and the tier matching policy
//!
//! Tiers live in a single ordered registry. Registry order defines the
//! matching order at stake creation (and therefore the enrollment order
//! recorded on each stake), but carries no semantic priority: overlapping
//! tiers all match independently.
//!
//! # Matching policy
//!
//! A tier qualifies when the stake's requested lock duration meets or
//! exceeds the tier's minimum duration. The comparison lives in one named
//! function, [`tier_qualifies`], so the direction of the threshold check is
//! explicit and covered by its own tests.

use crate::types::IssuerAddress;
use serde::{Deserialize, Serialize};

/// One row of the tier registry
///
/// Pairs a minimum lock duration with the issuer that mints the tier's
/// derivative balance. Rows are appended by `add_tier` and swap-removed by
/// `remove_tier`, so a row's index is not stable across removals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierDefinition {
    /// Minimum lock duration (seconds) required to qualify
    pub min_duration_secs: u64,

    /// Issuer of this tier's derivative balance
    pub issuer: IssuerAddress,
}

/// Whether a stake locked for `duration_secs` qualifies for `tier`
///
/// The stake's duration must meet or exceed the tier's minimum. A stake
/// locked for 60 days qualifies for a 30-day tier but not for a 90-day one.
pub fn tier_qualifies(tier: &TierDefinition, duration_secs: u64) -> bool {
    duration_secs >= tier.min_duration_secs
}

/// Issuers of all tiers that qualify for `duration_secs`, in registry order
pub fn matching_issuers(tiers: &[TierDefinition], duration_secs: u64) -> Vec<IssuerAddress> {
    tiers
        .iter()
        .filter(|tier| tier_qualifies(tier, duration_secs))
        .map(|tier| tier.issuer.clone())
        .collect()
}
