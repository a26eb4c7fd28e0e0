//! StakeVault Staking Core
//!
//! Per-account ledger of time-locked token stakes with tier enrollment and
//! derivative-balance accounting.
//!
//! # Architecture
//!
//! - **Array over KV**: per-account stake records emulate a resizable
//!   array on RocksDB, with swap-remove compaction on release
//! - **Single Writer**: one actor task serializes all mutations
//! - **Tier Registry**: ordered table of minimum-duration/issuer pairs,
//!   snapshotted at stake creation
//! - **External Issuers**: derivative balances are minted and burned by
//!   services behind the [`services::DerivativeIssuer`] trait

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]
//!
//! # Invariants
//!
//! - Solvency: `total_staked(account) <= balance_of(account)` after every
//!   operation
//! - Bounded accounts: live record count never exceeds the configured
//!   per-account cap
//! - Conservation: a release subtracts exactly the released record's
//!   amount and burns exactly what its tiers minted

pub mod actor;
pub mod config;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod services;
pub mod storage;
pub mod tiers;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::Staking;
pub use storage::Storage;
pub use tiers::TierDefinition;
pub use types::{AccountId, AccountPosition, IssuerAddress, StakeRecord};
