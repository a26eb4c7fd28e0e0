//! External collaborator interfaces
//!
//! The staking core treats the underlying token, tier authorization, time,
//! and derivative-token issuers as opaque services behind traits. The
//! production deployment wires real services in; the in-memory
//! implementations here back tests and local development.
//!
//! Issuers are referenced *by value* ([`IssuerAddress`]) inside stake
//! records and tier rows, and resolved through an [`IssuerDirectory`] at
//! mint/burn time. The directory outlives the tier registry: removing a
//! tier does not unregister its issuer, so records enrolled before the
//! removal still burn correctly on release.

use crate::error::{Error, Result};
use crate::types::{AccountId, IssuerAddress};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Read access to underlying token balances, used for the solvency check
pub trait BalanceSource: Send + Sync {
    /// Current underlying token balance of `account`, in raw units
    fn balance_of(&self, account: &AccountId) -> Result<u128>;
}

/// A service that mints and burns one tier's derivative balance
pub trait DerivativeIssuer: Send + Sync {
    /// Mint `amount` of derivative balance to `account`
    fn mint(&self, account: &AccountId, amount: u128) -> Result<()>;

    /// Burn `amount` of derivative balance from `account`
    fn burn(&self, account: &AccountId, amount: u128) -> Result<()>;
}

/// Capability check gating tier management
///
/// Evaluated before the operation body executes; a `false` answer fails
/// closed and the operation does not proceed.
pub trait TierAuthority: Send + Sync {
    /// Whether `account` may add and remove staking tiers
    fn can_manage_tiers(&self, account: &AccountId) -> bool;
}

/// Source of the current time
///
/// Maturity is evaluated once against this value at the instant of the
/// call, never awaited.
pub trait Clock: Send + Sync {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Advance the clock by `secs` seconds
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.write();
        *now = *now + chrono::Duration::seconds(secs);
    }

    /// Jump the clock to `instant`
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.write() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Directory resolving issuer addresses to live issuer services
#[derive(Clone, Default)]
pub struct IssuerDirectory {
    issuers: Arc<RwLock<HashMap<IssuerAddress, Arc<dyn DerivativeIssuer>>>>,
}

impl IssuerDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an issuer service under `address`
    pub fn register(&self, address: IssuerAddress, issuer: Arc<dyn DerivativeIssuer>) {
        self.issuers.write().insert(address, issuer);
    }

    /// Resolve `address` to its issuer service
    pub fn resolve(&self, address: &IssuerAddress) -> Result<Arc<dyn DerivativeIssuer>> {
        self.issuers
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::Issuer(format!("unknown issuer {}", address)))
    }
}

impl std::fmt::Debug for IssuerDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuerDirectory")
            .field("issuers", &self.issuers.read().len())
            .finish()
    }
}

/// Bundle of collaborator services handed to the staking core at open time
///
/// Passed explicitly rather than reached through ambient globals, so a test
/// can wire a manual clock and in-memory services without touching process
/// state.
#[derive(Clone)]
pub struct Services {
    /// Underlying token balance lookup
    pub balances: Arc<dyn BalanceSource>,

    /// Tier-management capability check
    pub authority: Arc<dyn TierAuthority>,

    /// Current-time source
    pub clock: Arc<dyn Clock>,

    /// Issuer address resolution
    pub issuers: IssuerDirectory,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("issuers", &self.issuers)
            .finish()
    }
}

/// In-memory balance table
#[derive(Debug, Clone, Default)]
pub struct InMemoryBalances {
    balances: Arc<RwLock<HashMap<AccountId, u128>>>,
}

impl InMemoryBalances {
    /// Create an empty balance table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance of `account`
    pub fn set_balance(&self, account: AccountId, amount: u128) {
        self.balances.write().insert(account, amount);
    }
}

impl BalanceSource for InMemoryBalances {
    fn balance_of(&self, account: &AccountId) -> Result<u128> {
        Ok(self.balances.read().get(account).copied().unwrap_or(0))
    }
}

/// In-memory derivative issuer tracking minted balances per account
#[derive(Debug, Clone, Default)]
pub struct InMemoryIssuer {
    balances: Arc<RwLock<HashMap<AccountId, u128>>>,
}

impl InMemoryIssuer {
    /// Create an issuer with no outstanding balances
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding derivative balance of `account`
    pub fn balance_of(&self, account: &AccountId) -> u128 {
        self.balances.read().get(account).copied().unwrap_or(0)
    }
}

impl DerivativeIssuer for InMemoryIssuer {
    fn mint(&self, account: &AccountId, amount: u128) -> Result<()> {
        let mut balances = self.balances.write();
        let balance = balances.entry(account.clone()).or_insert(0);
        *balance = balance.checked_add(amount).ok_or_else(|| {
            Error::Issuer(format!("derivative balance overflow for {}", account))
        })?;
        Ok(())
    }

    fn burn(&self, account: &AccountId, amount: u128) -> Result<()> {
        let mut balances = self.balances.write();
        let balance = balances.entry(account.clone()).or_insert(0);
        *balance = balance.checked_sub(amount).ok_or_else(|| {
            Error::Issuer(format!(
                "insufficient derivative balance for {}: need {}",
                account, amount
            ))
        })?;
        Ok(())
    }
}

/// Authority granting tier management to a fixed set of accounts
#[derive(Debug, Clone, Default)]
pub struct StaticTierAuthority {
    admins: HashSet<AccountId>,
}

impl StaticTierAuthority {
    /// Create an authority with the given admin accounts
    pub fn new(admins: impl IntoIterator<Item = AccountId>) -> Self {
        Self {
            admins: admins.into_iter().collect(),
        }
    }
}

impl TierAuthority for StaticTierAuthority {
    fn can_manage_tiers(&self, account: &AccountId) -> bool {
        self.admins.contains(account)
    }
}
