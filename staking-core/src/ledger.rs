//! Main staking orchestration layer
//!
//! This module ties together storage, the tier registry, and the actor
//! component into a high-level API for stake management.
//!
//! # Example
//!
//! ```no_run
//! use staking_core::{
//!     services::{
//!         InMemoryBalances, IssuerDirectory, Services, StaticTierAuthority, SystemClock,
//!     },
//!     AccountId, Config, Staking,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> staking_core::Result<()> {
//!     let services = Services {
//!         balances: Arc::new(InMemoryBalances::new()),
//!         authority: Arc::new(StaticTierAuthority::new([AccountId::new("admin")])),
//!         clock: Arc::new(SystemClock),
//!         issuers: IssuerDirectory::new(),
//!     };
//!
//!     let staking = Staking::open(Config::default(), services).await?;
//!
//!     let slot = staking
//!         .stake_tokens(AccountId::new("acct-1"), 500, 60 * 86_400)
//!         .await?;
//!     println!("staked at slot {slot}");
//!
//!     staking.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_staking_actor, StakingHandle},
    metrics::Metrics,
    services::Services,
    storage::StorageStats,
    tiers::TierDefinition,
    types::{AccountId, AccountPosition, IssuerAddress, StakeRecord},
    Config, Error, Result, Storage,
};
use std::sync::Arc;

/// Main staking interface
///
/// All mutating operations are serialized through a single actor task; see
/// [`crate::actor`] for the transaction model.
pub struct Staking {
    /// Actor handle for serialized operations
    handle: StakingHandle,

    /// Direct storage access (for stats)
    storage: Arc<Storage>,

    /// Metrics collector
    metrics: Metrics,
}

impl Staking {
    /// Open the staking ledger with configuration and collaborator services
    pub async fn open(config: Config, services: Services) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);

        let metrics = Metrics::new()
            .map_err(|e| Error::Config(format!("Failed to create metrics: {}", e)))?;
        metrics.set_tiers_registered(storage.tier_count()?);

        let handle = spawn_staking_actor(
            storage.clone(),
            services,
            metrics.clone(),
            config.staking.max_stakes_per_address,
        );

        Ok(Self {
            handle,
            storage,
            metrics,
        })
    }

    /// Create a time-locked stake of `amount` for `duration_secs`
    ///
    /// Enrolls the stake into every tier whose minimum duration the lock
    /// satisfies, minting that tier's derivative balance to the account.
    /// Returns the new slot index; slot indices are not stable across
    /// releases. Fails with [`Error::StakeTooLarge`] when the account's
    /// staked total would exceed its token balance and with
    /// [`Error::TooManyStakes`] at the per-account record cap.
    pub async fn stake_tokens(
        &self,
        account: AccountId,
        amount: u128,
        duration_secs: u64,
    ) -> Result<u32> {
        self.handle.stake(account, amount, duration_secs).await
    }

    /// Release the matured stake at `slot`
    ///
    /// Burns every enrolled tier's derivative balance, then compacts the
    /// record table by swap-remove. Fails with [`Error::StakeNotFound`] for
    /// an out-of-range slot and [`Error::CannotUnstake`] while the lock has
    /// not strictly passed its maturity.
    pub async fn unstake_tokens(&self, account: AccountId, slot: u32) -> Result<()> {
        self.handle.unstake(account, slot).await
    }

    /// Append a staking tier, returning its registry index
    ///
    /// Requires tier-management authority; fails closed with
    /// [`Error::Unauthorized`] otherwise.
    pub async fn add_staking_tier(
        &self,
        caller: AccountId,
        min_duration_secs: u64,
        issuer: IssuerAddress,
    ) -> Result<u32> {
        self.handle
            .add_tier(
                caller,
                TierDefinition {
                    min_duration_secs,
                    issuer,
                },
            )
            .await
    }

    /// Swap-remove the staking tier at `index`
    ///
    /// Tier indices are not stable: removing a non-last tier relabels the
    /// last tier into its slot. Existing stake records keep the issuer
    /// references they captured at creation time.
    pub async fn remove_staking_tier(
        &self,
        caller: AccountId,
        index: u32,
    ) -> Result<TierDefinition> {
        self.handle.remove_tier(caller, index).await
    }

    /// Read the stake record at `slot`
    pub async fn get_stake(&self, account: AccountId, slot: u32) -> Result<StakeRecord> {
        self.handle.get_stake(account, slot).await
    }

    /// Read an account's counters (live record count and staked total)
    pub async fn position(&self, account: AccountId) -> Result<AccountPosition> {
        self.handle.get_position(account).await
    }

    /// Number of live stake records for `account`
    pub async fn stake_count(&self, account: AccountId) -> Result<u32> {
        Ok(self.position(account).await?.stake_count)
    }

    /// Sum of staked amounts over the account's live records
    pub async fn total_staked(&self, account: AccountId) -> Result<u128> {
        Ok(self.position(account).await?.total_staked)
    }

    /// Enumerate the tier registry in order
    pub async fn tiers(&self) -> Result<Vec<TierDefinition>> {
        self.handle.list_tiers().await
    }

    /// Storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        self.storage.stats()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Shutdown the staking ledger
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        Clock, InMemoryBalances, InMemoryIssuer, IssuerDirectory, ManualClock,
        StaticTierAuthority,
    };
    use chrono::{TimeZone, Utc};

    const DAY: u64 = 86_400;

    struct TestEnv {
        staking: Staking,
        balances: InMemoryBalances,
        clock: ManualClock,
        issuers: IssuerDirectory,
        _temp: tempfile::TempDir,
    }

    fn admin() -> AccountId {
        AccountId::new("admin")
    }

    async fn create_test_env() -> TestEnv {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();

        let balances = InMemoryBalances::new();
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        let issuers = IssuerDirectory::new();

        let services = Services {
            balances: Arc::new(balances.clone()),
            authority: Arc::new(StaticTierAuthority::new([admin()])),
            clock: Arc::new(clock.clone()),
            issuers: issuers.clone(),
        };

        let staking = Staking::open(config, services).await.unwrap();

        TestEnv {
            staking,
            balances,
            clock,
            issuers,
            _temp: temp_dir,
        }
    }

    /// Register an in-memory issuer and return it for balance assertions
    fn register_issuer(env: &TestEnv, address: &str) -> InMemoryIssuer {
        let issuer = InMemoryIssuer::new();
        env.issuers
            .register(IssuerAddress::new(address), Arc::new(issuer.clone()));
        issuer
    }

    #[tokio::test]
    async fn test_stake_and_read_back() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        let before = env.clock.now();
        let slot = env
            .staking
            .stake_tokens(account.clone(), 100, 30 * DAY)
            .await
            .unwrap();
        assert_eq!(slot, 0);

        let record = env.staking.get_stake(account.clone(), slot).await.unwrap();
        assert_eq!(record.amount, 100);
        assert_eq!(record.maturity, before + chrono::Duration::seconds(30 * DAY as i64));

        assert_eq!(env.staking.stake_count(account.clone()).await.unwrap(), 1);
        assert_eq!(env.staking.total_staked(account).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_stake_exceeding_balance_fails() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        env.staking
            .stake_tokens(account.clone(), 600, DAY)
            .await
            .unwrap();

        // 600 + 500 > 1000
        let err = env
            .staking
            .stake_tokens(account.clone(), 500, DAY)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::StakeTooLarge {
                requested: 1100,
                available: 1000
            }
        ));

        // The failed attempt committed nothing.
        assert_eq!(env.staking.total_staked(account).await.unwrap(), 600);
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        let err = env
            .staking
            .stake_tokens(account, 0, DAY)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ZeroAmount));
    }

    #[tokio::test]
    async fn test_stake_cap_enforced() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), u128::MAX);

        for _ in 0..50 {
            env.staking
                .stake_tokens(account.clone(), 1, DAY)
                .await
                .unwrap();
        }

        // The 51st attempt hits the cap.
        let err = env
            .staking
            .stake_tokens(account.clone(), 1, DAY)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TooManyStakes { max: 50 }));
        assert_eq!(env.staking.stake_count(account).await.unwrap(), 50);
    }

    #[tokio::test]
    async fn test_unstake_before_maturity_fails() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        env.staking
            .stake_tokens(account.clone(), 100, 30 * DAY)
            .await
            .unwrap();

        let err = env
            .staking
            .unstake_tokens(account.clone(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CannotUnstake { .. }));

        // Exactly at maturity still fails; strictly after succeeds.
        env.clock.advance_secs(30 * DAY as i64);
        let err = env
            .staking
            .unstake_tokens(account.clone(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CannotUnstake { .. }));

        env.clock.advance_secs(1);
        env.staking.unstake_tokens(account.clone(), 0).await.unwrap();
        assert_eq!(env.staking.stake_count(account).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unstake_unknown_slot_fails() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");

        let err = env
            .staking
            .unstake_tokens(account, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StakeNotFound { slot: 0 }));
    }

    #[tokio::test]
    async fn test_release_compacts_by_swap_remove() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        for amount in [100, 200, 300] {
            env.staking
                .stake_tokens(account.clone(), amount, DAY)
                .await
                .unwrap();
        }

        env.clock.advance_secs(DAY as i64 + 1);
        env.staking.unstake_tokens(account.clone(), 0).await.unwrap();

        // The record formerly at the last slot is now readable at slot 0.
        let relabeled = env.staking.get_stake(account.clone(), 0).await.unwrap();
        assert_eq!(relabeled.amount, 300);

        assert_eq!(env.staking.stake_count(account.clone()).await.unwrap(), 2);
        assert_eq!(env.staking.total_staked(account).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn test_tier_enrollment_and_mint() {
        let env = create_test_env().await;
        let issuer_x = register_issuer(&env, "issuer-x");
        let issuer_y = register_issuer(&env, "issuer-y");

        env.staking
            .add_staking_tier(admin(), 30 * DAY, IssuerAddress::new("issuer-x"))
            .await
            .unwrap();
        env.staking
            .add_staking_tier(admin(), 90 * DAY, IssuerAddress::new("issuer-y"))
            .await
            .unwrap();

        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        // A 60-day lock qualifies for the 30-day tier only.
        env.staking
            .stake_tokens(account.clone(), 500, 60 * DAY)
            .await
            .unwrap();

        assert_eq!(issuer_x.balance_of(&account), 500);
        assert_eq!(issuer_y.balance_of(&account), 0);
        assert_eq!(env.staking.total_staked(account.clone()).await.unwrap(), 500);

        let record = env.staking.get_stake(account, 0).await.unwrap();
        assert_eq!(record.enrolled_issuers, vec![IssuerAddress::new("issuer-x")]);
    }

    #[tokio::test]
    async fn test_round_trip_mint_equals_burn() {
        let env = create_test_env().await;
        let issuer_x = register_issuer(&env, "issuer-x");

        env.staking
            .add_staking_tier(admin(), DAY, IssuerAddress::new("issuer-x"))
            .await
            .unwrap();

        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        env.staking
            .stake_tokens(account.clone(), 400, 2 * DAY)
            .await
            .unwrap();
        assert_eq!(issuer_x.balance_of(&account), 400);

        env.clock.advance_secs(2 * DAY as i64 + 1);
        env.staking.unstake_tokens(account.clone(), 0).await.unwrap();

        assert_eq!(issuer_x.balance_of(&account), 0);
        assert_eq!(env.staking.total_staked(account).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_burn_failure_aborts_release() {
        let env = create_test_env().await;
        let issuer_x = register_issuer(&env, "issuer-x");

        env.staking
            .add_staking_tier(admin(), DAY, IssuerAddress::new("issuer-x"))
            .await
            .unwrap();

        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);
        env.staking
            .stake_tokens(account.clone(), 400, 2 * DAY)
            .await
            .unwrap();

        // Drain the derivative balance behind the ledger's back.
        issuer_x.burn(&account, 400).unwrap();

        env.clock.advance_secs(2 * DAY as i64 + 1);
        let err = env
            .staking
            .unstake_tokens(account.clone(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Issuer(_)));

        // The release aborted; the record is still live.
        assert_eq!(env.staking.stake_count(account.clone()).await.unwrap(), 1);
        assert_eq!(env.staking.total_staked(account).await.unwrap(), 400);
    }

    #[tokio::test]
    async fn test_tier_management_requires_authority() {
        let env = create_test_env().await;
        let outsider = AccountId::new("outsider");

        let err = env
            .staking
            .add_staking_tier(outsider.clone(), DAY, IssuerAddress::new("issuer-x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        let err = env
            .staking
            .remove_staking_tier(outsider, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized(_)));

        assert!(env.staking.tiers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tier_removal_keeps_captured_issuers_burnable() {
        let env = create_test_env().await;
        let issuer_x = register_issuer(&env, "issuer-x");

        env.staking
            .add_staking_tier(admin(), DAY, IssuerAddress::new("issuer-x"))
            .await
            .unwrap();

        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);
        env.staking
            .stake_tokens(account.clone(), 250, 2 * DAY)
            .await
            .unwrap();

        // Removing the tier does not rewrite existing records; the burn on
        // release still targets the captured issuer.
        env.staking.remove_staking_tier(admin(), 0).await.unwrap();
        assert!(env.staking.tiers().await.unwrap().is_empty());

        env.clock.advance_secs(2 * DAY as i64 + 1);
        env.staking.unstake_tokens(account.clone(), 0).await.unwrap();
        assert_eq!(issuer_x.balance_of(&account), 0);
    }

    #[tokio::test]
    async fn test_metrics_advance_on_operations() {
        let env = create_test_env().await;
        let account = AccountId::new("acct-1");
        env.balances.set_balance(account.clone(), 1000);

        env.staking
            .stake_tokens(account.clone(), 100, DAY)
            .await
            .unwrap();
        env.clock.advance_secs(DAY as i64 + 1);
        env.staking.unstake_tokens(account, 0).await.unwrap();

        let metrics = env.staking.metrics();
        assert_eq!(metrics.stakes_created.get(), 1);
        assert_eq!(metrics.stakes_released.get(), 1);
    }
}
