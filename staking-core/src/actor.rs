//! Actor-based concurrency for the staking ledger
//!
//! All mutating operations execute on a single actor task, giving the
//! serialized, all-or-nothing transaction model the ledger requires: no two
//! operations ever interleave their effects, and every validation failure
//! aborts before the operation's write batch commits. Issuer services hold
//! no handle back into the actor, so a mint or burn call cannot re-enter
//! the ledger mid-operation.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              StakingHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │             StakingActor (Single Task)                │
//! │   validate → commit WriteBatch → issuer mint/burn    │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//!               Storage (RocksDB)
//! ```

use crate::metrics::Metrics;
use crate::services::Services;
use crate::tiers::{matching_issuers, TierDefinition};
use crate::types::{AccountId, AccountPosition, StakeRecord};
use crate::{Error, Result, Storage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the staking actor
pub enum StakingMessage {
    /// Create a time-locked stake
    Stake {
        /// Owning account
        account: AccountId,
        /// Amount in raw token units
        amount: u128,
        /// Lock duration in seconds
        duration_secs: u64,
        /// Response channel carrying the new slot index
        response: oneshot::Sender<Result<u32>>,
    },

    /// Release a matured stake
    Unstake {
        /// Owning account
        account: AccountId,
        /// Slot index of the record to release
        slot: u32,
        /// Response channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Append a tier to the registry
    AddTier {
        /// Account requesting the change
        caller: AccountId,
        /// Tier to append
        tier: TierDefinition,
        /// Response channel carrying the new tier index
        response: oneshot::Sender<Result<u32>>,
    },

    /// Swap-remove a tier from the registry
    RemoveTier {
        /// Account requesting the change
        caller: AccountId,
        /// Registry index to remove
        index: u32,
        /// Response channel carrying the removed tier
        response: oneshot::Sender<Result<TierDefinition>>,
    },

    /// Read a stake record
    GetStake {
        /// Owning account
        account: AccountId,
        /// Slot index
        slot: u32,
        /// Response channel
        response: oneshot::Sender<Result<StakeRecord>>,
    },

    /// Read an account's counters
    GetPosition {
        /// Account to read
        account: AccountId,
        /// Response channel
        response: oneshot::Sender<Result<AccountPosition>>,
    },

    /// Enumerate the tier registry
    ListTiers {
        /// Response channel
        response: oneshot::Sender<Result<Vec<TierDefinition>>>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that processes staking messages
pub struct StakingActor {
    /// Storage backend
    storage: Arc<Storage>,

    /// External collaborator services
    services: Services,

    /// Metrics collector
    metrics: Metrics,

    /// Per-account stake record cap
    max_stakes_per_address: u32,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<StakingMessage>,
}

/// Maturity timestamp for a lock starting at `now`
///
/// Locks beyond the representable time range clamp to the maximum instant
/// and never mature.
fn maturity_for(now: DateTime<Utc>, duration_secs: u64) -> DateTime<Utc> {
    i64::try_from(duration_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .and_then(|lock| now.checked_add_signed(lock))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl StakingActor {
    /// Create new actor
    pub fn new(
        storage: Arc<Storage>,
        services: Services,
        metrics: Metrics,
        max_stakes_per_address: u32,
        mailbox: mpsc::Receiver<StakingMessage>,
    ) -> Self {
        Self {
            storage,
            services,
            metrics,
            max_stakes_per_address,
            mailbox,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            match msg {
                StakingMessage::Shutdown => break,
                _ => self.handle_message(msg),
            }
        }

        tracing::info!("Staking actor stopped");
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: StakingMessage) {
        match msg {
            StakingMessage::Stake {
                account,
                amount,
                duration_secs,
                response,
            } => {
                let started = Instant::now();
                let result = self.execute_stake(&account, amount, duration_secs);
                self.metrics.record_op_duration(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }

            StakingMessage::Unstake {
                account,
                slot,
                response,
            } => {
                let started = Instant::now();
                let result = self.execute_unstake(&account, slot);
                self.metrics.record_op_duration(started.elapsed().as_secs_f64());
                let _ = response.send(result);
            }

            StakingMessage::AddTier {
                caller,
                tier,
                response,
            } => {
                let _ = response.send(self.execute_add_tier(&caller, tier));
            }

            StakingMessage::RemoveTier {
                caller,
                index,
                response,
            } => {
                let _ = response.send(self.execute_remove_tier(&caller, index));
            }

            StakingMessage::GetStake {
                account,
                slot,
                response,
            } => {
                let _ = response.send(self.storage.get_stake(&account, slot));
            }

            StakingMessage::GetPosition { account, response } => {
                let _ = response.send(self.storage.get_position(&account));
            }

            StakingMessage::ListTiers { response } => {
                let _ = response.send(self.storage.list_tiers());
            }

            StakingMessage::Shutdown => {
                // Handled in main loop
            }
        }
    }

    /// Create a stake: validate, commit, then mint derivative balances
    fn execute_stake(
        &self,
        account: &AccountId,
        amount: u128,
        duration_secs: u64,
    ) -> Result<u32> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let position = self.storage.get_position(account)?;

        let candidate = position.total_staked.saturating_add(amount);
        let available = self.services.balances.balance_of(account)?;
        if candidate > available {
            return Err(Error::StakeTooLarge {
                requested: candidate,
                available,
            });
        }

        if position.stake_count >= self.max_stakes_per_address {
            return Err(Error::TooManyStakes {
                max: self.max_stakes_per_address,
            });
        }

        let now = self.services.clock.now();
        let maturity = maturity_for(now, duration_secs);

        // Registry snapshot at creation time; the record captures issuer
        // addresses by value, not live registry references.
        let tiers = self.storage.list_tiers()?;
        let enrolled = matching_issuers(&tiers, duration_secs);

        let record = StakeRecord {
            amount,
            staked_at: now,
            maturity,
            enrolled_issuers: enrolled,
        };

        let slot = self.storage.insert_stake(account, &record)?;

        // Ledger state commits before issuer calls run. A failed mint
        // surfaces to the caller; the committed stake stays.
        for address in &record.enrolled_issuers {
            self.services.issuers.resolve(address)?.mint(account, amount)?;
        }

        self.metrics.record_stake_created(record.enrolled_issuers.len());

        tracing::info!(
            account = %account,
            slot,
            amount,
            maturity = %maturity,
            enrolled_tiers = record.enrolled_issuers.len(),
            "Stake created"
        );

        Ok(slot)
    }

    /// Release a stake: validate, burn derivative balances, then compact
    fn execute_unstake(&self, account: &AccountId, slot: u32) -> Result<()> {
        // Existence before maturity: never read past the live range.
        let record = self.storage.get_stake(account, slot)?;

        let now = self.services.clock.now();
        if !record.is_matured(now) {
            return Err(Error::CannotUnstake {
                maturity: record.maturity,
            });
        }

        // Every derivative balance must be reclaimed before the record
        // disappears; the first burn failure aborts the release with the
        // ledger untouched.
        for address in &record.enrolled_issuers {
            self.services
                .issuers
                .resolve(address)?
                .burn(account, record.amount)?;
        }

        let removed = self.storage.remove_stake(account, slot)?;

        self.metrics.record_stake_released(removed.enrolled_issuers.len());

        tracing::info!(
            account = %account,
            slot,
            amount = removed.amount,
            "Stake released"
        );

        Ok(())
    }

    /// Append a tier, gated on tier-management authority
    fn execute_add_tier(&self, caller: &AccountId, tier: TierDefinition) -> Result<u32> {
        if !self.services.authority.can_manage_tiers(caller) {
            return Err(Error::Unauthorized(format!(
                "{} may not manage tiers",
                caller
            )));
        }

        let index = self.storage.append_tier(&tier)?;
        self.metrics.set_tiers_registered(self.storage.tier_count()?);

        Ok(index)
    }

    /// Swap-remove a tier, gated on tier-management authority
    fn execute_remove_tier(&self, caller: &AccountId, index: u32) -> Result<TierDefinition> {
        if !self.services.authority.can_manage_tiers(caller) {
            return Err(Error::Unauthorized(format!(
                "{} may not manage tiers",
                caller
            )));
        }

        let removed = self.storage.remove_tier(index)?;
        self.metrics.set_tiers_registered(self.storage.tier_count()?);

        Ok(removed)
    }
}

/// Handle for sending messages to the actor
#[derive(Clone)]
pub struct StakingHandle {
    sender: mpsc::Sender<StakingMessage>,
}

impl StakingHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<StakingMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        msg: StakingMessage,
        rx: oneshot::Receiver<Result<T>>,
    ) -> Result<T> {
        self.sender
            .send(msg)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))?
    }

    /// Create a stake, returning its slot index
    pub async fn stake(
        &self,
        account: AccountId,
        amount: u128,
        duration_secs: u64,
    ) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.request(
            StakingMessage::Stake {
                account,
                amount,
                duration_secs,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Release the stake at `slot`
    pub async fn unstake(&self, account: AccountId, slot: u32) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request(
            StakingMessage::Unstake {
                account,
                slot,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Append a tier to the registry
    pub async fn add_tier(&self, caller: AccountId, tier: TierDefinition) -> Result<u32> {
        let (tx, rx) = oneshot::channel();
        self.request(
            StakingMessage::AddTier {
                caller,
                tier,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Swap-remove the tier at `index`
    pub async fn remove_tier(&self, caller: AccountId, index: u32) -> Result<TierDefinition> {
        let (tx, rx) = oneshot::channel();
        self.request(
            StakingMessage::RemoveTier {
                caller,
                index,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Read the stake record at `slot`
    pub async fn get_stake(&self, account: AccountId, slot: u32) -> Result<StakeRecord> {
        let (tx, rx) = oneshot::channel();
        self.request(
            StakingMessage::GetStake {
                account,
                slot,
                response: tx,
            },
            rx,
        )
        .await
    }

    /// Read an account's counters
    pub async fn get_position(&self, account: AccountId) -> Result<AccountPosition> {
        let (tx, rx) = oneshot::channel();
        self.request(StakingMessage::GetPosition { account, response: tx }, rx)
            .await
    }

    /// Enumerate the tier registry
    pub async fn list_tiers(&self) -> Result<Vec<TierDefinition>> {
        let (tx, rx) = oneshot::channel();
        self.request(StakingMessage::ListTiers { response: tx }, rx)
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(StakingMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the staking actor
pub fn spawn_staking_actor(
    storage: Arc<Storage>,
    services: Services,
    metrics: Metrics,
    max_stakes_per_address: u32,
) -> StakingHandle {
    let (tx, rx) = mpsc::channel(1000); // Bounded channel for backpressure
    let actor = StakingActor::new(storage, services, metrics, max_stakes_per_address, rx);

    tokio::spawn(actor.run());

    StakingHandle::new(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_maturity_clamps_on_overflow() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();

        assert_eq!(
            maturity_for(now, 60),
            now + chrono::Duration::seconds(60)
        );
        assert_eq!(maturity_for(now, u64::MAX), DateTime::<Utc>::MAX_UTC);
    }
}
