//! Staking ledger server binary

use staking_core::services::{
    InMemoryBalances, IssuerDirectory, Services, StaticTierAuthority, SystemClock,
};
use staking_core::{AccountId, Config, Staking};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting StakeVault Staking Server");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(service = %config.service_name, data_dir = ?config.data_dir, "Configuration loaded");

    // Collaborator services; production deployments replace these with
    // adapters to the real token, authorization, and issuer systems.
    let admin = std::env::var("STAKING_ADMIN_ACCOUNT").unwrap_or_else(|_| "admin".to_string());
    let services = Services {
        balances: Arc::new(InMemoryBalances::new()),
        authority: Arc::new(StaticTierAuthority::new([AccountId::new(admin)])),
        clock: Arc::new(SystemClock),
        issuers: IssuerDirectory::new(),
    };

    // Open staking ledger
    let staking = Staking::open(config, services).await?;
    let stats = staking.stats()?;
    tracing::info!(
        accounts = stats.total_accounts,
        stakes = stats.total_stakes,
        tiers = stats.tier_count,
        "Staking ledger opened"
    );

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down staking server");
    tracing::debug!("Final metrics:\n{}", staking.metrics().export());
    staking.shutdown().await?;
    Ok(())
}
