//! Storage layer using RocksDB
//!
//! The per-account record table emulates a resizable array on top of
//! key-value storage: records live at keys `account || '|' || slot` for
//! slots `[0, stake_count)`, with the live length and the total-staked
//! accumulator kept in the account's position row. Removal is swap-remove:
//! the last live record overwrites the removed slot and the length shrinks
//! by one, so slot indices are not stable identifiers. The tier registry
//! uses the same arena shape with a single global length key.
//!
//! # Column Families
//!
//! - `stakes` - Stake records (key: account || '|' || slot u32 BE)
//! - `positions` - Per-account counters (key: account)
//! - `tiers` - Tier registry rows (key: tier index u32 BE)
//! - `meta` - Registry length and other singletons

use crate::{
    error::{Error, Result},
    tiers::TierDefinition,
    types::{AccountId, AccountPosition, StakeRecord},
    Config,
};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_STAKES: &str = "stakes";
const CF_POSITIONS: &str = "positions";
const CF_TIERS: &str = "tiers";
const CF_META: &str = "meta";

/// Meta key holding the live length of the tier registry
const META_TIER_COUNT: &[u8] = b"tier_count";

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_target_file_size_base(config.rocksdb.target_file_size_mb * 1024 * 1024);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);
        db_opts.set_level_zero_file_num_compaction_trigger(
            config.rocksdb.level0_file_num_compaction_trigger,
        );

        // Universal compaction for write-heavy workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        // Column family descriptors
        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_STAKES, Self::cf_options_stakes()),
            ColumnFamilyDescriptor::new(CF_POSITIONS, Self::cf_options_positions()),
            ColumnFamilyDescriptor::new(CF_TIERS, Self::cf_options_tiers()),
            ColumnFamilyDescriptor::new(CF_META, Self::cf_options_meta()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!("Opened RocksDB at {:?}", path);

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_stakes() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups by composite key benefit from bloom filters
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false); // 10 bits per key
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_options_positions() -> Options {
        let mut opts = Options::default();
        // Positions are read on every operation, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_tiers() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_meta() -> Options {
        Options::default()
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Key helpers

    fn stake_key(account: &AccountId, slot: u32) -> Vec<u8> {
        let mut key = account.as_str().as_bytes().to_vec();
        key.push(b'|'); // Separator
        key.extend_from_slice(&slot.to_be_bytes());
        key
    }

    fn tier_key(index: u32) -> [u8; 4] {
        index.to_be_bytes()
    }

    // Position operations

    /// Get per-account counters (zeroed if the account has never staked)
    pub fn get_position(&self, account: &AccountId) -> Result<AccountPosition> {
        let cf = self.cf_handle(CF_POSITIONS)?;

        match self.db.get_cf(cf, account.as_str().as_bytes())? {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(AccountPosition::default()),
        }
    }

    // Stake record operations

    /// Get the stake record at `slot`
    ///
    /// The slot must be within the account's live range `[0, stake_count)`.
    pub fn get_stake(&self, account: &AccountId, slot: u32) -> Result<StakeRecord> {
        let position = self.get_position(account)?;
        if slot >= position.stake_count {
            return Err(Error::StakeNotFound { slot });
        }

        self.read_stake(account, slot)
    }

    /// Read a record without the live-range check
    ///
    /// A missing record inside the live range means the table and the
    /// position row disagree, which is corruption, not a caller error.
    fn read_stake(&self, account: &AccountId, slot: u32) -> Result<StakeRecord> {
        let cf = self.cf_handle(CF_STAKES)?;
        let value = self
            .db
            .get_cf(cf, Self::stake_key(account, slot))?
            .ok_or_else(|| {
                Error::Storage(format!("missing stake record {}[{}]", account, slot))
            })?;

        Ok(bincode::deserialize(&value)?)
    }

    /// Append a stake record at the account's next free slot (atomic)
    ///
    /// Writes the record at slot `stake_count`, increments the count, and
    /// adds the record's amount to `total_staked`, all in one write batch.
    /// Returns the new slot index. The caller enforces the per-account cap
    /// and the solvency invariant before committing.
    pub fn insert_stake(&self, account: &AccountId, record: &StakeRecord) -> Result<u32> {
        let mut position = self.get_position(account)?;
        let slot = position.stake_count;

        position.stake_count += 1;
        position.total_staked = position.total_staked.saturating_add(record.amount);

        let mut batch = WriteBatch::default();

        let cf_stakes = self.cf_handle(CF_STAKES)?;
        batch.put_cf(
            cf_stakes,
            Self::stake_key(account, slot),
            bincode::serialize(record)?,
        );

        let cf_positions = self.cf_handle(CF_POSITIONS)?;
        batch.put_cf(
            cf_positions,
            account.as_str().as_bytes(),
            bincode::serialize(&position)?,
        );

        self.db.write(batch)?;

        tracing::debug!(
            account = %account,
            slot,
            amount = record.amount,
            total_staked = position.total_staked,
            "Stake record inserted"
        );

        Ok(slot)
    }

    /// Remove the stake record at `slot` via swap-remove (atomic)
    ///
    /// If `slot` is not the last live slot, the record at the last slot is
    /// copied into `slot` before the table shrinks, so the caller must not
    /// assume slot indices are stable. Subtracts the removed record's
    /// amount from `total_staked`. Returns the removed record.
    pub fn remove_stake(&self, account: &AccountId, slot: u32) -> Result<StakeRecord> {
        let mut position = self.get_position(account)?;
        if slot >= position.stake_count {
            return Err(Error::StakeNotFound { slot });
        }

        let removed = self.read_stake(account, slot)?;
        let last = position.stake_count - 1;

        position.stake_count = last;
        position.total_staked = position
            .total_staked
            .checked_sub(removed.amount)
            .ok_or_else(|| {
                Error::Storage(format!("total staked underflow for {}", account))
            })?;

        let mut batch = WriteBatch::default();
        let cf_stakes = self.cf_handle(CF_STAKES)?;

        if slot != last {
            let tail = self.read_stake(account, last)?;
            batch.put_cf(
                cf_stakes,
                Self::stake_key(account, slot),
                bincode::serialize(&tail)?,
            );
        }
        batch.delete_cf(cf_stakes, Self::stake_key(account, last));

        let cf_positions = self.cf_handle(CF_POSITIONS)?;
        batch.put_cf(
            cf_positions,
            account.as_str().as_bytes(),
            bincode::serialize(&position)?,
        );

        self.db.write(batch)?;

        tracing::debug!(
            account = %account,
            slot,
            amount = removed.amount,
            remaining = position.stake_count,
            "Stake record removed"
        );

        Ok(removed)
    }

    // Tier registry operations

    /// Live length of the tier registry
    pub fn tier_count(&self) -> Result<u32> {
        let cf = self.cf_handle(CF_META)?;

        match self.db.get_cf(cf, META_TIER_COUNT)? {
            Some(value) => {
                let bytes: [u8; 4] = value.as_slice().try_into().map_err(|_| {
                    Error::Storage("malformed tier count".to_string())
                })?;
                Ok(u32::from_be_bytes(bytes))
            }
            None => Ok(0),
        }
    }

    /// Get the tier at `index`
    pub fn get_tier(&self, index: u32) -> Result<TierDefinition> {
        let count = self.tier_count()?;
        if index >= count {
            return Err(Error::TierNotFound { index });
        }

        self.read_tier(index)
    }

    fn read_tier(&self, index: u32) -> Result<TierDefinition> {
        let cf = self.cf_handle(CF_TIERS)?;
        let value = self
            .db
            .get_cf(cf, Self::tier_key(index))?
            .ok_or_else(|| Error::Storage(format!("missing tier row {}", index)))?;

        Ok(bincode::deserialize(&value)?)
    }

    /// All tiers in registry order
    pub fn list_tiers(&self) -> Result<Vec<TierDefinition>> {
        let count = self.tier_count()?;
        let mut tiers = Vec::with_capacity(count as usize);
        for index in 0..count {
            tiers.push(self.read_tier(index)?);
        }
        Ok(tiers)
    }

    /// Append a tier to the registry (atomic), returning its index
    pub fn append_tier(&self, tier: &TierDefinition) -> Result<u32> {
        let count = self.tier_count()?;

        let mut batch = WriteBatch::default();

        let cf_tiers = self.cf_handle(CF_TIERS)?;
        batch.put_cf(cf_tiers, Self::tier_key(count), bincode::serialize(tier)?);

        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, META_TIER_COUNT, (count + 1).to_be_bytes());

        self.db.write(batch)?;

        tracing::info!(
            index = count,
            min_duration_secs = tier.min_duration_secs,
            issuer = %tier.issuer,
            "Tier appended"
        );

        Ok(count)
    }

    /// Remove the tier at `index` via swap-remove (atomic)
    ///
    /// Tier order is not stable across removals: if `index` is not the last
    /// row, the last row is relabeled into `index`. Returns the removed
    /// tier.
    pub fn remove_tier(&self, index: u32) -> Result<TierDefinition> {
        let count = self.tier_count()?;
        if index >= count {
            return Err(Error::TierNotFound { index });
        }

        let removed = self.read_tier(index)?;
        let last = count - 1;

        let mut batch = WriteBatch::default();
        let cf_tiers = self.cf_handle(CF_TIERS)?;

        if index != last {
            let tail = self.read_tier(last)?;
            batch.put_cf(cf_tiers, Self::tier_key(index), bincode::serialize(&tail)?);
        }
        batch.delete_cf(cf_tiers, Self::tier_key(last));

        let cf_meta = self.cf_handle(CF_META)?;
        batch.put_cf(cf_meta, META_TIER_COUNT, last.to_be_bytes());

        self.db.write(batch)?;

        tracing::info!(
            index,
            remaining = last,
            issuer = %removed.issuer,
            "Tier removed"
        );

        Ok(removed)
    }

    // Statistics

    /// Get storage statistics
    pub fn stats(&self) -> Result<StorageStats> {
        let cf_stakes = self.cf_handle(CF_STAKES)?;
        let cf_positions = self.cf_handle(CF_POSITIONS)?;

        Ok(StorageStats {
            total_stakes: self.approximate_count(cf_stakes)?,
            total_accounts: self.approximate_count(cf_positions)?,
            tier_count: self.tier_count()?,
        })
    }

    fn approximate_count(&self, cf: &ColumnFamily) -> Result<u64> {
        // RocksDB property for approximate count
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }

    /// Accounts with at least one position row, for operational inspection
    pub fn iter_accounts(&self) -> Result<Vec<(AccountId, AccountPosition)>> {
        let cf = self.cf_handle(CF_POSITIONS)?;

        let mut accounts = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let account = AccountId::new(String::from_utf8_lossy(&key).into_owned());
            let position: AccountPosition = bincode::deserialize(&value)?;
            accounts.push((account, position));
        }

        Ok(accounts)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").finish_non_exhaustive()
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Approximate number of live stake records
    pub total_stakes: u64,

    /// Approximate number of accounts with a position row
    pub total_accounts: u64,

    /// Live length of the tier registry
    pub tier_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::IssuerAddress;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_record(amount: u128) -> StakeRecord {
        let staked_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        StakeRecord {
            amount,
            staked_at,
            maturity: staked_at + chrono::Duration::days(30),
            enrolled_issuers: vec![IssuerAddress::new("issuer-x")],
        }
    }

    #[test]
    fn test_storage_open() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert_eq!(storage.tier_count().unwrap(), 0);
    }

    #[test]
    fn test_insert_and_get_stake() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let account = AccountId::new("acct-1");

        let slot = storage.insert_stake(&account, &test_record(100)).unwrap();
        assert_eq!(slot, 0);

        let position = storage.get_position(&account).unwrap();
        assert_eq!(position.stake_count, 1);
        assert_eq!(position.total_staked, 100);

        let record = storage.get_stake(&account, 0).unwrap();
        assert_eq!(record.amount, 100);
    }

    #[test]
    fn test_get_stake_out_of_range() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let account = AccountId::new("acct-1");

        storage.insert_stake(&account, &test_record(100)).unwrap();

        let err = storage.get_stake(&account, 1).unwrap_err();
        assert!(matches!(err, Error::StakeNotFound { slot: 1 }));
    }

    #[test]
    fn test_swap_remove_relabels_last_slot() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let account = AccountId::new("acct-1");

        for amount in [100, 200, 300] {
            storage.insert_stake(&account, &test_record(amount)).unwrap();
        }

        // Remove the middle record; the record at the last slot moves in.
        let removed = storage.remove_stake(&account, 1).unwrap();
        assert_eq!(removed.amount, 200);

        let position = storage.get_position(&account).unwrap();
        assert_eq!(position.stake_count, 2);
        assert_eq!(position.total_staked, 400);

        assert_eq!(storage.get_stake(&account, 0).unwrap().amount, 100);
        assert_eq!(storage.get_stake(&account, 1).unwrap().amount, 300);
        assert!(storage.get_stake(&account, 2).is_err());
    }

    #[test]
    fn test_remove_last_slot() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        let account = AccountId::new("acct-1");

        storage.insert_stake(&account, &test_record(100)).unwrap();
        storage.insert_stake(&account, &test_record(200)).unwrap();

        let removed = storage.remove_stake(&account, 1).unwrap();
        assert_eq!(removed.amount, 200);

        let position = storage.get_position(&account).unwrap();
        assert_eq!(position.stake_count, 1);
        assert_eq!(position.total_staked, 100);
        assert_eq!(storage.get_stake(&account, 0).unwrap().amount, 100);
    }

    #[test]
    fn test_positions_are_per_account() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .insert_stake(&AccountId::new("acct-1"), &test_record(100))
            .unwrap();

        let other = storage.get_position(&AccountId::new("acct-2")).unwrap();
        assert_eq!(other.stake_count, 0);
        assert_eq!(other.total_staked, 0);
    }

    #[test]
    fn test_tier_append_and_swap_remove() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        for (secs, issuer) in [(30, "issuer-x"), (60, "issuer-y"), (90, "issuer-z")] {
            let index = storage
                .append_tier(&TierDefinition {
                    min_duration_secs: secs,
                    issuer: IssuerAddress::new(issuer),
                })
                .unwrap();
            assert_eq!(index as u64, (secs - 30) / 30);
        }

        // Removing the first row relabels the last into its slot.
        let removed = storage.remove_tier(0).unwrap();
        assert_eq!(removed.issuer, IssuerAddress::new("issuer-x"));

        let tiers = storage.list_tiers().unwrap();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].issuer, IssuerAddress::new("issuer-z"));
        assert_eq!(tiers[1].issuer, IssuerAddress::new("issuer-y"));

        // A subsequent append lands after the shortened length.
        let index = storage
            .append_tier(&TierDefinition {
                min_duration_secs: 120,
                issuer: IssuerAddress::new("issuer-w"),
            })
            .unwrap();
        assert_eq!(index, 2);
    }

    #[test]
    fn test_get_tier_bounds_checked() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .append_tier(&TierDefinition {
                min_duration_secs: 30,
                issuer: IssuerAddress::new("issuer-x"),
            })
            .unwrap();

        assert_eq!(storage.get_tier(0).unwrap().min_duration_secs, 30);
        assert!(matches!(
            storage.get_tier(1).unwrap_err(),
            Error::TierNotFound { index: 1 }
        ));
    }

    #[test]
    fn test_iter_accounts_lists_positions() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        storage
            .insert_stake(&AccountId::new("acct-1"), &test_record(100))
            .unwrap();
        storage
            .insert_stake(&AccountId::new("acct-2"), &test_record(200))
            .unwrap();

        let accounts = storage.iter_accounts().unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts
            .iter()
            .any(|(account, position)| account.as_str() == "acct-2"
                && position.total_staked == 200));
    }

    #[test]
    fn test_remove_tier_out_of_range() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let err = storage.remove_tier(0).unwrap_err();
        assert!(matches!(err, Error::TierNotFound { index: 0 }));
    }

    #[test]
    fn test_state_survives_reopen() {
        let (config, _temp) = test_config();
        let account = AccountId::new("acct-1");

        {
            let storage = Storage::open(&config).unwrap();
            storage.insert_stake(&account, &test_record(100)).unwrap();
            storage
                .append_tier(&TierDefinition {
                    min_duration_secs: 30,
                    issuer: IssuerAddress::new("issuer-x"),
                })
                .unwrap();
            storage.close().unwrap();
        }

        let storage = Storage::open(&config).unwrap();
        let position = storage.get_position(&account).unwrap();
        assert_eq!(position.stake_count, 1);
        assert_eq!(position.total_staked, 100);
        assert_eq!(storage.tier_count().unwrap(), 1);
        assert_eq!(storage.get_stake(&account, 0).unwrap().amount, 100);
    }
}
