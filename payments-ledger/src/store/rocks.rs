//! RocksDB backend
//!
//! # Column Families
//!
//! - `entities` - Every ledger and metric record (key: see [`crate::ids`])

use super::{EntityStore, WriteSet};
use crate::{
    config::Config,
    error::{Error, Result},
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, Direction, IteratorMode, Options,
    WriteBatch, DB,
};
use std::sync::Arc;

/// Column family names
const CF_ENTITIES: &str = "entities";

/// Storage wrapper for RocksDB
pub struct RocksStore {
    db: Arc<DB>,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

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

        // Read-modify-write of a small hot set; level compaction keeps reads cheap
        db_opts.set_compaction_style(DBCompactionStyle::Level);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(
            CF_ENTITIES,
            Self::cf_options_entities(),
        )];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB entity store");

        Ok(Self { db: Arc::new(db) })
    }

    fn cf_options_entities() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Point lookups dominate
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(CF_ENTITIES)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_ENTITIES)))
    }

    /// Approximate number of stored records
    pub fn approximate_count(&self) -> Result<u64> {
        let cf = self.cf_handle()?;
        let count = self
            .db
            .property_int_value_cf(&cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(count)
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl EntityStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle()?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf_handle()?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key.to_vec(), value.to_vec()));
        }

        Ok(entries)
    }

    fn write(&self, writes: &WriteSet) -> Result<()> {
        let cf = self.cf_handle()?;
        let mut batch = WriteBatch::default();

        for (key, value) in writes.iter() {
            batch.put_cf(&cf, key, value);
        }

        // Atomic commit
        self.db.write(batch)?;

        tracing::debug!(
            records = writes.len(),
            events = writes.events(),
            "Write batch committed"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Account;
    use crate::ids;
    use crate::store::{decode, encode};
    use crate::types::{Address, U256};
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.write_buffer_size_mb = 4;
        config.rocksdb.enable_statistics = false;
        (config, temp_dir)
    }

    #[test]
    fn test_write_then_get() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();

        let address = Address::repeat_byte(0x42);
        let mut account = Account::new(address);
        account.total_rails = U256::from(2);

        let mut writes = WriteSet::new();
        writes.put(ids::account_key(&address).into_bytes(), encode(&account).unwrap());
        store.write(&writes).unwrap();

        let bytes = store.get(ids::account_key(&address).as_bytes()).unwrap().unwrap();
        let loaded: Account = decode(&bytes).unwrap();
        assert_eq!(loaded, account);
    }

    #[test]
    fn test_scan_prefix_in_key_order() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();

        let token = Address::repeat_byte(0x01);
        let other = Address::repeat_byte(0x02);
        let mut writes = WriteSet::new();
        writes.put(ids::token_metric_key(&token, 2 * 86_400).into_bytes(), vec![2]);
        writes.put(ids::token_metric_key(&token, 86_400).into_bytes(), vec![1]);
        writes.put(ids::token_metric_key(&other, 86_400).into_bytes(), vec![9]);
        store.write(&writes).unwrap();

        let scanned = store
            .scan_prefix(ids::token_metric_prefix(&token).as_bytes())
            .unwrap();
        let values: Vec<Vec<u8>> = scanned.into_iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let (config, _temp) = test_config();
        let key = ids::cursor_key();
        {
            let store = RocksStore::open(&config).unwrap();
            let mut writes = WriteSet::new();
            writes.put(key.as_bytes().to_vec(), vec![7]);
            store.write(&writes).unwrap();
            store.close().unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        assert_eq!(store.get(key.as_bytes()).unwrap(), Some(vec![7]));
    }
}
