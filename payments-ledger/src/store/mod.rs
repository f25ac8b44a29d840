//! Entity persistence
//!
//! Records are bincode values under the flat keys built in [`crate::ids`].
//! Handlers never touch a backend directly: every event runs inside a
//! [`UnitOfWork`] that reads through to the backend and buffers its own
//! writes. A unit that fails is dropped, so a skipped event leaves no trace.

mod memory;
mod rocks;

pub use memory::MemoryStore;
pub use rocks::RocksStore;

use crate::{
    error::Result,
    ids::{EntityKey, EntityKind},
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// A persisted record with an immutable id
pub trait Entity: Serialize + DeserializeOwned {
    /// Key discriminant
    const KIND: EntityKind;

    /// Storage key derived from the id fields
    fn key(&self) -> EntityKey;
}

/// Key-value backend
pub trait EntityStore: Send + Sync {
    /// Point lookup
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Every entry whose key starts with `prefix`, in ascending key order
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply all writes atomically
    fn write(&self, writes: &WriteSet) -> Result<()>;
}

/// Encode a record
pub fn encode<E: Entity>(entity: &E) -> Result<Vec<u8>> {
    Ok(bincode::serialize(entity)?)
}

/// Decode a record
pub fn decode<E: Entity>(bytes: &[u8]) -> Result<E> {
    Ok(bincode::deserialize(bytes)?)
}

/// Buffered writes of one or more events
#[derive(Debug, Default, Clone)]
pub struct WriteSet {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    events: usize,
}

impl WriteSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite an encoded record
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.entries.insert(key, value);
    }

    /// Buffered value for `key`
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Buffered entries under `prefix`, ascending
    pub fn scan_prefix<'a>(&'a self, prefix: &'a [u8]) -> impl Iterator<Item = (&'a [u8], &'a [u8])> {
        self.entries
            .range(prefix.to_vec()..)
            .take_while(move |(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }

    /// Fold `other` into this set; later writes win
    pub fn merge(&mut self, other: WriteSet) {
        self.entries.extend(other.entries);
        self.events += other.events;
    }

    /// Count one applied event against this set
    pub fn record_event(&mut self) {
        self.events += 1;
    }

    /// Events folded into this set
    pub fn events(&self) -> usize {
        self.events
    }

    /// Number of distinct keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ascending by key
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_slice()))
    }
}

/// Read-through overlay for the writes of a single event
///
/// Lookups consult, in order: this unit's writes, the staged (committed but
/// unflushed) writes of earlier events, and the backend.
pub struct UnitOfWork<'a> {
    store: &'a dyn EntityStore,
    staged: &'a WriteSet,
    writes: WriteSet,
}

impl<'a> UnitOfWork<'a> {
    /// Open a unit over `store` and the not yet flushed `staged` writes
    pub fn new(store: &'a dyn EntityStore, staged: &'a WriteSet) -> Self {
        Self {
            store,
            staged,
            writes: WriteSet::new(),
        }
    }

    fn get_raw(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        if let Some(value) = self.writes.get(key) {
            return Ok(Some(value.to_vec()));
        }
        if let Some(value) = self.staged.get(key) {
            return Ok(Some(value.to_vec()));
        }
        self.store.get(key)
    }

    /// Load a record if present
    pub fn load<E: Entity>(&self, key: &EntityKey) -> Result<Option<E>> {
        self.get_raw(key.as_bytes())?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    /// Load a record that must exist
    pub fn require<E: Entity>(&self, key: &EntityKey, id: impl Display) -> Result<E> {
        self.load(key)?
            .ok_or_else(|| crate::Error::not_found(E::KIND.name(), id))
    }

    /// Load a record, or build it with `create`. The flag is true when the
    /// record did not exist. Nothing is written until [`save`](Self::save).
    pub fn load_or_create<E: Entity>(
        &self,
        key: &EntityKey,
        create: impl FnOnce() -> E,
    ) -> Result<(E, bool)> {
        Ok(match self.load(key)? {
            Some(entity) => (entity, false),
            None => (create(), true),
        })
    }

    /// True when a record exists under `key`
    pub fn exists(&self, key: &EntityKey) -> Result<bool> {
        Ok(self.get_raw(key.as_bytes())?.is_some())
    }

    /// Buffer a record
    pub fn save<E: Entity>(&mut self, entity: &E) -> Result<()> {
        let value = encode(entity)?;
        self.writes.put(entity.key().into_bytes(), value);
        Ok(())
    }

    /// All records under `prefix`, ascending by key, with buffered writes
    /// taking precedence over stored ones
    pub fn scan<E: Entity>(&self, prefix: &EntityKey) -> Result<Vec<E>> {
        let prefix = prefix.as_bytes();
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.store.scan_prefix(prefix)?.into_iter().collect();

        for (key, value) in self.staged.scan_prefix(prefix).chain(self.writes.scan_prefix(prefix)) {
            merged.insert(key.to_vec(), value.to_vec());
        }

        merged.values().map(|bytes| decode(bytes)).collect()
    }

    /// Buffered writes
    pub fn writes(&self) -> &WriteSet {
        &self.writes
    }

    /// Finish the unit
    pub fn into_writes(self) -> WriteSet {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Account;
    use crate::ids;
    use crate::types::{Address, U256};

    #[test]
    fn test_unit_reads_own_writes() {
        let store = MemoryStore::new();
        let staged = WriteSet::new();
        let mut uow = UnitOfWork::new(&store, &staged);
        let address = Address::repeat_byte(1);

        let (mut account, created) = uow
            .load_or_create(&ids::account_key(&address), || Account::new(address))
            .unwrap();
        assert!(created);

        account.total_rails = U256::from(3);
        uow.save(&account).unwrap();

        let loaded: Account = uow.require(&ids::account_key(&address), address).unwrap();
        assert_eq!(loaded.total_rails, U256::from(3));

        // Nothing reaches the backend until the writes are applied
        assert!(store.get(ids::account_key(&address).as_bytes()).unwrap().is_none());
    }

    #[test]
    fn test_unit_sees_staged_writes() {
        let store = MemoryStore::new();
        let address = Address::repeat_byte(2);

        let mut staged = WriteSet::new();
        {
            let mut first = UnitOfWork::new(&store, &staged);
            first.save(&Account::new(address)).unwrap();
            let writes = first.into_writes();
            staged.merge(writes);
        }

        let uow = UnitOfWork::new(&store, &staged);
        assert!(uow.exists(&ids::account_key(&address)).unwrap());
    }

    #[test]
    fn test_require_missing_is_reference_not_found() {
        let store = MemoryStore::new();
        let staged = WriteSet::new();
        let uow = UnitOfWork::new(&store, &staged);

        let err = uow
            .require::<Account>(&ids::account_key(&Address::zero()), "0x0")
            .unwrap_err();
        assert!(err.is_skippable());
    }

    #[test]
    fn test_scan_prefers_newest_write() {
        let store = MemoryStore::new();
        let address = Address::repeat_byte(3);

        let mut stored = WriteSet::new();
        stored.put(
            ids::account_key(&address).into_bytes(),
            encode(&Account::new(address)).unwrap(),
        );
        store.write(&stored).unwrap();

        let staged = WriteSet::new();
        let mut uow = UnitOfWork::new(&store, &staged);
        let mut account = Account::new(address);
        account.total_tokens = U256::one();
        uow.save(&account).unwrap();

        let scanned: Vec<Account> = uow.scan(&EntityKey::new(EntityKind::Account)).unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].total_tokens, U256::one());
    }

    #[test]
    fn test_write_set_merge_counts_events() {
        let mut batch = WriteSet::new();
        let mut unit = WriteSet::new();
        unit.put(vec![1], vec![1]);
        unit.record_event();
        batch.merge(unit);

        let mut unit = WriteSet::new();
        unit.put(vec![1], vec![2]);
        unit.record_event();
        batch.merge(unit);

        assert_eq!(batch.events(), 2);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(&[1]), Some(&[2u8][..]));
    }
}
