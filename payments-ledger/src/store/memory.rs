//! In-memory backend for tests and short replays

use super::{EntityStore, WriteSet};
use crate::error::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// Ordered map behind a read-write lock
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let entries = self.entries.read();
        Ok(entries
            .range(prefix.to_vec()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write(&self, writes: &WriteSet) -> Result<()> {
        let mut entries = self.entries.write();
        for (key, value) in writes.iter() {
            entries.insert(key.to_vec(), value.to_vec());
        }
        Ok(())
    }
}
