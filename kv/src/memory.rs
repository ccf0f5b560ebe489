//! In-memory key-value store implementation for testing.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::{BatchOp, KVError, KVResult, KVStore};

/// An in-memory key-value store backed by a BTreeMap.
///
/// Clones share the same underlying map, which lets tests reopen a cache
/// against "the same disk".
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> KVResult<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.data.lock().map_err(|e| KVError::Storage(e.to_string()))
    }
}

impl KVStore for MemoryStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let data = self.lock()?;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn apply(&self, ops: &[BatchOp]) -> KVResult<()> {
        let mut data = self.lock()?;
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    data.insert(key.clone(), value.clone());
                }
                BatchOp::Delete(key) => {
                    data.remove(key);
                }
            }
        }
        Ok(())
    }
}
