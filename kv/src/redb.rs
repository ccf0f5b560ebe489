//! Redb-based persistent key-value store implementation.

use std::path::{Path, PathBuf};

use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use tracing::warn;

use crate::{BatchOp, KVError, KVResult, KVStore};

const TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("kv");

fn storage<E: std::fmt::Display>(e: E) -> KVError {
    KVError::Storage(e.to_string())
}

/// A persistent key-value store backed by redb.
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let db = Database::create(path).map_err(storage)?;
        Self::init(db)
    }

    /// Open the store, starting over with an empty one if the existing file
    /// cannot be opened.
    ///
    /// The unreadable file is renamed to `<name>.corrupt` next to the
    /// original, or removed if the rename fails. A file held open by another
    /// process is left alone.
    pub fn open_or_reset<P: AsRef<Path>>(path: P) -> KVResult<Self> {
        let path = path.as_ref();
        match Database::create(path) {
            Ok(db) => Self::init(db),
            Err(e @ DatabaseError::DatabaseAlreadyOpen) => Err(storage(e)),
            Err(e) if path.is_file() => {
                let aside = corrupt_path(path);
                warn!(
                    "kv: cannot open {} ({e}), moving it to {} and starting empty",
                    path.display(),
                    aside.display()
                );
                if std::fs::rename(path, &aside).is_err() {
                    std::fs::remove_file(path).map_err(storage)?;
                }
                Self::open(path)
            }
            Err(e) => Err(storage(e)),
        }
    }

    fn init(db: Database) -> KVResult<Self> {
        // Create the table if it doesn't exist
        let tx = db.begin_write().map_err(storage)?;
        {
            let _ = tx.open_table(TABLE).map_err(storage)?;
        }
        tx.commit().map_err(storage)?;

        Ok(Self { db })
    }
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".corrupt");
    path.with_file_name(name)
}

impl KVStore for RedbStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;

        match table.get(key).map_err(storage)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.apply(&[BatchOp::Put(key.to_string(), value.to_vec())])
    }

    fn delete(&self, key: &str) -> KVResult<()> {
        self.apply(&[BatchOp::Delete(key.to_string())])
    }

    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        let tx = self.db.begin_read().map_err(storage)?;
        let table = tx.open_table(TABLE).map_err(storage)?;

        let mut results = Vec::new();
        for item in table.range(prefix..).map_err(storage)? {
            let (key, value) = item.map_err(storage)?;
            let key_str = key.value();
            if !key_str.starts_with(prefix) {
                break;
            }
            results.push((key_str.to_string(), value.value().to_vec()));
        }
        Ok(results)
    }

    fn apply(&self, ops: &[BatchOp]) -> KVResult<()> {
        let tx = self.db.begin_write().map_err(storage)?;
        {
            let mut table = tx.open_table(TABLE).map_err(storage)?;
            for op in ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_str(), value.as_slice()).map_err(storage)?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_str()).map_err(storage)?;
                    }
                }
            }
        }
        tx.commit().map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_redb_basic() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.set("key1", b"value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some(b"value1".to_vec()));

        store.delete("key1").unwrap();
        assert_eq!(store.get("key1").unwrap(), None);
    }

    #[test]
    fn test_redb_scan() {
        let dir = tempdir().unwrap();
        let store = RedbStore::open(dir.path().join("test.redb")).unwrap();

        store.set("prefix:a", b"1").unwrap();
        store.set("prefix:b", b"2").unwrap();
        store.set("other:c", b"3").unwrap();

        let results = store.scan("prefix:").unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "prefix:a");
    }

    #[test]
    fn test_redb_reopen_keeps_batch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store
                .apply(&[
                    BatchOp::Put("a".into(), b"1".to_vec()),
                    BatchOp::Put("b".into(), b"2".to_vec()),
                    BatchOp::Delete("a".into()),
                ])
                .unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_redb_garbage_file_is_reset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        std::fs::write(&path, b"this is not a database").unwrap();
        assert!(RedbStore::open(&path).is_err());

        let store = RedbStore::open_or_reset(&path).unwrap();
        assert_eq!(store.scan("").unwrap(), vec![]);
        store.set("k", b"v").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(
            std::fs::read(dir.path().join("cache.redb.corrupt")).unwrap(),
            b"this is not a database".to_vec()
        );
    }

    #[test]
    fn test_redb_open_or_reset_leaves_locked_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        let held = RedbStore::open(&path).unwrap();
        held.set("k", b"v").unwrap();

        assert!(RedbStore::open_or_reset(&path).is_err());
        assert!(!dir.path().join("cache.redb.corrupt").exists());
        assert_eq!(held.get("k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn test_redb_open_or_reset_keeps_good_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        RedbStore::open(&path).unwrap().set("k", b"v").unwrap();

        let store = RedbStore::open_or_reset(&path).unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"v".to_vec()));
        assert!(!dir.path().join("cache.redb.corrupt").exists());
    }
}
