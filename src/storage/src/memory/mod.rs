use std::collections::BTreeMap;
use std::ops::Bound;

use parking_lot::Mutex;

use crate::port::{BatchOp, PersistencePort, StorageError};

/// In-memory backend. The default when no data directory is configured, and
/// the workhorse of the test suites. Atomicity is trivial: every batch is
/// applied under one lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PersistencePort for MemoryStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.lock();
        let keys = entries
            .range::<String, _>((Bound::Included(prefix.to_string()), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect();
        Ok(keys)
    }

    fn atomic_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        for op in ops {
            match op {
                BatchOp::Put { key, bytes } => { entries.insert(key, bytes); }
                BatchOp::Delete { key }     => { entries.remove(&key); }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn put_get_delete() -> Result<()> {
        let store = MemoryStore::new();
        store.put("seq/g1", b"payload")?;
        assert_eq!(store.get("seq/g1")?, Some(b"payload".to_vec()));
        store.delete("seq/g1")?;
        assert_eq!(store.get("seq/g1")?, None);
        Ok(())
    }

    #[test]
    fn scan_respects_prefix() -> Result<()> {
        let store = MemoryStore::new();
        store.put("edge/a/b", b"1")?;
        store.put("edge/a/c", b"2")?;
        store.put("seq/a", b"3")?;
        assert_eq!(store.scan("edge/")?, vec!["edge/a/b".to_string(), "edge/a/c".to_string()]);
        assert_eq!(store.scan("meta/")?, Vec::<String>::new());
        Ok(())
    }

    #[test]
    fn batch_applies_all() -> Result<()> {
        let store = MemoryStore::new();
        store.put("seq/old", b"x")?;
        store.atomic_batch(vec![
            BatchOp::put("seq/new", b"y".to_vec()),
            BatchOp::delete("seq/old"),
        ])?;
        assert_eq!(store.get("seq/new")?, Some(b"y".to_vec()));
        assert_eq!(store.get("seq/old")?, None);
        Ok(())
    }
}
