use std::collections::BTreeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::port::{BatchOp, PersistencePort, StorageError};

/// Directory under the store root holding staged values and parked
/// (displaced) values during a batch. Never scanned.
const STAGING_DIR: &str = ".staging";

/// How to take one published batch operation back: remove what was
/// published over `target`, then move the parked previous value back in.
struct Undo {
    target    : PathBuf,
    backup    : Option<PathBuf>,
    published : bool,
}

/// File-backed key-value store: one file per key, key path segments mapped
/// to subdirectories. Every write is staged and renamed into place. A batch
/// parks the values it displaces next to the staged ones, so a failure at
/// any point before commit rewinds every operation already applied; on
/// commit the parked values are dropped and every touched directory is
/// fsync'd, making the renames durable.
#[derive(Debug)]
pub struct FileStore {
    root    : PathBuf,
    staging : PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        let io_err = |source| StorageError::Io { key: root.display().to_string(), source };
        fs::create_dir_all(&staging).map_err(io_err)?;

        // Staged or parked leftovers of an interrupted batch are dead
        // weight: the batch never committed, and the live tree still holds
        // the pre-batch values.
        let mut stale = 0;
        for entry in fs::read_dir(&staging).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            if fs::remove_file(entry.path()).is_ok() {
                stale += 1;
            }
        }
        if stale > 0 {
            warn!("Dropped {stale} staged values left behind by an interrupted batch");
        }
        debug!("Opened file store at '{}'", root.display());
        Ok(Self { root, staging })
    }

    fn path_of(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty() || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
            return Err(StorageError::Corrupt {
                key: key.to_string(),
                detail: "key is not a clean /-separated path".to_string(),
            });
        }
        Ok(self.root.join(key))
    }

    /// Write the value into the staging area and flush it to disk.
    fn stage(&self, key: &str, bytes: &[u8], ordinal: usize) -> Result<PathBuf, StorageError> {
        let staged = self.staging.join(format!("{ordinal}-{}", key.replace('/', "_")));
        let io_err = |source| StorageError::Io { key: key.to_string(), source };
        let mut file = fs::File::create(&staged).map_err(io_err)?;
        file.write_all(bytes).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        Ok(staged)
    }

    /// Park the current value of `key` (if any) in the staging area and
    /// record how to put it back.
    fn displace(&self, key: &str, ordinal: usize, undo: &mut Vec<Undo>) -> Result<(), StorageError> {
        let target = self.path_of(key)?;
        let backup = if target.exists() {
            let backup = self.staging.join(format!("{ordinal}-{}.bak", key.replace('/', "_")));
            fs::rename(&target, &backup)
                .map_err(|source| StorageError::Io { key: key.to_string(), source })?;
            Some(backup)
        } else {
            None
        };
        undo.push(Undo { target, backup, published: false });
        Ok(())
    }

    fn publish(&self, key: &str, staged: &Path) -> Result<(), StorageError> {
        let target = self.path_of(key)?;
        let io_err = |source| StorageError::Io { key: key.to_string(), source };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::rename(staged, &target).map_err(io_err)
    }

    /// Apply one batch operation, tracking its undo record.
    fn apply_op(
        &self,
        op      : &BatchOp,
        ordinal : usize,
        staged  : &mut std::vec::IntoIter<PathBuf>,
        undo    : &mut Vec<Undo>,
    ) -> Result<(), StorageError> {
        match op {
            BatchOp::Put { key, .. } => {
                self.displace(key, ordinal, undo)?;
                let path = staged.next().expect("one staged file per put");
                self.publish(key, &path)?;
                undo.last_mut().expect("displace pushed an entry").published = true;
                Ok(())
            }
            BatchOp::Delete { key } => self.displace(key, ordinal, undo),
        }
    }

    /// Take every applied operation back, newest first. Best effort: the
    /// live tree was healthy before the batch and each step restores one
    /// key to exactly that state.
    fn restore(undo: Vec<Undo>) {
        for entry in undo.into_iter().rev() {
            if entry.published {
                let _ = fs::remove_file(&entry.target);
            }
            if let Some(backup) = entry.backup {
                let _ = fs::rename(backup, &entry.target);
            }
        }
    }

    /// Flush a directory so previously renamed entries survive a crash.
    fn fsync_dir(dir: &Path) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io { key: dir.display().to_string(), source };
        fs::File::open(dir).map_err(io_err)?.sync_all().map_err(io_err)
    }

    fn collect_keys(&self, dir: &Path, out: &mut Vec<String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io { key: dir.display().to_string(), source };
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let path = entry.path();
            if path == self.staging {
                continue;
            }
            if path.is_dir() {
                self.collect_keys(&path, out)?;
            } else if let Ok(relative) = path.strip_prefix(&self.root) {
                out.push(relative.to_string_lossy().replace(std::path::MAIN_SEPARATOR, "/"));
            }
        }
        Ok(())
    }
}

impl PersistencePort for FileStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let target = self.path_of(key)?;
        let staged = self.stage(key, bytes, 0)?;
        self.publish(key, &staged)?;
        Self::fsync_dir(target.parent().unwrap_or(&self.root))
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path_of(key)?) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let target = self.path_of(key)?;
        match fs::remove_file(&target) {
            Ok(()) => Self::fsync_dir(target.parent().unwrap_or(&self.root)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io { key: key.to_string(), source }),
        }
    }

    fn scan(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        self.collect_keys(&self.root, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    fn atomic_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        // Validate every key before anything moves.
        for op in &ops {
            let (BatchOp::Put { key, .. } | BatchOp::Delete { key }) = op;
            self.path_of(key)?;
        }

        // Stage every value. Nothing is visible yet, so a failure only has
        // to clean the staging area.
        let mut staged = Vec::new();
        for (ordinal, op) in ops.iter().enumerate() {
            if let BatchOp::Put { key, bytes } = op {
                match self.stage(key, bytes, ordinal) {
                    Ok(path) => staged.push(path),
                    Err(err) => {
                        for path in staged {
                            let _ = fs::remove_file(path);
                        }
                        return Err(StorageError::BatchAborted(Box::new(err)));
                    }
                }
            }
        }

        // Publish. Displaced values are parked next to the staged ones, so
        // a failure here rewinds every operation already applied; only
        // invisible staging leftovers remain, swept on the next open.
        let mut undo: Vec<Undo> = Vec::with_capacity(ops.len());
        let mut staged = staged.into_iter();
        for (ordinal, op) in ops.iter().enumerate() {
            if let Err(err) = self.apply_op(op, ordinal, &mut staged, &mut undo) {
                Self::restore(undo);
                for path in staged {
                    let _ = fs::remove_file(path);
                }
                return Err(StorageError::BatchAborted(Box::new(err)));
            }
        }

        // Commit: drop the parked values and flush every touched directory.
        let mut dirs = BTreeSet::new();
        for entry in undo {
            if let Some(backup) = entry.backup {
                let _ = fs::remove_file(backup);
            }
            if let Some(parent) = entry.target.parent() {
                dirs.insert(parent.to_path_buf());
            }
        }
        for dir in dirs {
            Self::fsync_dir(&dir)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn open() -> Result<(tempfile::TempDir, FileStore)> {
        let dir = tempfile::tempdir()?;
        let store = FileStore::open(dir.path())?;
        Ok((dir, store))
    }

    #[test]
    fn put_get_delete() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("seq/g1", b"payload")?;
        assert_eq!(store.get("seq/g1")?, Some(b"payload".to_vec()));
        store.delete("seq/g1")?;
        assert_eq!(store.get("seq/g1")?, None);
        store.delete("seq/g1")?; // idempotent
        Ok(())
    }

    #[test]
    fn nested_keys_map_to_directories() -> Result<()> {
        let (dir, store) = open()?;
        store.put("edge/g1/g2", b"1")?;
        assert!(dir.path().join("edge").join("g1").join("g2").is_file());
        Ok(())
    }

    #[test]
    fn scan_is_sorted_and_prefixed() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("edge/b/c", b"1")?;
        store.put("edge/a/b", b"2")?;
        store.put("seq/a", b"3")?;
        assert_eq!(store.scan("edge/")?, vec!["edge/a/b".to_string(), "edge/b/c".to_string()]);
        Ok(())
    }

    #[test]
    fn scan_skips_staging() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("seq/a", b"1")?;
        assert_eq!(store.scan("")?, vec!["seq/a".to_string()]);
        Ok(())
    }

    #[test]
    fn batch_publishes_all() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("seq/old", b"x")?;
        store.atomic_batch(vec![
            BatchOp::put("seq/new", b"y".to_vec()),
            BatchOp::delete("seq/old"),
        ])?;
        assert_eq!(store.get("seq/new")?, Some(b"y".to_vec()));
        assert_eq!(store.get("seq/old")?, None);
        Ok(())
    }

    #[test]
    fn batch_publish_failure_rewinds_applied_ops() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("seq/a", b"old-a")?;
        store.put("seq/b", b"old-b")?;
        // A plain file where the third op needs a directory makes its
        // publish fail after the first two ops have already gone through.
        store.put("seq/x", b"squatter")?;

        let result = store.atomic_batch(vec![
            BatchOp::put("seq/a", b"new-a".to_vec()),
            BatchOp::delete("seq/b"),
            BatchOp::put("seq/x/child", b"never".to_vec()),
        ]);
        assert!(matches!(result, Err(StorageError::BatchAborted(_))));

        // Every applied op was taken back.
        assert_eq!(store.get("seq/a")?, Some(b"old-a".to_vec()));
        assert_eq!(store.get("seq/b")?, Some(b"old-b".to_vec()));
        assert_eq!(store.get("seq/x")?, Some(b"squatter".to_vec()));
        assert_eq!(
            store.scan("seq/")?,
            vec!["seq/a".to_string(), "seq/b".to_string(), "seq/x".to_string()]
        );
        Ok(())
    }

    #[test]
    fn batch_failure_restores_overwrites_in_order() -> Result<()> {
        let (_dir, store) = open()?;
        store.put("seq/a", b"v0")?;
        store.put("seq/x", b"squatter")?;

        // The same key written twice, then a doomed op: rollback must walk
        // back through both versions to v0.
        let result = store.atomic_batch(vec![
            BatchOp::put("seq/a", b"v1".to_vec()),
            BatchOp::put("seq/a", b"v2".to_vec()),
            BatchOp::put("seq/x/child", b"never".to_vec()),
        ]);
        assert!(result.is_err());
        assert_eq!(store.get("seq/a")?, Some(b"v0".to_vec()));
        Ok(())
    }

    #[test]
    fn reject_dirty_keys() -> Result<()> {
        let (_dir, store) = open()?;
        for key in ["", "a//b", "../escape", "a/./b"] {
            assert!(store.put(key, b"x").is_err(), "key '{key}' should be rejected");
        }
        Ok(())
    }

    #[test]
    fn reopen_preserves_data() -> Result<()> {
        let dir = tempfile::tempdir()?;
        {
            let store = FileStore::open(dir.path())?;
            store.put("seq/g1", b"payload")?;
        }
        let store = FileStore::open(dir.path())?;
        assert_eq!(store.get("seq/g1")?, Some(b"payload".to_vec()));
        Ok(())
    }
}
