mod error;
pub use error::StorageError;

use mockall::automock;

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: String, bytes: Vec<u8> },
    Delete { key: String },
}

impl BatchOp {
    pub fn put(key: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Put { key: key.into(), bytes }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Durable key-value boundary of the core. Everything the engine persists
/// (compressed sequences, edges, cluster snapshots, metadata) goes through
/// this trait; production backends adapt it.
///
/// Keys are `/`-separated paths within the keyspaces of [`crate::keys`].
/// `scan` returns the matching keys rather than a live iterator, so callers
/// hold no borrow into the store while rehydrating.
#[automock]
pub trait PersistencePort: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Keys starting with `prefix`, in lexicographic order.
    fn scan(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Apply every operation or none of them.
    fn atomic_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError>;
}
