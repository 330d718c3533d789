use thiserror::Error;

use storage::StorageError;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Unknown cluster id {0}")]
    UnknownCluster(u32),

    #[error("Guid '{0}' is not registered with this clustering")]
    UnknownGuid(String),
}
