use thiserror::Error;

use clusterer::ClusterError;
use config::ConfigError;
use neighbours::{MatrixError, StoreError};
use refseq::mask::MaskError;
use refseq::reference::ReferenceError;
use storage::StorageError;

/// The error surface of the engine, as the REST adapter sees it. Module
/// errors collapse into these kinds at the [`crate::Server`] boundary;
/// anything a caller cannot act on becomes `Internal`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sequence '{0}' is too low-quality to take part in distances or clustering")]
    QualityTooLow(String),

    #[error("Persistence failure (transient: {transient})")]
    Persistence { transient: bool, #[source] source: StorageError },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for CoreError {
    fn from(source: StorageError) -> Self {
        Self::Persistence { transient: source.is_transient(), source }
    }
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Codec(source)        => Self::InvalidInput(source.to_string()),
            StoreError::DuplicateGuid(guid)  => Self::InvalidInput(format!("guid '{guid}' is already stored")),
            StoreError::InvalidGuid(guid)    => Self::InvalidInput(format!("guid '{guid}' is empty or contains '/'")),
            StoreError::UnknownGuid(guid)    => Self::NotFound(format!("guid '{guid}'")),
            StoreError::Storage(source)      => source.into(),
            internal @ (StoreError::MissingRecord { .. } | StoreError::AnchorChain { .. }) => {
                Self::Internal(internal.to_string())
            }
        }
    }
}

impl From<MatrixError> for CoreError {
    fn from(err: MatrixError) -> Self {
        match err {
            MatrixError::Storage(source)      => source.into(),
            MatrixError::UnknownFormat(code)  => Self::InvalidInput(format!("unknown neighbour format '{code}'")),
            internal @ (MatrixError::AboveCeiling { .. } | MatrixError::SelfEdge(_)) => {
                Self::Internal(internal.to_string())
            }
        }
    }
}

impl From<ClusterError> for CoreError {
    fn from(err: ClusterError) -> Self {
        match err {
            ClusterError::Storage(source)     => source.into(),
            ClusterError::UnknownCluster(id)  => Self::NotFound(format!("cluster {id}")),
            ClusterError::UnknownGuid(guid)   => Self::Internal(format!("guid '{guid}' missing from a clustering engine")),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<MaskError> for CoreError {
    fn from(err: MaskError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<ReferenceError> for CoreError {
    fn from(err: ReferenceError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        let err: CoreError = StoreError::UnknownGuid("g1".to_string()).into();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err: CoreError = StoreError::DuplicateGuid("g1".to_string()).into();
        assert!(matches!(err, CoreError::InvalidInput(_)));

        let err: CoreError = StoreError::AnchorChain { guid: "a".to_string(), anchor: "b".to_string() }.into();
        assert!(matches!(err, CoreError::Internal(_)));
    }

    #[test]
    fn io_errors_carry_transience() {
        let transient = StorageError::Io {
            key: "seq/g1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::TimedOut),
        };
        assert!(matches!(CoreError::from(transient), CoreError::Persistence { transient: true, .. }));

        let fatal = StorageError::Io {
            key: "seq/g1".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        assert!(matches!(CoreError::from(fatal), CoreError::Persistence { transient: false, .. }));
    }
}
