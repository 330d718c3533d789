use thiserror::Error;

use refseq::codec::CodecError;
use storage::StorageError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Guid '{0}' is already stored")]
    DuplicateGuid(String),

    #[error("Unknown guid '{0}'")]
    UnknownGuid(String),

    #[error("Guid '{0}' is empty or contains '/'")]
    InvalidGuid(String),

    #[error("Indexed guid '{guid}' has no durable record")]
    MissingRecord { guid: String },

    #[error("Double-delta record '{guid}' points to anchor '{anchor}', which is not stored single-delta")]
    AnchorChain { guid: String, anchor: String },
}
