use thiserror::Error;

use storage::StorageError;

#[derive(Error, Debug)]
pub enum MatrixError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Edge ({g1}, {g2}) has snv {snv} above the ceiling {ceiling}")]
    AboveCeiling { g1: String, g2: String, snv: u32, ceiling: u32 },

    #[error("Self edge on '{0}'")]
    SelfEdge(String),

    #[error("Unknown neighbour output format '{0}' (expected 1..=4)")]
    UnknownFormat(u8),
}
