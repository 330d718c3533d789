use thiserror::Error;

use crate::base::ParseBaseError;

#[derive(Error, Debug)]
pub enum ReferenceError {
    #[error("Reference sequence is empty")]
    Empty,

    #[error("Invalid reference base at position {position}")]
    InvalidBase { position: usize, #[source] source: ParseBaseError },

    #[error("Failed to read reference FASTA '{path}'")]
    OpenFasta { path: String, #[source] source: std::io::Error },
}
