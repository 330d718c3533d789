use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid character '{0}' for an unambiguous nucleotide (expected one of A, C, G, T)")]
pub struct ParseBaseError(pub char);
