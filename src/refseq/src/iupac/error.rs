use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Invalid character '{0}' for an IUPAC ambiguity code")]
pub struct ParseIupacError(pub char);
