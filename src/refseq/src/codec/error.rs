use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Sequence length {got} does not match the reference length {expected}")]
    WrongLength { expected: usize, got: usize },

    #[error("Invalid character '{character}' at position {position} (expected A, C, G, T, N or an IUPAC ambiguity code)")]
    InvalidCharacter { position: u32, character: char },
}
