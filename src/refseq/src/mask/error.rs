use thiserror::Error;

#[derive(Error, Debug)]
pub enum MaskError {
    #[error("Masked position {position} is outside the reference (length {genome_length})")]
    OutOfRange { position: u32, genome_length: usize },

    #[error("Failed to read mask file '{path}'")]
    ReadFile { path: String, #[source] source: std::io::Error },

    #[error("Invalid mask position '{line}' at {path}:{lineno}")]
    ParseLine { path: String, lineno: usize, line: String },
}
