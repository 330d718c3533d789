mod error;
pub use error::ReferenceError;

use std::{fs::File, io::{BufRead, BufReader}, path::Path};

use log::info;

use crate::base::Base;

/// The fixed reference every consensus is expressed against. Validated on
/// construction: upper-case `A`/`C`/`G`/`T` only. Immutable for the lifetime
/// of the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    bases: Vec<Base>,
}

impl Reference {
    pub fn new(sequence: &str) -> Result<Self, ReferenceError> {
        if sequence.is_empty() {
            return Err(ReferenceError::Empty);
        }
        let bases = sequence.chars()
            .enumerate()
            .map(|(i, c)| {
                Base::try_from(c.to_ascii_uppercase())
                    .map_err(|source| ReferenceError::InvalidBase { position: i, source })
            })
            .collect::<Result<Vec<Base>, ReferenceError>>()?;
        Ok(Self { bases })
    }

    /// Read the first record of a FASTA file. Header lines (`>`) after the
    /// first record terminate the read; line breaks within the sequence are
    /// allowed.
    pub fn from_fasta(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ReferenceError::OpenFasta {
            path: path.display().to_string(),
            source,
        })?;
        let mut sequence = String::new();
        let mut in_record = false;
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|source| ReferenceError::OpenFasta {
                path: path.display().to_string(),
                source,
            })?;
            if line.starts_with('>') {
                if in_record {
                    break; // Only the first record is the reference.
                }
                in_record = true;
                continue;
            }
            sequence.push_str(line.trim());
        }
        info!("Indexed reference genome ({} bp) from '{}'", sequence.len(), path.display());
        Self::new(&sequence)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bases.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    #[must_use]
    pub fn base_at(&self, position: u32) -> Base {
        self.bases[position as usize]
    }

    #[must_use]
    pub fn bases(&self) -> &[Base] {
        &self.bases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn valid_sequence() -> Result<()> {
        let reference = Reference::new("ACGTACGT")?;
        assert_eq!(reference.len(), 8);
        assert_eq!(reference.base_at(0), Base::A);
        assert_eq!(reference.base_at(3), Base::T);
        Ok(())
    }

    #[test]
    fn lowercase_normalized() -> Result<()> {
        let reference = Reference::new("acgt")?;
        assert_eq!(reference.base_at(1), Base::C);
        Ok(())
    }

    #[test]
    fn reject_ambiguity() {
        assert!(matches!(
            Reference::new("ACGN"),
            Err(ReferenceError::InvalidBase { position: 3, .. })
        ));
    }

    #[test]
    fn reject_empty() {
        assert!(matches!(Reference::new(""), Err(ReferenceError::Empty)));
    }
}
