mod error;
pub use error::MaskError;

use std::{fs::File, io::{BufRead, BufReader}, path::Path};

use log::info;

use crate::MASK_SENTINEL;

/// Genome positions excluded from every distance computation, stored as a
/// bitmap of reference length. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskSet {
    words          : Vec<u64>,
    genome_length  : usize,
    excluded_count : usize,
}

impl MaskSet {
    /// An empty mask over a genome of the given length.
    #[must_use]
    pub fn empty(genome_length: usize) -> Self {
        Self {
            words: vec![0; (genome_length + 63) / 64],
            genome_length,
            excluded_count: 0,
        }
    }

    /// Build from a list of excluded positions. Duplicates are tolerated;
    /// out-of-range positions are rejected.
    pub fn from_positions(genome_length: usize, positions: &[u32]) -> Result<Self, MaskError> {
        let mut mask = Self::empty(genome_length);
        for &position in positions {
            if position as usize >= genome_length {
                return Err(MaskError::OutOfRange { position, genome_length });
            }
            if !mask.contains(position) {
                mask.words[position as usize / 64] |= 1 << (position % 64);
                mask.excluded_count += 1;
            }
        }
        Ok(mask)
    }

    /// Load from a text file holding one 0-based position per line.
    /// Blank lines and `#` comments are skipped.
    pub fn from_file(genome_length: usize, path: impl AsRef<Path>) -> Result<Self, MaskError> {
        let path = path.as_ref();
        let open_err = |source| MaskError::ReadFile { path: path.display().to_string(), source };
        let file = File::open(path).map_err(open_err)?;

        let mut positions = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(open_err)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let position = line.parse::<u32>().map_err(|_| MaskError::ParseLine {
                path: path.display().to_string(),
                lineno: lineno + 1,
                line: line.to_string(),
            })?;
            positions.push(position);
        }
        info!("Loaded {} excluded positions from '{}'", positions.len(), path.display());
        Self::from_positions(genome_length, &positions)
    }

    #[must_use]
    pub fn contains(&self, position: u32) -> bool {
        match self.words.get(position as usize / 64) {
            Some(word) => word & (1 << (position % 64)) != 0,
            None       => false,
        }
    }

    /// Number of masked positions.
    #[must_use]
    pub fn excluded_count(&self) -> usize {
        self.excluded_count
    }

    #[must_use]
    pub fn genome_length(&self) -> usize {
        self.genome_length
    }

    /// Number of positions that take part in distance computations.
    #[must_use]
    pub fn informative_length(&self) -> usize {
        self.genome_length - self.excluded_count
    }

    /// The masked positions, ascending.
    #[must_use]
    pub fn positions(&self) -> Vec<u32> {
        (0..self.genome_length as u32).filter(|p| self.contains(*p)).collect()
    }

    /// Replace every masked position with the sentinel the codec skips.
    /// The input must already have reference length.
    #[must_use]
    pub fn apply(&self, sequence: &str) -> String {
        sequence.chars()
            .enumerate()
            .map(|(i, c)| if self.contains(i as u32) { MASK_SENTINEL } else { c })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;

    #[test]
    fn empty_mask() {
        let mask = MaskSet::empty(100);
        assert_eq!(mask.excluded_count(), 0);
        assert_eq!(mask.informative_length(), 100);
        assert!(!mask.contains(42));
    }

    #[test]
    fn from_positions_dedup() -> Result<()> {
        let mask = MaskSet::from_positions(10, &[1, 3, 3, 7])?;
        assert_eq!(mask.excluded_count(), 3);
        assert!(mask.contains(1) && mask.contains(3) && mask.contains(7));
        assert!(!mask.contains(0));
        Ok(())
    }

    #[test]
    fn reject_out_of_range() {
        assert!(matches!(
            MaskSet::from_positions(10, &[10]),
            Err(MaskError::OutOfRange { position: 10, genome_length: 10 })
        ));
    }

    #[test]
    fn apply_sentinel() -> Result<()> {
        let mask = MaskSet::from_positions(4, &[0, 2])?;
        assert_eq!(mask.apply("ACGT"), "#C#T");
        Ok(())
    }

    #[test]
    fn from_file_skips_comments() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "# excluded repetitive region")?;
        writeln!(file, "2")?;
        writeln!(file)?;
        writeln!(file, "5")?;
        let mask = MaskSet::from_file(10, file.path())?;
        assert_eq!(mask.excluded_count(), 2);
        assert!(mask.contains(2) && mask.contains(5));
        Ok(())
    }

    #[test]
    fn word_boundary() -> Result<()> {
        let mask = MaskSet::from_positions(130, &[63, 64, 127, 128])?;
        for position in [63, 64, 127, 128] {
            assert!(mask.contains(position));
        }
        assert!(!mask.contains(129));
        Ok(())
    }
}
