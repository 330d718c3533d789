use std::collections::BTreeSet;

use refseq::base::BASES;
use refseq::{CompressedSequence, UncertainClass};

/// Pairwise SNV distance on reference-compressed sequences.
///
/// A position counts as one SNV when exactly one of the two sequences
/// carries a given non-reference base there, or when they carry different
/// non-reference bases. Positions carrying `N` in either sequence are always
/// skipped; mixed positions are skipped when the uncertain class covers `M`.
#[derive(Debug, Clone, Copy)]
pub struct Comparer {
    ceiling   : u32,
    uncertain : UncertainClass,
}

impl Comparer {
    #[must_use]
    pub fn new(ceiling: u32, uncertain: UncertainClass) -> Self {
        Self { ceiling, uncertain }
    }

    #[must_use]
    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    #[must_use]
    pub fn uncertain_class(&self) -> UncertainClass {
        self.uncertain
    }

    /// SNV distance between `x` and `y`, or `None` once the running count
    /// exceeds the ceiling. Pairs returning `None` are simply absent from
    /// the sparse matrix.
    #[must_use]
    pub fn distance(&self, x: &CompressedSequence, y: &CompressedSequence) -> Option<u32> {
        let skip_mixed = self.uncertain.includes_m();

        // Candidate set: positions where exactly one side carries a given
        // non-reference base. A position showing up for two bases at once
        // (true substitution between two alts) lands in the set once.
        let mut candidates = BTreeSet::new();
        for base in BASES {
            candidates.extend(
                x.positions(base).symmetric_difference(y.positions(base)).copied()
            );
        }

        let mut snv = 0u32;
        for position in candidates {
            if x.is_uncertain_at(position, skip_mixed) || y.is_uncertain_at(position, skip_mixed) {
                continue;
            }
            snv += 1;
            if snv > self.ceiling {
                return None;
            }
        }
        Some(snv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use refseq::{MaskSet, RefCodec, Reference};

    fn codec() -> Result<RefCodec> {
        let reference = Reference::new("AAAAAAAAAA")?;
        let mask = MaskSet::empty(reference.len());
        Ok(RefCodec::new(reference, mask, 0.85))
    }

    fn compress(codec: &RefCodec, sequence: &str) -> Result<CompressedSequence> {
        Ok(codec.compress(sequence)?)
    }

    #[test]
    fn identity_is_zero() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(3, UncertainClass::N);
        for sequence in ["AAAAAAAAAA", "AAAACGAAAA", "AANAAAAAAT"] {
            let x = compress(&codec, sequence)?;
            assert_eq!(comparer.distance(&x, &x), Some(0));
        }
        Ok(())
    }

    #[test]
    fn symmetry() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(10, UncertainClass::N);
        let x = compress(&codec, "AAAACGAAAA")?;
        let y = compress(&codec, "AATACAAAGA")?;
        assert_eq!(comparer.distance(&x, &y), comparer.distance(&y, &x));
        Ok(())
    }

    #[test]
    fn counts_each_position_once() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(10, UncertainClass::N);
        // Position 4: C vs G, a substitution between two alts. One SNV, not two.
        let x = compress(&codec, "AAAACAAAAA")?;
        let y = compress(&codec, "AAAAGAAAAA")?;
        assert_eq!(comparer.distance(&x, &y), Some(1));
        Ok(())
    }

    #[test]
    fn alt_vs_reference() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(10, UncertainClass::N);
        let g1 = compress(&codec, "AAAAAAAAAA")?;
        let g2 = compress(&codec, "AAAACAAAAA")?;
        let g3 = compress(&codec, "AAAACGAAAA")?;
        assert_eq!(comparer.distance(&g1, &g2), Some(1));
        assert_eq!(comparer.distance(&g1, &g3), Some(2));
        assert_eq!(comparer.distance(&g2, &g3), Some(1));
        Ok(())
    }

    #[test]
    fn ceiling_terminates_early() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(3, UncertainClass::N);
        let g1 = compress(&codec, "AAAAAAAAAA")?;
        let g5 = compress(&codec, "AAAACCCCCC")?; // 6 mismatches, ceiling 3
        assert_eq!(comparer.distance(&g1, &g5), None);
        Ok(())
    }

    #[test]
    fn n_positions_always_skipped() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(10, UncertainClass::N);
        // x differs at 4 (C) and carries N at 5; y differs at 5 (G).
        let x = compress(&codec, "AAAACNAAAA")?;
        let y = compress(&codec, "AAAAAGAAAA")?;
        assert_eq!(comparer.distance(&x, &y), Some(1));
        Ok(())
    }

    #[test]
    fn mixed_positions_follow_the_class() -> Result<()> {
        let codec = codec()?;
        // x carries an alt C at 4; y carries a mixed call (R = A/G) there.
        let x = compress(&codec, "AAAACAAAAA")?;
        let y = compress(&codec, "AAAARAAAAA")?;

        let skip_m = Comparer::new(10, UncertainClass::NOrM);
        assert_eq!(skip_m.distance(&x, &y), Some(0));

        let keep_m = Comparer::new(10, UncertainClass::N);
        assert_eq!(keep_m.distance(&x, &y), Some(1));
        Ok(())
    }

    #[test]
    fn weak_triangle_inequality() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(100, UncertainClass::NOrM);
        let sequences = [
            "AAAAAAAAAA", "AAAACAAAAA", "AAAACGAAAA",
            "AANAAGATAA", "TAAACGAANA", "AAAARGATAA",
        ];
        let compressed = sequences.iter()
            .map(|s| compress(&codec, s))
            .collect::<Result<Vec<CompressedSequence>>>()?;
        for x in &compressed {
            for y in &compressed {
                for z in &compressed {
                    let (xz, xy, yz) = (
                        comparer.distance(x, z).unwrap(),
                        comparer.distance(x, y).unwrap(),
                        comparer.distance(y, z).unwrap(),
                    );
                    // Skipped uncertain positions can only shorten a leg.
                    let slack = (x.uncertain_count() + y.uncertain_count() + z.uncertain_count()) as u32;
                    assert!(xz <= xy + yz + slack, "d(x,z)={xz} > {xy}+{yz}+{slack}");
                }
            }
        }
        Ok(())
    }

    #[test]
    fn distance_at_ceiling_is_kept() -> Result<()> {
        let codec = codec()?;
        let comparer = Comparer::new(3, UncertainClass::N);
        let x = compress(&codec, "AAAAAAAAAA")?;
        let y = compress(&codec, "CCCAAAAAAA")?; // exactly 3
        assert_eq!(comparer.distance(&x, &y), Some(3));
        Ok(())
    }
}
