mod error;
pub use error::CodecError;

use std::collections::{BTreeMap, BTreeSet};

use crate::base::{Base, BASES};
use crate::compressed::{Call, CompressedSequence, DeltaSequence};
use crate::iupac::{BaseFreqs, Iupac};
use crate::mask::MaskSet;
use crate::reference::Reference;

/// Minimum number of positions a double-delta encoding must save over the
/// single-delta form before it is worth the extra indirection.
pub const MIN_DELTA_SAVING: usize = 32;

/// Encodes masked consensus strings as deltas against the fixed reference,
/// and re-encodes stored sequences against a locally chosen anchor
/// (double-delta).
#[derive(Debug, Clone)]
pub struct RefCodec {
    reference     : Reference,
    mask          : MaskSet,
    max_n_percent : f64,
}

impl RefCodec {
    #[must_use]
    pub fn new(reference: Reference, mask: MaskSet, max_n_percent: f64) -> Self {
        Self { reference, mask, max_n_percent }
    }

    #[must_use]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    #[must_use]
    pub fn mask(&self) -> &MaskSet {
        &self.mask
    }

    /// Compress a masked consensus string against the reference.
    ///
    /// Masked positions are skipped outright and appear in no position set.
    /// Anything that is not a base, an IUPAC ambiguity code or `N` rejects
    /// the whole sequence.
    pub fn compress(&self, sequence: &str) -> Result<CompressedSequence, CodecError> {
        let expected = self.reference.len();
        let got = sequence.chars().count();
        if got != expected {
            return Err(CodecError::WrongLength { expected, got });
        }

        let mut acgt: [BTreeSet<u32>; 4] = Default::default();
        let mut n = BTreeSet::new();
        let mut m = BTreeMap::new();

        for (i, c) in sequence.chars().enumerate() {
            let position = i as u32;
            if self.mask.contains(position) {
                continue;
            }
            let c = c.to_ascii_uppercase();
            if let Ok(base) = Base::try_from(c) {
                if base != self.reference.base_at(position) {
                    acgt[base.index()].insert(position);
                }
            } else if c == 'N' {
                n.insert(position);
            } else if let Ok(code) = Iupac::try_from(c) {
                m.insert(position, BaseFreqs::from_iupac(code));
            } else {
                // A sentinel outside the mask is as invalid as any other
                // stray character.
                return Err(CodecError::InvalidCharacter { position, character: c });
            }
        }

        let informative = self.mask.informative_length();
        let uncertain = (n.len() + m.len()) as f64;
        let (quality, invalid) = if informative == 0 {
            (1.0, false)
        } else {
            let rate = uncertain / informative as f64;
            (1.0 - rate, rate > self.max_n_percent)
        };
        Ok(CompressedSequence::new(acgt, n, m, quality, invalid))
    }

    /// Reconstruct the masked consensus string: reference length, masked
    /// positions rendered as `N`, mixed positions rendered with their IUPAC
    /// code.
    #[must_use]
    pub fn uncompress(&self, compressed: &CompressedSequence) -> String {
        (0..self.reference.len() as u32)
            .map(|position| {
                if self.mask.contains(position) {
                    return 'N';
                }
                match compressed.call_at(position) {
                    Call::Reference    => char::from(self.reference.base_at(position)),
                    Call::Alt(base)    => char::from(base),
                    Call::N            => 'N',
                    Call::Mixed(freqs) => freqs.to_iupac().map_or('N', |code| char::from(&code)),
                }
            })
            .collect()
    }

    /// Re-encode `x` as symmetric differences against `anchor`. Only the four
    /// base sets shrink; `N` and mixed records travel as-is.
    #[must_use]
    pub fn encode_local(&self, x: &CompressedSequence, anchor_guid: &str, anchor: &CompressedSequence) -> DeltaSequence {
        let acgt_xor = BASES.map(|base| {
            x.positions(base)
                .symmetric_difference(anchor.positions(base))
                .copied()
                .collect()
        });
        DeltaSequence::new(
            anchor_guid.to_string(),
            acgt_xor,
            x.n_positions().clone(),
            x.m_positions().clone(),
            x.quality(),
            x.is_invalid(),
        )
    }

    /// Invert [`RefCodec::encode_local`]: `expand(encode_local(x, a), a) == x`.
    #[must_use]
    pub fn expand(&self, delta: DeltaSequence, anchor: &CompressedSequence) -> CompressedSequence {
        let (acgt_xor, n, m, quality, invalid) = delta.into_parts();
        let mut acgt: [BTreeSet<u32>; 4] = Default::default();
        for base in BASES {
            acgt[base.index()] = acgt_xor[base.index()]
                .symmetric_difference(anchor.positions(base))
                .copied()
                .collect();
        }
        CompressedSequence::new(acgt, n, m, quality, invalid)
    }

    /// Pick the anchor minimising the double-delta payload among the given
    /// candidates. Returns `None` when no candidate saves at least
    /// [`MIN_DELTA_SAVING`] positions over the single-delta form.
    #[must_use]
    pub fn best_anchor<'a>(
        &self,
        x: &CompressedSequence,
        candidates: impl IntoIterator<Item = (&'a str, &'a CompressedSequence)>,
    ) -> Option<(String, DeltaSequence)> {
        let single_size = x.delta_size();
        let mut best: Option<(String, DeltaSequence)> = None;
        for (guid, anchor) in candidates {
            let delta = self.encode_local(x, guid, anchor);
            if best.as_ref().map_or(true, |(_, current)| delta.delta_size() < current.delta_size()) {
                best = Some((guid.to_string(), delta));
            }
        }
        match best {
            Some((guid, delta)) if single_size.saturating_sub(delta.delta_size()) >= MIN_DELTA_SAVING => {
                Some((guid, delta))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use pretty_assertions::assert_eq;

    fn codec(reference: &str, masked: &[u32], max_n_percent: f64) -> Result<RefCodec> {
        let reference = Reference::new(reference)?;
        let mask = MaskSet::from_positions(reference.len(), masked)?;
        Ok(RefCodec::new(reference, mask, max_n_percent))
    }

    #[test]
    fn compress_identity() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        let compressed = codec.compress("AAAAAAAAAA")?;
        assert_eq!(compressed.delta_size(), 0);
        assert_eq!(compressed.quality(), 1.0);
        assert!(!compressed.is_invalid());
        Ok(())
    }

    #[test]
    fn compress_variants() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        let compressed = codec.compress("AAAACGAAAA")?;
        assert_eq!(compressed.positions(Base::C).iter().copied().collect::<Vec<u32>>(), vec![4]);
        assert_eq!(compressed.positions(Base::G).iter().copied().collect::<Vec<u32>>(), vec![5]);
        assert_eq!(compressed.delta_size(), 2);
        Ok(())
    }

    #[test]
    fn compress_uncertainty_and_quality() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.3)?;
        let compressed = codec.compress("AANNNNAAAA")?;
        assert_eq!(compressed.n_positions().len(), 4);
        float_cmp::assert_approx_eq!(f64, compressed.quality(), 0.6, epsilon = 1e-12);
        assert!(compressed.is_invalid());
        Ok(())
    }

    #[test]
    fn compress_mixed_positions() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        let compressed = codec.compress("AAARAAAAAA")?;
        assert_eq!(compressed.m_positions().len(), 1);
        float_cmp::assert_approx_eq!(f64, compressed.quality(), 0.9, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn compress_rejects_wrong_length() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        assert!(matches!(
            codec.compress("AAAA"),
            Err(CodecError::WrongLength { expected: 10, got: 4 })
        ));
        Ok(())
    }

    #[test]
    fn compress_rejects_stray_sentinel() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        assert!(matches!(
            codec.compress("AAAA#AAAAA"),
            Err(CodecError::InvalidCharacter { position: 4, character: '#' })
        ));
        Ok(())
    }

    #[test]
    fn masked_positions_are_skipped() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[4], 0.85)?;
        // A variant and a sentinel under the mask both vanish.
        for masked_char in ['C', '#', 'N'] {
            let sequence = format!("AAAA{masked_char}AAAAA");
            let compressed = codec.compress(&sequence)?;
            assert_eq!(compressed.delta_size(), 0);
            assert_eq!(compressed.uncertain_count(), 0);
        }
        Ok(())
    }

    #[test]
    fn uncompress_roundtrip() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        for sequence in ["AAAAAAAAAA", "AAAACGAAAA", "AANNAAAAAT", "AAARAAAAAA"] {
            let compressed = codec.compress(sequence)?;
            assert_eq!(codec.uncompress(&compressed), *sequence);
        }
        Ok(())
    }

    #[test]
    fn uncompress_masks_render_as_n() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[0, 9], 0.85)?;
        let compressed = codec.compress(&codec.mask().apply("CAAAAAAAAG"))?;
        assert_eq!(codec.uncompress(&compressed), "NAAAAAAAAN");
        Ok(())
    }

    #[test]
    fn double_delta_roundtrip() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        let anchor = codec.compress("AAAACGAAAA")?;
        let x = codec.compress("AAAACGATNA")?;
        let delta = codec.encode_local(&x, "anchor-1", &anchor);
        assert_eq!(delta.anchor(), "anchor-1");
        // Shared variants cancel out. Only position 7 (T) remains.
        assert_eq!(delta.delta_size(), 1);
        assert_eq!(codec.expand(delta, &anchor), x);
        Ok(())
    }

    #[test]
    fn best_anchor_requires_saving() -> Result<()> {
        let codec = codec("AAAAAAAAAA", &[], 0.85)?;
        let anchor = codec.compress("AAAACGAAAA")?;
        let x = codec.compress("AAAACGATAA")?;
        // Only 2 positions saved: below MIN_DELTA_SAVING.
        assert!(codec.best_anchor(&x, [("anchor-1", &anchor)]).is_none());
        Ok(())
    }

    #[test]
    fn best_anchor_prefers_smallest_delta() -> Result<()> {
        let reference: String = std::iter::repeat('A').take(100).collect();
        let codec = codec(&reference, &[], 0.85)?;

        let mut shared: String = reference.clone();
        shared.replace_range(0..40, &"C".repeat(40));

        let mut near: String = shared.clone();      // 40 shared variants.
        near.replace_range(50..51, "T");
        let mut far: String = reference.clone();    // no shared variants.
        far.replace_range(90..92, "GG");

        let x = codec.compress(&shared)?;
        let near = codec.compress(&near)?;
        let far = codec.compress(&far)?;

        let (guid, delta) = codec
            .best_anchor(&x, [("near", &near), ("far", &far)])
            .expect("saving over single-delta expected");
        assert_eq!(guid, "near");
        assert_eq!(delta.delta_size(), 1);
        Ok(())
    }
}
