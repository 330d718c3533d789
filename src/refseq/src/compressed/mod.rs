use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::base::{Base, BASES};
use crate::iupac::BaseFreqs;

/// The consensus call a compressed sequence assigns to one genome position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Call<'a> {
    /// Matches the reference base.
    Reference,
    /// Differs from the reference with this unambiguous base.
    Alt(Base),
    /// Unknown call.
    N,
    /// Mixed call, with the observed base-frequency record.
    Mixed(&'a BaseFreqs),
}

/// Reference-compressed ("single-delta") form of a consensus sequence.
///
/// - `acgt`    : per-base sets of positions where the consensus differs from
///               the reference with that base. Positions equal to the
///               reference are implicit.
/// - `n`       : positions called `N`.
/// - `m`       : mixed positions, each with its base-frequency record.
/// - `quality` : fraction of unmasked positions carrying a definite base.
/// - `invalid` : too uncertain to take part in distances and clustering.
///
/// Masked positions appear in no set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedSequence {
    acgt    : [BTreeSet<u32>; 4],
    n       : BTreeSet<u32>,
    m       : BTreeMap<u32, BaseFreqs>,
    quality : f64,
    invalid : bool,
}

impl CompressedSequence {
    #[must_use]
    pub fn new(
        acgt    : [BTreeSet<u32>; 4],
        n       : BTreeSet<u32>,
        m       : BTreeMap<u32, BaseFreqs>,
        quality : f64,
        invalid : bool,
    ) -> Self {
        Self { acgt, n, m, quality, invalid }
    }

    #[must_use]
    pub fn positions(&self, base: Base) -> &BTreeSet<u32> {
        &self.acgt[base.index()]
    }

    #[must_use]
    pub fn n_positions(&self) -> &BTreeSet<u32> {
        &self.n
    }

    #[must_use]
    pub fn m_positions(&self) -> &BTreeMap<u32, BaseFreqs> {
        &self.m
    }

    #[must_use]
    pub fn quality(&self) -> f64 {
        self.quality
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    /// Number of uncertain calls (`N` + mixed).
    #[must_use]
    pub fn uncertain_count(&self) -> usize {
        self.n.len() + self.m.len()
    }

    /// Total size of the four base difference sets. This is what double-delta
    /// encoding tries to shrink.
    #[must_use]
    pub fn delta_size(&self) -> usize {
        self.acgt.iter().map(BTreeSet::len).sum()
    }

    /// Every position where this sequence departs from the reference or is
    /// uncertain, ascending.
    #[must_use]
    pub fn variant_positions(&self) -> BTreeSet<u32> {
        let mut positions: BTreeSet<u32> = self.acgt.iter().flatten().copied().collect();
        positions.extend(self.n.iter().copied());
        positions.extend(self.m.keys().copied());
        positions
    }

    /// The call assigned at one position.
    #[must_use]
    pub fn call_at(&self, position: u32) -> Call<'_> {
        if self.n.contains(&position) {
            return Call::N;
        }
        if let Some(freqs) = self.m.get(&position) {
            return Call::Mixed(freqs);
        }
        for base in BASES {
            if self.acgt[base.index()].contains(&position) {
                return Call::Alt(base);
            }
        }
        Call::Reference
    }

    /// True if the position carries `N`, or a mixed call when `count_mixed`
    /// is set. This is the distance skip rule.
    #[must_use]
    pub fn is_uncertain_at(&self, position: u32, count_mixed: bool) -> bool {
        self.n.contains(&position) || (count_mixed && self.m.contains_key(&position))
    }
}

/// Double-delta form: the four base sets re-encoded as symmetric differences
/// against a previously stored anchor sequence. `N`/mixed records and the
/// quality flags are carried verbatim. Expanding against the anchor restores
/// the single-delta form bit-exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaSequence {
    anchor   : String,
    acgt_xor : [BTreeSet<u32>; 4],
    n        : BTreeSet<u32>,
    m        : BTreeMap<u32, BaseFreqs>,
    quality  : f64,
    invalid  : bool,
}

impl DeltaSequence {
    #[must_use]
    pub fn new(
        anchor   : String,
        acgt_xor : [BTreeSet<u32>; 4],
        n        : BTreeSet<u32>,
        m        : BTreeMap<u32, BaseFreqs>,
        quality  : f64,
        invalid  : bool,
    ) -> Self {
        Self { anchor, acgt_xor, n, m, quality, invalid }
    }

    /// Guid of the anchor this delta is expressed against.
    #[must_use]
    pub fn anchor(&self) -> &str {
        &self.anchor
    }

    #[must_use]
    pub fn xor_positions(&self, base: Base) -> &BTreeSet<u32> {
        &self.acgt_xor[base.index()]
    }

    #[must_use]
    pub fn delta_size(&self) -> usize {
        self.acgt_xor.iter().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn quality(&self) -> f64 {
        self.quality
    }

    #[must_use]
    pub fn is_invalid(&self) -> bool {
        self.invalid
    }

    pub(crate) fn into_parts(self) -> ([BTreeSet<u32>; 4], BTreeSet<u32>, BTreeMap<u32, BaseFreqs>, f64, bool) {
        (self.acgt_xor, self.n, self.m, self.quality, self.invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CompressedSequence {
        let mut acgt: [BTreeSet<u32>; 4] = Default::default();
        acgt[Base::C.index()].insert(4);
        acgt[Base::G.index()].insert(5);
        let n = BTreeSet::from([7]);
        let m = BTreeMap::from([(8, BaseFreqs::from_iupac(crate::Iupac::R))]);
        CompressedSequence::new(acgt, n, m, 0.8, false)
    }

    #[test]
    fn calls() {
        let seq = sample();
        assert_eq!(seq.call_at(0), Call::Reference);
        assert_eq!(seq.call_at(4), Call::Alt(Base::C));
        assert_eq!(seq.call_at(5), Call::Alt(Base::G));
        assert_eq!(seq.call_at(7), Call::N);
        assert!(matches!(seq.call_at(8), Call::Mixed(_)));
    }

    #[test]
    fn variant_positions_ascending() {
        let positions: Vec<u32> = sample().variant_positions().into_iter().collect();
        assert_eq!(positions, vec![4, 5, 7, 8]);
    }

    #[test]
    fn uncertainty_rule() {
        let seq = sample();
        assert!(seq.is_uncertain_at(7, false));
        assert!(!seq.is_uncertain_at(8, false));
        assert!(seq.is_uncertain_at(8, true));
        assert!(!seq.is_uncertain_at(4, true));
    }

    #[test]
    fn delta_size_counts_bases_only() {
        assert_eq!(sample().delta_size(), 2);
    }
}
