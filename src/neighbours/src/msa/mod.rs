use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;

use refseq::compressed::Call;
use refseq::{CompressedSequence, RefCodec};

use crate::mixture::{MixtureStat, MixtureTest};

/// One aligned row: the member's calls over the informative columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MsaRow {
    pub aligned : String,
    pub quality : f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mixture : Option<MixtureStat>,
}

/// Per-column base tallies across all rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnCounts {
    pub position : u32,
    pub a        : usize,
    pub c        : usize,
    pub g        : usize,
    pub t        : usize,
    pub n        : usize,
    pub mixed    : usize,
}

/// Multiple sequence alignment over the union of informative positions of a
/// guid set: positions where at least one member departs from the reference
/// or is uncertain. Columns ascend by genome position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Msa {
    pub columns       : Vec<u32>,
    pub rows          : BTreeMap<String, MsaRow>,
    pub column_counts : Vec<ColumnCounts>,
}

/// Builds alignments from expanded sequences. With a [`MixtureTest`]
/// attached, every row also carries its mixture statistics, assessed over
/// the alignment columns.
pub struct MsaBuilder<'a> {
    codec   : &'a RefCodec,
    mixture : Option<&'a MixtureTest>,
}

impl<'a> MsaBuilder<'a> {
    #[must_use]
    pub fn new(codec: &'a RefCodec) -> Self {
        Self { codec, mixture: None }
    }

    #[must_use]
    pub fn with_mixture(codec: &'a RefCodec, test: &'a MixtureTest) -> Self {
        Self { codec, mixture: Some(test) }
    }

    #[must_use]
    pub fn build(&self, members: &[(String, Arc<CompressedSequence>)]) -> Msa {
        let columns: Vec<u32> = members.iter()
            .flat_map(|(_, seq)| seq.variant_positions())
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect();

        let mut rows = BTreeMap::new();
        let mut counts: Vec<ColumnCounts> = columns.iter()
            .map(|&position| ColumnCounts { position, a: 0, c: 0, g: 0, t: 0, n: 0, mixed: 0 })
            .collect();

        for (guid, seq) in members {
            let mut aligned = String::with_capacity(columns.len());
            for (column, tally) in columns.iter().zip(counts.iter_mut()) {
                let rendered = match seq.call_at(*column) {
                    Call::Reference    => char::from(self.codec.reference().base_at(*column)),
                    Call::Alt(base)    => char::from(base),
                    Call::N            => 'N',
                    Call::Mixed(freqs) => freqs.to_iupac().map_or('N', |code| char::from(&code)),
                };
                match rendered {
                    'A' => tally.a += 1,
                    'C' => tally.c += 1,
                    'G' => tally.g += 1,
                    'T' => tally.t += 1,
                    'N' => tally.n += 1,
                    _   => tally.mixed += 1,
                }
                aligned.push(rendered);
            }
            let mixture = self.mixture.map(|test| {
                test.assess(seq, &columns, self.codec.mask().informative_length())
            });
            rows.insert(guid.clone(), MsaRow { aligned, quality: seq.quality(), mixture });
        }

        Msa { columns, rows, column_counts: counts }
    }
}
