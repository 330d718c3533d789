use serde::{Deserialize, Serialize};

use refseq::{CompressedSequence, UncertainClass};

/// Outcome of the mixture assessment of one sequence against the
/// informative columns of its neighbourhood alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixtureStat {
    /// Uncertain calls observed among the alignment columns.
    pub observed      : usize,
    /// Number of alignment columns assessed.
    pub columns       : usize,
    /// Genome-wide rate of uncertain calls for this sequence.
    pub expected_rate : f64,
    /// Upper-tail binomial probability of seeing `observed` or more.
    pub p_value       : f64,
    /// `p_value < alpha`.
    pub mixed         : bool,
}

/// Binomial test for mixed sequences (mixPORE): are uncertain calls
/// over-represented at the variable positions of the alignment, relative to
/// their genome-wide rate? A mixture of two genotypes piles its ambiguity
/// exactly there.
#[derive(Debug, Clone, Copy)]
pub struct MixtureTest {
    class : UncertainClass,
    alpha : f64,
}

impl MixtureTest {
    #[must_use]
    pub fn new(class: UncertainClass, alpha: f64) -> Self {
        Self { class, alpha }
    }

    #[must_use]
    pub fn class(&self) -> UncertainClass {
        self.class
    }

    #[must_use]
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Assess one sequence over the given alignment columns.
    /// `informative_length` is the number of unmasked reference positions,
    /// the denominator of the genome-wide rate.
    #[must_use]
    pub fn assess(
        &self,
        seq: &CompressedSequence,
        columns: &[u32],
        informative_length: usize,
    ) -> MixtureStat {
        let in_class = |position: &u32| {
            (self.class.includes_n() && seq.n_positions().contains(position))
                || (self.class.includes_m() && seq.m_positions().contains_key(position))
        };
        let observed = columns.iter().filter(|p| in_class(p)).count();

        let genome_wide = self.class.includes_n().then(|| seq.n_positions().len()).unwrap_or(0)
            + self.class.includes_m().then(|| seq.m_positions().len()).unwrap_or(0);
        let expected_rate = if informative_length == 0 {
            0.0
        } else {
            genome_wide as f64 / informative_length as f64
        };

        let p_value = binomial_sf(observed, columns.len(), expected_rate);
        MixtureStat {
            observed,
            columns: columns.len(),
            expected_rate,
            p_value,
            mixed: p_value < self.alpha,
        }
    }
}

/// Exact upper tail of the binomial: `P(X >= k)` for `X ~ B(n, p)`.
/// Terms are summed in log space through a factorial prefix table; alignment
/// column counts are small, so the O(n) table costs nothing.
fn binomial_sf(k: usize, n: usize, p: f64) -> f64 {
    if k == 0 || n == 0 {
        return 1.0;
    }
    if p <= 0.0 {
        return 0.0; // k > 0 successes are impossible.
    }
    if p >= 1.0 {
        return 1.0;
    }

    let mut ln_fact = vec![0.0f64; n + 1];
    for i in 1..=n {
        ln_fact[i] = ln_fact[i - 1] + (i as f64).ln();
    }
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());

    let mut tail = 0.0;
    for i in k..=n {
        let ln_term = ln_fact[n] - ln_fact[i] - ln_fact[n - i]
            + i as f64 * ln_p
            + (n - i) as f64 * ln_q;
        tail += ln_term.exp();
    }
    tail.min(1.0)
}
