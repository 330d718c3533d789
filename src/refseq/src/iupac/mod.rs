mod error;
use std::fmt::Display;

pub use error::ParseIupacError;

use serde::{Deserialize, Serialize};

use crate::base::{Base, BASES};

/// IUPAC ambiguity code of a mixed consensus call. `N` is kept out of this
/// enum: an `N` carries no base information and is tracked in its own
/// position set.
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum Iupac { R, Y, S, W, K, M, B, D, H, V }

impl Iupac {
    /// The unambiguous bases covered by this code.
    #[must_use]
    pub fn bases(&self) -> &'static [Base] {
        use Base::*;
        match self {
            Iupac::R => &[A, G],
            Iupac::Y => &[C, T],
            Iupac::S => &[C, G],
            Iupac::W => &[A, T],
            Iupac::K => &[G, T],
            Iupac::M => &[A, C],
            Iupac::B => &[C, G, T],
            Iupac::D => &[A, G, T],
            Iupac::H => &[A, C, T],
            Iupac::V => &[A, C, G],
        }
    }

    /// The code covering exactly the given base combination, if one exists.
    #[must_use]
    pub fn from_bases(bases: &[Base]) -> Option<Iupac> {
        const ALL: [Iupac; 10] = [
            Iupac::R, Iupac::Y, Iupac::S, Iupac::W, Iupac::K,
            Iupac::M, Iupac::B, Iupac::D, Iupac::H, Iupac::V,
        ];
        let mut sorted = bases.to_vec();
        sorted.sort();
        sorted.dedup();
        ALL.into_iter().find(|code| code.bases() == sorted.as_slice())
    }
}

impl From<&Iupac> for char {
    fn from(value: &Iupac) -> Self {
        match value {
            Iupac::R => 'R',
            Iupac::Y => 'Y',
            Iupac::S => 'S',
            Iupac::W => 'W',
            Iupac::K => 'K',
            Iupac::M => 'M',
            Iupac::B => 'B',
            Iupac::D => 'D',
            Iupac::H => 'H',
            Iupac::V => 'V',
        }
    }
}

impl TryFrom<char> for Iupac {
    type Error = ParseIupacError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        use self::Iupac::*;
        match value {
            'R' => Ok(R),
            'Y' => Ok(Y),
            'S' => Ok(S),
            'W' => Ok(W),
            'K' => Ok(K),
            'M' => Ok(M),
            'B' => Ok(B),
            'D' => Ok(D),
            'H' => Ok(H),
            'V' => Ok(V),
             c  => Err(ParseIupacError(c)),
        }
    }
}

impl Display for Iupac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&char::from(self), f)
    }
}

/// Ordered base-call frequency record of a mixed position: `(fA, fC, fG, fT)`,
/// summing to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseFreqs(pub [f64; 4]);

impl BaseFreqs {
    /// Uniform frequencies over the bases covered by an ambiguity code.
    #[must_use]
    pub fn from_iupac(code: Iupac) -> Self {
        let bases = code.bases();
        let share = 1.0 / bases.len() as f64;
        let mut freqs = [0.0; 4];
        for base in bases {
            freqs[base.index()] = share;
        }
        Self(freqs)
    }

    /// The ambiguity code whose support matches the positive frequencies.
    /// Returns `None` for degenerate records (fewer than two positive bases).
    #[must_use]
    pub fn to_iupac(&self) -> Option<Iupac> {
        let support: Vec<Base> = BASES.iter()
            .filter(|base| self.0[base.index()] > 0.0)
            .copied()
            .collect();
        Iupac::from_bases(&support)
    }

    #[must_use]
    pub fn freq(&self, base: Base) -> f64 {
        self.0[base.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Iupac; 10] = [
        Iupac::R, Iupac::Y, Iupac::S, Iupac::W, Iupac::K,
        Iupac::M, Iupac::B, Iupac::D, Iupac::H, Iupac::V,
    ];

    #[test]
    fn char_roundtrip() {
        for code in ALL {
            assert_eq!(Iupac::try_from(char::from(&code)).unwrap(), code);
        }
    }

    #[test]
    fn reject_plain_bases() {
        for c in ['A', 'C', 'G', 'T', 'N'] {
            assert!(Iupac::try_from(c).is_err());
        }
    }

    #[test]
    fn freqs_roundtrip() {
        for code in ALL {
            let freqs = BaseFreqs::from_iupac(code);
            assert_eq!(freqs.to_iupac(), Some(code));
            let total: f64 = freqs.0.iter().sum();
            float_cmp::assert_approx_eq!(f64, total, 1.0, ulps = 2);
        }
    }

    #[test]
    fn freqs_share() {
        let freqs = BaseFreqs::from_iupac(Iupac::R);
        assert_eq!(freqs.freq(Base::A), 0.5);
        assert_eq!(freqs.freq(Base::G), 0.5);
        assert_eq!(freqs.freq(Base::C), 0.0);
    }
}
