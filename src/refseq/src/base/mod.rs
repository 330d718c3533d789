mod error;
use std::{fmt::{Debug, Display}, str::FromStr};

pub use error::ParseBaseError;

use serde::{Deserialize, Serialize};

/// One of the four unambiguous nucleotides of a consensus call.
/// Unknown (`N`) and mixed (IUPAC ambiguity) calls are handled separately,
/// by the encoder.
#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Serialize, Deserialize)]
pub enum Base { A, C, G, T }

/// Every `Base`, in encoding order. Indexes the per-base position sets of a
/// compressed sequence.
pub const BASES: [Base; 4] = [Base::A, Base::C, Base::G, Base::T];

impl From<&Base> for char {
    fn from(value: &Base) -> Self {
        match value {
            Base::A => 'A',
            Base::C => 'C',
            Base::G => 'G',
            Base::T => 'T',
        }
    }
}

impl From<Base> for char {
    fn from(value: Base) -> Self {
        char::from(&value)
    }
}

impl TryFrom<char> for Base {
    type Error = ParseBaseError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        use self::Base::*;
        match value {
            'A' => Ok(A),
            'C' => Ok(C),
            'G' => Ok(G),
            'T' => Ok(T),
             c  => Err(ParseBaseError(c)),
        }
    }
}

impl FromStr for Base {
    type Err = ParseBaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let char = s.parse::<char>().map_err(|_| ParseBaseError('\0'))?;
        Self::try_from(char)
    }
}

impl Display for Base {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&char::from(self), f)
    }
}

impl Base {
    /// Index of this base within [`BASES`] and within the per-base sets of a
    /// compressed sequence.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Base::A => 0,
            Base::C => 1,
            Base::G => 2,
            Base::T => 3,
        }
    }
}
