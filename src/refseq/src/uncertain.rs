use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which ambiguity symbols count as uncertain: `N` (unknown), `M` (any IUPAC
/// mixed call), or both. One value drives both the distance skip rule and
/// the mixture test of a clustering algorithm, so the two stay coherent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UncertainClass {
    N,
    M,
    #[serde(rename = "N_or_M")]
    NOrM,
}

impl UncertainClass {
    /// `N` calls are part of this class.
    #[must_use]
    pub fn includes_n(&self) -> bool {
        matches!(self, Self::N | Self::NOrM)
    }

    /// Mixed (IUPAC) calls are part of this class.
    #[must_use]
    pub fn includes_m(&self) -> bool {
        matches!(self, Self::M | Self::NOrM)
    }
}

#[derive(Error, Debug)]
#[error("Invalid uncertain character class '{0}' (expected 'N', 'M' or 'N_or_M')")]
pub struct ParseUncertainClassError(String);

impl FromStr for UncertainClass {
    type Err = ParseUncertainClassError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "N"      => Ok(Self::N),
            "M"      => Ok(Self::M),
            "N_or_M" => Ok(Self::NOrM),
            other    => Err(ParseUncertainClassError(other.to_string())),
        }
    }
}

impl Display for UncertainClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::N    => "N",
            Self::M    => "M",
            Self::NOrM => "N_or_M",
        };
        write!(f, "{label}")
    }
}
