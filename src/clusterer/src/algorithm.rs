use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use refseq::UncertainClass;

/// Whether mixed sequences may bridge clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MixturePolicy {
    /// Mixed guids cluster like any other.
    IncludeMixed,
    /// Mixed guids are left out of clustering entirely.
    ExcludeMixed,
    /// Mixed guids join adjacent clusters but are never unioned through,
    /// so they cannot merge two clusters (and may sit in several).
    ExcludeMixedFromGrowth,
}

#[derive(Error, Debug)]
#[error("Invalid mixture policy '{0}' (expected 'include_mixed', 'exclude_mixed' or 'exclude_mixed_from_growth')")]
pub struct ParseMixturePolicyError(String);

impl FromStr for MixturePolicy {
    type Err = ParseMixturePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "include_mixed"             => Ok(Self::IncludeMixed),
            "exclude_mixed"             => Ok(Self::ExcludeMixed),
            "exclude_mixed_from_growth" => Ok(Self::ExcludeMixedFromGrowth),
            other                       => Err(ParseMixturePolicyError(other.to_string())),
        }
    }
}

impl Display for MixturePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::IncludeMixed           => "include_mixed",
            Self::ExcludeMixed           => "exclude_mixed",
            Self::ExcludeMixedFromGrowth => "exclude_mixed_from_growth",
        };
        write!(f, "{label}")
    }
}

/// One configured clustering algorithm: single-linkage connected components
/// at an SNV threshold, with a mixture policy and the uncertain character
/// class shared by its distance skip rule and mixture test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAlgorithm {
    pub name           : String,
    pub threshold      : u32,
    pub uncertain_char : UncertainClass,
    pub mixture_policy : MixturePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parse_roundtrip() {
        for policy in [
            MixturePolicy::IncludeMixed,
            MixturePolicy::ExcludeMixed,
            MixturePolicy::ExcludeMixedFromGrowth,
        ] {
            assert_eq!(policy.to_string().parse::<MixturePolicy>().unwrap(), policy);
        }
        assert!("excludeMixed".parse::<MixturePolicy>().is_err());
    }

    #[test]
    fn algorithm_deserializes_from_yaml_shape() {
        let json = serde_json::json!({
            "name": "snp12",
            "threshold": 12,
            "uncertain_char": "N_or_M",
            "mixture_policy": "exclude_mixed_from_growth",
        });
        let algorithm: ClusterAlgorithm = serde_json::from_value(json).unwrap();
        assert_eq!(algorithm.threshold, 12);
        assert_eq!(algorithm.uncertain_char, UncertainClass::NOrM);
        assert_eq!(algorithm.mixture_policy, MixturePolicy::ExcludeMixedFromGrowth);
    }
}
