use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file '{path}'")]
    ReadFile { path: String, #[source] source: std::io::Error },

    #[error("Failed to parse configuration file '{path}'")]
    ParseYaml { path: String, #[source] source: serde_yaml::Error },

    #[error("Failed to serialize the configuration")]
    Serialize(#[source] serde_yaml::Error),

    #[error("'{field}' must lie in [0, 1], got {value}")]
    InvalidProportion { field: &'static str, value: f64 },

    #[error("'mixture_alpha' must lie in (0, 1), got {0}")]
    InvalidAlpha(f64),

    #[error("'working_set_capacity' must be at least 1")]
    ZeroCapacity,

    #[error("A clustering algorithm has an empty name")]
    EmptyAlgorithmName,

    #[error("Clustering algorithm '{0}' is configured twice")]
    DuplicateAlgorithm(String),

    #[error("Clustering '{name}' has threshold {threshold} above the snv ceiling {ceiling}: its edges would never be stored")]
    ThresholdAboveCeiling { name: String, threshold: u32, ceiling: u32 },
}
