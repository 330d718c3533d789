use std::{fs::File, path::PathBuf};

use clap::{Parser, Subcommand};
use log::debug;
use serde::{Deserialize, Serialize};

use clusterer::ClusterAlgorithm;
use refseq::UncertainClass;

mod error;
pub use error::ConfigError;

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(name="snvnet-rs", author, version, about, long_about = None)]
#[clap(propagate_version = true)]
/// SNVNET-rs: sparse SNV distance matrix and clustering server
pub struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    ///
    /// Each occurrence raises the level by one: -v shows info, -vv debug,
    /// -vvv trace. Warnings are printed regardless of this flag; silence
    /// them with --quiet.
    #[clap(short='v', long, parse(from_occurrences), global=true)]
    pub verbose: u8,

    /// Log errors only.
    ///
    /// Suppresses the warnings that are otherwise emitted even without
    /// --verbose.
    #[clap(short='q', long, global=true)]
    pub quiet: bool,

    #[clap(subcommand)]
    pub commands: Commands,
}

#[derive(Subcommand, Debug, Serialize, Deserialize)]
pub enum Commands {
    /// Run the comparison and clustering engine.
    Serve {
        /// Path of the YAML server configuration.
        #[clap(short, long)]
        config: PathBuf,
    },
    /// Parse and validate a configuration file, then exit.
    CheckConfig {
        /// Path of the YAML server configuration.
        #[clap(short, long)]
        config: PathBuf,
    },
}

fn default_server_name() -> String { String::from("snvnet") }
fn default_snv_ceiling() -> u32 { 20 }
fn default_max_n_percent() -> f64 { 0.85 }
fn default_mixture_alpha() -> f64 { 1e-5 }
fn default_working_set_capacity() -> usize { 512 }
fn default_uncertain_char() -> UncertainClass { UncertainClass::N }

/// Recognized server options, loaded from a YAML file.
///
/// `reference_fasta` and the optional `mask_file` are the operational inputs
/// every deployment carries; `data_dir` selects the file-backed store (an
/// in-memory store is used when it is absent).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub server_name          : String,
    #[serde(default)]
    pub description          : String,
    pub reference_fasta      : PathBuf,
    #[serde(default)]
    pub mask_file            : Option<PathBuf>,
    #[serde(default)]
    pub data_dir             : Option<PathBuf>,
    /// Maximum stored SNV distance. Pairs farther apart are absent from the
    /// sparse matrix.
    #[serde(default = "default_snv_ceiling")]
    pub snv_ceiling          : u32,
    /// Sequences with a higher proportion of uncertain calls are flagged
    /// invalid and excluded from edges and clustering.
    #[serde(default = "default_max_n_percent")]
    pub max_n_percent        : f64,
    /// Significance threshold of the mixture test.
    #[serde(default = "default_mixture_alpha")]
    pub mixture_alpha        : f64,
    /// Uncertain character class of the distance skip rule. Clustering
    /// algorithms carry their own class for their mixture tests.
    #[serde(default = "default_uncertain_char")]
    pub uncertain_char       : UncertainClass,
    /// Soft upper bound on rehydrated sequences held in RAM.
    #[serde(default = "default_working_set_capacity")]
    pub working_set_capacity : usize,
    /// Enables `reset`, `server_config` and `raise_error`.
    #[serde(default)]
    pub debug_mode           : bool,
    #[serde(default)]
    pub clustering           : Vec<ClusterAlgorithm>,
}

impl ServerConfig {
    /// Load and validate a configuration file.
    pub fn from_yaml(path: &PathBuf) -> Result<Self, ConfigError> {
        let file = File::open(path).map_err(|source| ConfigError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        let config: ServerConfig = serde_yaml::from_reader(file).map_err(|source| ConfigError::ParseYaml {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        debug!("Loaded server configuration '{}' from '{}'", config.server_name, path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_n_percent) {
            return Err(ConfigError::InvalidProportion { field: "max_n_percent", value: self.max_n_percent });
        }
        if !(self.mixture_alpha > 0.0 && self.mixture_alpha < 1.0) {
            return Err(ConfigError::InvalidAlpha(self.mixture_alpha));
        }
        if self.working_set_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        let mut seen = Vec::with_capacity(self.clustering.len());
        for algorithm in &self.clustering {
            if algorithm.name.is_empty() {
                return Err(ConfigError::EmptyAlgorithmName);
            }
            if seen.contains(&&algorithm.name) {
                return Err(ConfigError::DuplicateAlgorithm(algorithm.name.clone()));
            }
            seen.push(&algorithm.name);
            if algorithm.threshold > self.snv_ceiling {
                return Err(ConfigError::ThresholdAboveCeiling {
                    name      : algorithm.name.clone(),
                    threshold : algorithm.threshold,
                    ceiling   : self.snv_ceiling,
                });
            }
        }
        Ok(())
    }

    /// Serialize back to YAML, for the debug-mode configuration echo.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(ConfigError::Serialize)
    }
}
