extern crate config;
extern crate logger;

use config::{Cli, Commands::*, ServerConfig};

#[macro_use]
extern crate log;

use std::error::Error;

pub mod error;
pub use error::CoreError;

pub mod server;
pub use server::{ExcludedNucleotides, InsertReport, ResourceRow, Server};

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.commands {
        Serve { config } => {
            info!("Loading server configuration from '{}'", config.display());
            let config = ServerConfig::from_yaml(&config)?;
            let server = Server::from_config(config)?;
            info!(
                "'{}' ready: {} sequences, snv ceiling {}, {} clustering algorithm(s)",
                server.server_name(),
                server.guids().len(),
                server.snpceiling(),
                server.cluster_algorithms().len(),
            );
            // The REST adapter embeds `Server` as a library; standalone mode
            // just keeps the store open until the process is signalled.
            loop {
                std::thread::park();
            }
        }

        CheckConfig { config } => {
            let config = ServerConfig::from_yaml(&config)?;
            info!("Configuration '{}' is valid", config.server_name);
            Ok(())
        }
    }
}
