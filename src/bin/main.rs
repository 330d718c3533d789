use config::Cli;
use logger::Logger;

use std::process;
use clap::Parser;

#[macro_use]
extern crate log;

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Parse command line arguments and run `snvnet_rs::run()`
fn main() {
    // ----------------------------- Run CLI Parser
    let cli = Cli::parse();
    // ----------------------------- Init logger.
    Logger::init(cli.verbose + u8::from(!cli.quiet));
    // ----------------------------- Run the engine.
    match snvnet_rs::run(cli) {
        Ok(()) => (),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
}
