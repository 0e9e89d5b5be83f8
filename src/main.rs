mod aggregate;
mod cli;
mod config;
mod engine;
mod event;
mod model;
mod notify;
mod pipeline;
mod publish;
mod store;
mod strategy;
mod time;
mod workspace;

use std::{io, process};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;
use config::Config;

fn main() {
    let cli = Cli::parse();

    let config = if cli.command.needs_config() {
        match Config::load(cli.config.as_deref()) {
            Ok(c) => Some(c),
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                process::exit(1);
            }
        }
    } else {
        None
    };

    init_tracing(config.as_ref().is_some_and(|c| c.debug));

    if let Err(e) = cli::run(cli, config) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Log to stderr. `RUST_LOG` wins over the config's `debug` flag.
fn init_tracing(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
