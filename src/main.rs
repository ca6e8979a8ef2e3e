mod classify;
mod cli;
mod config;
mod mailbox;
mod model;
mod monitor;
mod notify;
mod printer;
mod storage;

use std::process;

use clap::Parser;

use cli::Cli;
use config::Config;
use storage::Storage;

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            process::exit(1);
        }
    };

    let storage = match Storage::open(config.store_path()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to open mission store: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = cli::run(cli.command, &config, &storage) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
