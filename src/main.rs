// mirrormediad/src/main.rs
mod cli;
mod config;
mod daemon;
mod defs;
mod paths;
mod raw;
mod resolver;
mod smsdb;
mod utils;
mod wire;
mod zip;

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use config::{CONFIG_FILE_DEFAULT, Config};

fn load_config(cli: &Cli) -> Result<Config> {
    if let Some(config_path) = &cli.config {
        return Config::from_file(config_path);
    }
    match Config::load_default() {
        Ok(config) => Ok(config),
        Err(e) => {
            if Path::new(CONFIG_FILE_DEFAULT).exists() {
                eprintln!("Error loading config: {e:#}");
            }
            Ok(Config::default())
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(command) = &cli.command {
        match command {
            Commands::GenConfig { output } => {
                Config::default().save_to_file(output)?;
                return Ok(());
            }
            Commands::ShowConfig => {
                let config = load_config(&cli)?;
                println!("{}", serde_json::to_string(&config)?);
                return Ok(());
            }
        }
    }

    let mut config = load_config(&cli)?;
    config.merge_with_cli(cli.socket.clone(), cli.stagingdir.clone(), cli.verbose);

    utils::init_logging(config.verbose)?;
    log::info!("mirrormediad starting");

    daemon::run(&config)
}

fn main() {
    if let Err(e) = run() {
        log::error!("Fatal Error: {e:#}");
        eprintln!("Fatal Error: {e:#}");
        std::process::exit(1);
    }
}
