// mirrormediad/src/cli.rs
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CONFIG_FILE_DEFAULT;

#[derive(Parser, Debug)]
#[command(name = "mirrormediad", version, about = "Private app-data backup/restore daemon")]
pub struct Cli {
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    #[arg(short = 's', long = "socket")]
    pub socket: Option<String>,
    #[arg(short = 't', long = "stagingdir")]
    pub stagingdir: Option<PathBuf>,
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default configuration to a file
    GenConfig {
        #[arg(short = 'o', long = "output", default_value = CONFIG_FILE_DEFAULT)]
        output: PathBuf,
    },
    /// Print the effective configuration as JSON
    ShowConfig,
}
