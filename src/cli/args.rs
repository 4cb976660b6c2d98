//! CLI argument definitions using clap
//!
//! Commands:
//! - aerocdc init --data-dir <path>
//! - aerocdc admin --data-dir <path> <statement>
//! - aerocdc slots --data-dir <path>
//! - aerocdc publications --data-dir <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// AeroCDC - A strict, deterministic change data capture engine
#[derive(Parser, Debug)]
#[command(name = "aerocdc")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Initialize a new AeroCDC data directory
    Init {
        /// Data directory to create
        #[arg(long, default_value = "./aerocdc-data")]
        data_dir: PathBuf,
    },

    /// Execute one administrative statement and exit
    Admin {
        /// Data directory
        #[arg(long, default_value = "./aerocdc-data")]
        data_dir: PathBuf,

        /// Statement, e.g. "CREATE SLOT s FOR p AT 0"
        statement: String,
    },

    /// List replication slots and their cursors
    Slots {
        /// Data directory
        #[arg(long, default_value = "./aerocdc-data")]
        data_dir: PathBuf,
    },

    /// List publications
    Publications {
        /// Data directory
        #[arg(long, default_value = "./aerocdc-data")]
        data_dir: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
