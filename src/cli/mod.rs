//! CLI module for AeroCDC
//!
//! Provides command-line interface for:
//! - init: Create and initialize a data directory
//! - admin: Execute one administrative statement
//! - slots: List slots and their cursors
//! - publications: List publications

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{admin, init, publications, slots};
pub use errors::{CliError, CliErrorCode, CliResult};

/// Parse arguments and dispatch to the selected command.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match cli.command {
        Command::Init { data_dir } => init(&data_dir),
        Command::Admin {
            data_dir,
            statement,
        } => admin(&data_dir, &statement),
        Command::Slots { data_dir } => slots(&data_dir),
        Command::Publications { data_dir } => publications(&data_dir),
    }
}
