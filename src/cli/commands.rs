//! CLI command implementations
//!
//! Each command loads (or creates) the engine configuration, opens the
//! engine over the data directory, and performs one operation. The CLI
//! holds no state of its own; everything durable lives under the data
//! directory.

use std::path::Path;

use crate::config::EngineConfig;
use crate::engine::CdcEngine;

use super::errors::{CliError, CliErrorCode, CliResult};

/// Initialize a new data directory with default configuration.
pub fn init(data_dir: &Path) -> CliResult<()> {
    if EngineConfig::file_path(data_dir).exists() {
        return Err(CliError::new(
            CliErrorCode::AlreadyInitialized,
            format!("data directory already initialized: {}", data_dir.display()),
        ));
    }

    let config = EngineConfig::new(data_dir);
    config
        .save()
        .map_err(|e| CliError::new(CliErrorCode::ConfigError, e.to_string()))?;

    // Open once so the log, slot, and publication directories exist
    open_engine(data_dir)?;
    println!("initialized {}", data_dir.display());
    Ok(())
}

/// Execute one administrative statement.
pub fn admin(data_dir: &Path, statement: &str) -> CliResult<()> {
    let engine = open_engine(data_dir)?;
    let summary = crate::admin::execute(&engine, statement)
        .map_err(|e| CliError::new(CliErrorCode::AdminFailed, e.to_string()))?;
    println!("{}", summary);
    Ok(())
}

/// List slots with their cursors.
pub fn slots(data_dir: &Path) -> CliResult<()> {
    let engine = open_engine(data_dir)?;
    let names = engine.slots().names();
    if names.is_empty() {
        println!("no slots");
        return Ok(());
    }
    for name in names {
        if let Some(slot) = engine.slots().get(&name) {
            println!(
                "{}  publication={}  encoder={}  restart={}  confirmed={}  active={}",
                slot.name,
                slot.publication,
                slot.encoder,
                slot.restart_position,
                slot.confirmed_position,
                slot.owner_session_id.is_some(),
            );
        }
    }
    Ok(())
}

/// List publications.
pub fn publications(data_dir: &Path) -> CliResult<()> {
    let engine = open_engine(data_dir)?;
    let names = engine.publications().names();
    if names.is_empty() {
        println!("no publications");
        return Ok(());
    }
    for name in names {
        println!("{}", name);
    }
    Ok(())
}

fn open_engine(data_dir: &Path) -> CliResult<CdcEngine> {
    let config = if EngineConfig::file_path(data_dir).exists() {
        EngineConfig::load(data_dir)
            .map_err(|e| CliError::new(CliErrorCode::ConfigError, e.to_string()))?
    } else if data_dir.exists() {
        EngineConfig::new(data_dir)
    } else {
        return Err(CliError::new(
            CliErrorCode::NotInitialized,
            format!("data directory not initialized: {}", data_dir.display()),
        ));
    };

    CdcEngine::open(config).map_err(|e| CliError::new(CliErrorCode::BootFailed, e.to_string()))
}
