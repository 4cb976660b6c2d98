//! CLI-specific error types

use std::fmt;

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// Data directory already initialized
    AlreadyInitialized,
    /// Data directory not initialized
    NotInitialized,
    /// Engine failed to open
    BootFailed,
    /// Administrative statement failed
    AdminFailed,
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "CDC_CLI_CONFIG_ERROR",
            Self::AlreadyInitialized => "CDC_CLI_ALREADY_INITIALIZED",
            Self::NotInitialized => "CDC_CLI_NOT_INITIALIZED",
            Self::BootFailed => "CDC_CLI_BOOT_FAILED",
            Self::AdminFailed => "CDC_CLI_ADMIN_FAILED",
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    /// Create a new CLI error
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
