//! Publication errors

use thiserror::Error;

/// Result type for publication operations
pub type PublicationResult<T> = Result<T, PublicationError>;

/// Publication errors
#[derive(Debug, Error)]
pub enum PublicationError {
    /// A publication with this name already exists
    #[error("Publication already exists: {0}")]
    DuplicatePublication(String),

    /// No publication with this name
    #[error("Publication not found: {0}")]
    PublicationNotFound(String),

    /// Invalid table selector or filter definition
    #[error("Invalid publication definition: {0}")]
    InvalidDefinition(String),

    /// Persisted publication state could not be read or written
    #[error("Publication storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// Persisted publication state is not valid JSON
    #[error("Publication state corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}
