//! Apply worker errors

use thiserror::Error;

use crate::encode::EncodeError;

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Decode(#[from] EncodeError),

    /// An insert or update arrived without an after image
    #[error("change for {table}/{key} has no after image")]
    MissingImage { table: String, key: String },

    #[error("apply target failed: {0}")]
    Target(String),
}

pub type ApplyResult<T> = Result<T, ApplyError>;
