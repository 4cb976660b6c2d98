//! Transaction reassembly errors

use thiserror::Error;

use crate::log::LogPosition;

/// Result type for reassembly operations
pub type ReassemblyResult<T> = Result<T, ReassemblyError>;

/// Reassembly errors
#[derive(Debug, Clone, Error)]
pub enum ReassemblyError {
    /// Too many concurrently open transactions buffered.
    ///
    /// Protects against one abandoned long transaction exhausting memory;
    /// the pipeline fails fast instead of growing without bound.
    #[error("Open transaction limit exceeded (max: {0})")]
    OpenTransactionLimit(usize),

    /// A commit was read for a transaction whose begin lies outside the
    /// readable log. Emitting it would be silent partial replication, so
    /// the slot fails instead.
    #[error("Transaction {txn_id} committed at {commit_position} but its begin predates the readable log")]
    IncompleteTransaction {
        /// Transaction missing its begin
        txn_id: u64,
        /// Where the orphan commit was read
        commit_position: LogPosition,
    },

    /// Structurally impossible record sequence (for example, two begins for
    /// one transaction id). The log itself is damaged.
    #[error("Invalid record sequence: {0}")]
    InvalidSequence(String),
}

impl ReassemblyError {
    /// True if this error permanently invalidates the slot that hit it.
    pub fn is_fatal_for_slot(&self) -> bool {
        matches!(
            self,
            ReassemblyError::IncompleteTransaction { .. } | ReassemblyError::InvalidSequence(_)
        )
    }
}
