//! Replication slot error types
//!
//! Control-plane misuse (duplicate names, busy slots) is recoverable by the
//! caller. Acknowledgment regressions are protocol errors from the
//! consumer: fatal to the session, never to the slot's durable cursor.

use std::fmt;

use crate::log::LogPosition;

/// Slot error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotErrorKind {
    /// A slot with this name already exists
    DuplicateSlot,

    /// No slot with this name
    SlotNotFound,

    /// Another live session owns the slot
    SlotAlreadyActive,

    /// Drop attempted while a session holds the slot
    SlotBusy,

    /// Acknowledgment moved backwards (consumer protocol error)
    AckRegression,

    /// Durable slot state could not be read or written
    StorageFailed,
}

/// Slot error type
#[derive(Debug)]
pub struct SlotError {
    /// Error kind
    pub kind: SlotErrorKind,
    /// Error message
    pub message: String,
}

impl SlotError {
    /// Create a new slot error.
    pub fn new(kind: SlotErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a duplicate-slot error.
    pub fn duplicate(name: &str) -> Self {
        Self::new(
            SlotErrorKind::DuplicateSlot,
            format!("slot already exists: {}", name),
        )
    }

    /// Create a slot-not-found error.
    pub fn not_found(name: &str) -> Self {
        Self::new(
            SlotErrorKind::SlotNotFound,
            format!("slot not found: {}", name),
        )
    }

    /// Create an already-active error.
    pub fn already_active(name: &str) -> Self {
        Self::new(
            SlotErrorKind::SlotAlreadyActive,
            format!("slot is bound to another session: {}", name),
        )
    }

    /// Create a slot-busy error.
    pub fn busy(name: &str) -> Self {
        Self::new(
            SlotErrorKind::SlotBusy,
            format!("slot is acquired and cannot be dropped: {}", name),
        )
    }

    /// Create an ack-regression error.
    pub fn ack_regression(name: &str, confirmed: LogPosition, requested: LogPosition) -> Self {
        Self::new(
            SlotErrorKind::AckRegression,
            format!(
                "slot {}: acknowledgment at {} regresses below confirmed {}",
                name, requested, confirmed
            ),
        )
    }

    /// Create a storage failure error.
    pub fn storage_failed(message: impl Into<String>) -> Self {
        Self::new(SlotErrorKind::StorageFailed, message)
    }

    /// True if the error is a consumer protocol violation.
    pub fn is_protocol_violation(&self) -> bool {
        self.kind == SlotErrorKind::AckRegression
    }
}

impl fmt::Display for SlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for SlotError {}

/// Result type for slot operations
pub type SlotResult<T> = Result<T, SlotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_regression_is_protocol_violation() {
        let err = SlotError::ack_regression("s", LogPosition(100), LogPosition(50));
        assert!(err.is_protocol_violation());
        assert!(!SlotError::busy("s").is_protocol_violation());
    }
}
