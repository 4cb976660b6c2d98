//! Change-log error types
//!
//! Error codes:
//! - CDC_LOG_READ_FAILED (ERROR severity)
//! - CDC_LOG_APPEND_FAILED (ERROR severity)
//! - CDC_LOG_FSYNC_FAILED (FATAL severity)
//! - CDC_LOG_CORRUPTION (FATAL severity)
//! - CDC_LOG_POSITION_UNAVAILABLE (fatal for the requesting slot)
//!
//! Corruption policy is zero tolerance: no partial decode, no skipping
//! records, no repair attempts.

use std::fmt;
use std::io;

use super::position::LogPosition;

/// Log-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogErrorCode {
    /// Log read or scan failed
    ReadFailed,
    /// Log write failed
    AppendFailed,
    /// Log fsync failed
    FsyncFailed,
    /// Checksum or structural failure
    Corruption,
    /// Requested position lies below the retained floor
    PositionUnavailable,
}

impl LogErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            LogErrorCode::ReadFailed => "CDC_LOG_READ_FAILED",
            LogErrorCode::AppendFailed => "CDC_LOG_APPEND_FAILED",
            LogErrorCode::FsyncFailed => "CDC_LOG_FSYNC_FAILED",
            LogErrorCode::Corruption => "CDC_LOG_CORRUPTION",
            LogErrorCode::PositionUnavailable => "CDC_LOG_POSITION_UNAVAILABLE",
        }
    }
}

impl fmt::Display for LogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Change-log error with full context.
#[derive(Debug)]
pub struct LogError {
    /// Error code
    code: LogErrorCode,
    /// Human-readable message
    message: String,
    /// Requested/floor positions for availability errors
    positions: Option<(LogPosition, LogPosition)>,
    /// Underlying IO error if applicable
    source: Option<io::Error>,
}

impl LogError {
    /// Create a read failure error.
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::ReadFailed,
            message: message.into(),
            positions: None,
            source: Some(source),
        }
    }

    /// Create an append failure error.
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::AppendFailed,
            message: message.into(),
            positions: None,
            source: Some(source),
        }
    }

    /// Create an fsync failure error.
    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: LogErrorCode::FsyncFailed,
            message: message.into(),
            positions: None,
            source: Some(source),
        }
    }

    /// Create a corruption error.
    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: LogErrorCode::Corruption,
            message: message.into(),
            positions: None,
            source: None,
        }
    }

    /// Create a position-unavailable error.
    ///
    /// Raised when a reader requests a position below the retained floor:
    /// the segment holding it has already been recycled. This is fatal for
    /// the requesting slot and requires slot re-creation plus a full
    /// resynchronization of the consumer.
    pub fn position_unavailable(requested: LogPosition, floor: LogPosition) -> Self {
        Self {
            code: LogErrorCode::PositionUnavailable,
            message: format!(
                "position {} is below the retained floor {}",
                requested, floor
            ),
            positions: Some((requested, floor)),
            source: None,
        }
    }

    /// Error code for this error.
    pub fn code(&self) -> LogErrorCode {
        self.code
    }

    /// Requested and floor positions, for availability errors.
    pub fn positions(&self) -> Option<(LogPosition, LogPosition)> {
        self.positions
    }

    /// True if this error permanently invalidates the slot that hit it.
    pub fn is_fatal_for_slot(&self) -> bool {
        matches!(
            self.code,
            LogErrorCode::Corruption | LogErrorCode::PositionUnavailable
        )
    }
}

impl fmt::Display for LogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)?;
        if let Some(source) = &self.source {
            write!(f, " ({})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for LogError {}

/// Result type for log operations
pub type LogResult<T> = Result<T, LogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_unavailable_is_fatal_for_slot() {
        let err = LogError::position_unavailable(LogPosition(30), LogPosition(50));
        assert!(err.is_fatal_for_slot());
        assert_eq!(err.positions(), Some((LogPosition(30), LogPosition(50))));
    }

    #[test]
    fn test_append_failure_is_not_fatal_for_slot() {
        let io = io::Error::new(io::ErrorKind::Other, "disk full");
        assert!(!LogError::append_failed("append", io).is_fatal_for_slot());
    }

    #[test]
    fn test_read_failure_reports_a_read_code() {
        let io = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = LogError::read_failed("open segment", io);
        assert_eq!(err.code().code(), "CDC_LOG_READ_FAILED");
        assert!(!err.is_fatal_for_slot());
    }

    #[test]
    fn test_corruption_is_fatal_for_slot() {
        assert!(LogError::corruption("bad checksum").is_fatal_for_slot());
    }
}
