//! Log positions
//!
//! A `LogPosition` identifies a byte offset in the segmented change log.
//! Positions are totally ordered and strictly increasing in durable write
//! order: for records A and B, `A.position < B.position` iff A was durably
//! written before B. Consumers treat positions as opaque tokens; they only
//! echo back values the engine handed them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Monotonic identifier of a point in the append-only change log.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct LogPosition(pub u64);

impl LogPosition {
    /// Start of the log.
    pub const START: LogPosition = LogPosition(0);

    /// Raw byte offset.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for LogPosition {
    fn from(value: u64) -> Self {
        LogPosition(value)
    }
}

impl fmt::Display for LogPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LogPosition {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(LogPosition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_are_totally_ordered() {
        assert!(LogPosition(10) < LogPosition(11));
        assert!(LogPosition::START < LogPosition(1));
        assert_eq!(LogPosition(42), LogPosition(42));
    }

    #[test]
    fn test_position_parse_roundtrip() {
        let pos = LogPosition(123456);
        let parsed: LogPosition = pos.to_string().parse().unwrap();
        assert_eq!(pos, parsed);
    }
}
