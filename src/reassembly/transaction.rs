//! Reassembled transactions
//!
//! A `Transaction` is the unit everything downstream of the reassembler
//! operates on: a fully committed, commit-ordered group of changes. It is
//! only ever constructed once its commit record has been read; uncommitted
//! or aborted work is never observable here.

use crate::log::{ChangePayload, LogPosition};

/// One change record inside a committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRecord {
    /// Log position of the change record
    pub position: LogPosition,
    /// The row-level change
    pub change: ChangePayload,
}

/// A complete, committed transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Transaction id from the log
    pub txn_id: u64,
    /// Position of the begin record
    pub begin_position: LogPosition,
    /// Position of the commit record; transactions are emitted in strictly
    /// ascending commit position order
    pub commit_position: LogPosition,
    /// Commit wall-clock timestamp, milliseconds since the Unix epoch
    pub commit_timestamp_ms: i64,
    /// Changes in log order
    pub changes: Vec<ChangeRecord>,
    /// Oldest position a reader must rewind to in order to re-decode this
    /// transaction and everything after it: the minimum begin position of
    /// transactions still open at this commit, or the commit position
    /// itself when none are open
    pub restart_floor: LogPosition,
}

impl Transaction {
    /// True when filtering removed every change.
    ///
    /// Empty transactions still travel to the session as positioned commit
    /// markers so the slot can advance past filtered-out work.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changes.
    pub fn change_count(&self) -> usize {
        self.changes.len()
    }
}
