//! Transaction reassembler
//!
//! Converts the single interleaved record stream into a stream of complete,
//! commit-ordered transactions. Concurrent transactions' records are
//! physically interleaved in the log; the reassembler buffers each
//! transaction under its id and emits it whole when its commit record
//! arrives. Aborted transactions are dropped without a trace.
//!
//! Records are fed in log-position order, and commit records appear in the
//! log in commit order, so emission order is ascending commit position by
//! construction.
//!
//! # Resume tolerance
//!
//! A session resuming from a slot's restart position may read records of
//! transactions that began before that position and committed at or below
//! the consumer's confirmed position; those were already delivered. When
//! constructed with a tolerance bound, orphan records of such transactions
//! are discarded. An orphan commit above the bound means the begin truly
//! predates the readable log, which is the fatal partial-transaction case.

use std::collections::HashMap;

use crate::log::{LogPosition, RawRecord, RecordBody};

use super::errors::{ReassemblyError, ReassemblyResult};
use super::transaction::{ChangeRecord, Transaction};

struct OpenTransaction {
    begin_position: LogPosition,
    changes: Vec<ChangeRecord>,
}

/// Reassembles interleaved raw records into committed transactions.
pub struct Reassembler {
    /// Open-transaction table keyed by transaction id
    open: HashMap<u64, OpenTransaction>,
    /// Bound on concurrently open transactions
    max_open: usize,
    /// Orphan commits at or below this position belong to transactions
    /// already delivered and acknowledged; they are skipped, not fatal
    tolerate_below: Option<LogPosition>,
    /// Commit position of the most recently emitted transaction
    last_commit: Option<LogPosition>,
}

impl Reassembler {
    /// Create a reassembler for a fresh read starting at a consistent
    /// point (no transaction may straddle the start position).
    pub fn new(max_open: usize) -> Self {
        Self {
            open: HashMap::new(),
            max_open,
            tolerate_below: None,
            last_commit: None,
        }
    }

    /// Create a reassembler for a resumed read.
    ///
    /// `confirmed` is the consumer's acknowledged position: orphan records
    /// committing at or below it are skipped as already delivered.
    pub fn resuming(max_open: usize, confirmed: LogPosition) -> Self {
        Self {
            tolerate_below: Some(confirmed),
            ..Self::new(max_open)
        }
    }

    /// Number of transactions currently buffered.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Oldest position needed to re-decode everything not yet emitted:
    /// the minimum begin among open transactions, if any.
    pub fn open_floor(&self) -> Option<LogPosition> {
        self.open.values().map(|t| t.begin_position).min()
    }

    /// Feed the next raw record in log order.
    ///
    /// Returns a finished transaction when `record` is a commit, `None`
    /// otherwise.
    pub fn feed(&mut self, record: RawRecord) -> ReassemblyResult<Option<Transaction>> {
        match record.body {
            RecordBody::Begin => {
                if self.open.contains_key(&record.txn_id) {
                    return Err(ReassemblyError::InvalidSequence(format!(
                        "duplicate begin for transaction {} at {}",
                        record.txn_id, record.position
                    )));
                }
                if self.open.len() >= self.max_open {
                    return Err(ReassemblyError::OpenTransactionLimit(self.max_open));
                }
                self.open.insert(
                    record.txn_id,
                    OpenTransaction {
                        begin_position: record.position,
                        changes: Vec::new(),
                    },
                );
                Ok(None)
            }

            RecordBody::Change(change) => {
                match self.open.get_mut(&record.txn_id) {
                    Some(open) => {
                        open.changes.push(ChangeRecord {
                            position: record.position,
                            change,
                        });
                        Ok(None)
                    }
                    None if self.tolerate_below.is_some() => {
                        // Orphan change: candidate for an already-delivered
                        // transaction; the verdict comes at its commit
                        Ok(None)
                    }
                    None => Err(ReassemblyError::IncompleteTransaction {
                        txn_id: record.txn_id,
                        commit_position: record.position,
                    }),
                }
            }

            RecordBody::Commit(commit) => match self.open.remove(&record.txn_id) {
                Some(open) => {
                    // Everything at or before this commit is delivered once
                    // acknowledged; only still-open transactions need their
                    // begins re-read on resume
                    let restart_floor = self.open_floor().unwrap_or(record.position);
                    let txn = Transaction {
                        txn_id: record.txn_id,
                        begin_position: open.begin_position,
                        commit_position: record.position,
                        commit_timestamp_ms: commit.commit_timestamp_ms,
                        changes: open.changes,
                        restart_floor: restart_floor.min(record.position),
                    };
                    debug_assert!(
                        self.last_commit.map_or(true, |last| last < txn.commit_position),
                        "commit order regression"
                    );
                    self.last_commit = Some(txn.commit_position);
                    Ok(Some(txn))
                }
                None => {
                    match self.tolerate_below {
                        Some(bound) if record.position <= bound => Ok(None),
                        _ => Err(ReassemblyError::IncompleteTransaction {
                            txn_id: record.txn_id,
                            commit_position: record.position,
                        }),
                    }
                }
            },

            RecordBody::Abort => {
                // Aborted work is discarded whether buffered or orphaned;
                // it was never observable downstream either way
                self.open.remove(&record.txn_id);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{ChangePayload, CommitPayload};
    use serde_json::json;

    fn begin(position: u64, txn_id: u64) -> RawRecord {
        RawRecord {
            position: LogPosition(position),
            txn_id,
            body: RecordBody::Begin,
        }
    }

    fn change(position: u64, txn_id: u64, key: &str) -> RawRecord {
        RawRecord {
            position: LogPosition(position),
            txn_id,
            body: RecordBody::Change(ChangePayload::insert("users", key, json!({"k": key}))),
        }
    }

    fn commit(position: u64, txn_id: u64) -> RawRecord {
        RawRecord {
            position: LogPosition(position),
            txn_id,
            body: RecordBody::Commit(CommitPayload {
                commit_timestamp_ms: 1_000,
            }),
        }
    }

    fn abort(position: u64, txn_id: u64) -> RawRecord {
        RawRecord {
            position: LogPosition(position),
            txn_id,
            body: RecordBody::Abort,
        }
    }

    #[test]
    fn test_interleaved_transactions_emitted_whole_in_commit_order() {
        let mut r = Reassembler::new(16);

        // T1 and T2 physically interleave between positions 90 and 150
        assert!(r.feed(begin(90, 1)).unwrap().is_none());
        assert!(r.feed(begin(92, 2)).unwrap().is_none());
        assert!(r.feed(change(94, 2, "a2")).unwrap().is_none());
        assert!(r.feed(change(96, 1, "a1")).unwrap().is_none());

        let t1 = r.feed(commit(100, 1)).unwrap().unwrap();
        assert_eq!(t1.txn_id, 1);
        assert_eq!(t1.commit_position, LogPosition(100));
        assert_eq!(t1.change_count(), 1);
        assert_eq!(t1.changes[0].change.row_key, "a1");

        assert!(r.feed(change(120, 2, "b2")).unwrap().is_none());
        let t2 = r.feed(commit(150, 2)).unwrap().unwrap();
        assert_eq!(t2.txn_id, 2);
        assert!(t2.commit_position > t1.commit_position);
        let keys: Vec<_> = t2.changes.iter().map(|c| c.change.row_key.as_str()).collect();
        assert_eq!(keys, vec!["a2", "b2"], "changes keep log order");
    }

    #[test]
    fn test_aborted_transaction_never_emitted() {
        let mut r = Reassembler::new(16);

        r.feed(begin(10, 1)).unwrap();
        r.feed(change(12, 1, "x")).unwrap();
        r.feed(change(14, 1, "y")).unwrap();
        assert!(r.feed(abort(16, 1)).unwrap().is_none());
        assert_eq!(r.open_count(), 0);

        // A later transaction is unaffected by the discarded buffer
        r.feed(begin(20, 2)).unwrap();
        r.feed(change(22, 2, "z")).unwrap();
        let t2 = r.feed(commit(24, 2)).unwrap().unwrap();
        assert_eq!(t2.change_count(), 1);
        assert_eq!(t2.commit_position, LogPosition(24));
    }

    #[test]
    fn test_restart_floor_tracks_oldest_open_begin() {
        let mut r = Reassembler::new(16);

        r.feed(begin(10, 1)).unwrap();
        r.feed(begin(20, 2)).unwrap();
        let t1 = r.feed(commit(30, 1)).unwrap().unwrap();
        // T2 (begun at 20) is still open, so re-decoding must restart there
        assert_eq!(t1.restart_floor, LogPosition(20));

        let t2 = r.feed(commit(40, 2)).unwrap().unwrap();
        // Nothing open: the commit position itself is the floor
        assert_eq!(t2.restart_floor, LogPosition(40));
    }

    #[test]
    fn test_open_transaction_limit_fails_fast() {
        let mut r = Reassembler::new(2);
        r.feed(begin(10, 1)).unwrap();
        r.feed(begin(12, 2)).unwrap();
        let err = r.feed(begin(14, 3)).unwrap_err();
        assert!(matches!(err, ReassemblyError::OpenTransactionLimit(2)));
    }

    #[test]
    fn test_orphan_commit_without_tolerance_is_fatal() {
        let mut r = Reassembler::new(16);
        let err = r.feed(commit(100, 7)).unwrap_err();
        assert!(err.is_fatal_for_slot());
    }

    #[test]
    fn test_orphan_commit_below_confirmed_is_skipped_on_resume() {
        let mut r = Reassembler::resuming(16, LogPosition(100));

        // Records of a transaction delivered before the restart point
        assert!(r.feed(change(80, 7, "old")).unwrap().is_none());
        assert!(r.feed(commit(90, 7)).unwrap().is_none());

        // But an orphan commit past the confirmed position is fatal
        assert!(r.feed(change(110, 8, "new")).unwrap().is_none());
        let err = r.feed(commit(120, 8)).unwrap_err();
        assert!(matches!(
            err,
            ReassemblyError::IncompleteTransaction { txn_id: 8, .. }
        ));
    }

    #[test]
    fn test_duplicate_begin_is_invalid_sequence() {
        let mut r = Reassembler::new(16);
        r.feed(begin(10, 1)).unwrap();
        let err = r.feed(begin(12, 1)).unwrap_err();
        assert!(matches!(err, ReassemblyError::InvalidSequence(_)));
    }
}
