//! Change-log writer
//!
//! The producer-side append path. One writer exists per log; every append
//! is fsynced before the head is published, so a position handed to any
//! reader always addresses a fully durable frame. Rotation happens before
//! an append once the current segment has reached its target size; frames
//! never span segment files.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use super::errors::{LogError, LogResult};
use super::position::LogPosition;
use super::record::{encode_frame, ChangePayload, CommitPayload, RecordBody};
use super::store::{LogStore, SegmentMeta};

/// Appends records to the segmented log with fsync-before-publish.
pub struct LogWriter {
    store: Arc<LogStore>,
    /// Open handle to the active segment, with its start and length
    current: Option<(File, u64, u64)>,
}

impl LogWriter {
    /// Claim the log's single writer handle.
    pub fn new(store: Arc<LogStore>) -> LogResult<Self> {
        store.claim_writer()?;
        let current = match store.last_segment() {
            Some(segment) => {
                let file = OpenOptions::new()
                    .append(true)
                    .open(&segment.path)
                    .map_err(|e| {
                        LogError::append_failed(
                            format!("failed to open segment: {}", segment.path.display()),
                            e,
                        )
                    })?;
                Some((file, segment.start, segment.len))
            }
            None => None,
        };
        Ok(Self { store, current })
    }

    /// Append a BEGIN record for `txn_id`.
    pub fn begin(&mut self, txn_id: u64) -> LogResult<LogPosition> {
        self.append(txn_id, &RecordBody::Begin)
    }

    /// Append a CHANGE record under `txn_id`.
    pub fn change(&mut self, txn_id: u64, payload: ChangePayload) -> LogResult<LogPosition> {
        self.append(txn_id, &RecordBody::Change(payload))
    }

    /// Append an insert change.
    pub fn insert(
        &mut self,
        txn_id: u64,
        table: &str,
        row_key: &str,
        after: Value,
    ) -> LogResult<LogPosition> {
        self.change(txn_id, ChangePayload::insert(table, row_key, after))
    }

    /// Append a COMMIT record stamped with the current wall clock.
    pub fn commit(&mut self, txn_id: u64) -> LogResult<LogPosition> {
        self.commit_at(txn_id, Utc::now().timestamp_millis())
    }

    /// Append a COMMIT record with an explicit timestamp.
    pub fn commit_at(&mut self, txn_id: u64, commit_timestamp_ms: i64) -> LogResult<LogPosition> {
        self.append(
            txn_id,
            &RecordBody::Commit(CommitPayload {
                commit_timestamp_ms,
            }),
        )
    }

    /// Append an ABORT record for `txn_id`.
    pub fn abort(&mut self, txn_id: u64) -> LogResult<LogPosition> {
        self.append(txn_id, &RecordBody::Abort)
    }

    /// Position the next appended record will receive.
    pub fn head(&self) -> LogPosition {
        self.store.head()
    }

    fn append(&mut self, txn_id: u64, body: &RecordBody) -> LogResult<LogPosition> {
        let frame = encode_frame(txn_id, body)?;
        let head = self.store.head().as_u64();

        // Rotate before the write so frames never span segments
        let mut new_segment = None;
        let needs_rotation = match &self.current {
            None => true,
            Some((_, _, len)) => *len >= self.store.segment_size(),
        };
        if needs_rotation {
            let path = self.store.segment_path(head);
            let file = OpenOptions::new()
                .create_new(true)
                .append(true)
                .open(&path)
                .map_err(|e| {
                    LogError::append_failed(
                        format!("failed to create segment: {}", path.display()),
                        e,
                    )
                })?;
            new_segment = Some(SegmentMeta {
                start: head,
                len: 0,
                path,
            });
            self.current = Some((file, head, 0));
        }

        let (file, _, len) = self.current.as_mut().expect("active segment after rotation");

        file.write_all(&frame)
            .map_err(|e| LogError::append_failed("failed to append log frame", e))?;
        // Durability before visibility: readers only see the head after fsync
        file.sync_data()
            .map_err(|e| LogError::fsync_failed("failed to fsync log segment", e))?;

        *len += frame.len() as u64;
        self.store.commit_append(new_segment, frame.len() as u64);

        Ok(LogPosition(head))
    }
}

impl Drop for LogWriter {
    fn drop(&mut self) {
        self.store.release_writer();
    }
}
