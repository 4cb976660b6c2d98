//! Change-log reader
//!
//! Sequential, position-keyed reads over the segmented log. A reader never
//! skips or reorders frames: every call yields the frame at the reader's
//! position and advances exactly past it. At the head the synchronous path
//! reports `None`; the async path suspends on the store's head watch until
//! the producer appends.
//!
//! Requesting a position below the retained floor fails with
//! `CDC_LOG_POSITION_UNAVAILABLE`; that condition is fatal for the slot
//! driving this reader.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

use tokio::sync::watch;

use super::errors::{LogError, LogResult};
use super::position::LogPosition;
use super::record::{decode_frame, RawRecord};
use super::store::LogStore;

/// Sequential reader over the shared log.
pub struct LogReader {
    store: Arc<LogStore>,
    head_rx: watch::Receiver<u64>,
    /// Position of the next frame to read
    next_position: u64,
    /// Cached handle to the segment currently being read
    current: Option<(File, u64)>,
}

impl LogReader {
    /// Create a reader positioned at `from`.
    pub fn new(store: Arc<LogStore>, from: LogPosition) -> Self {
        let head_rx = store.head_watch();
        Self {
            store,
            head_rx,
            next_position: from.as_u64(),
            current: None,
        }
    }

    /// Position of the next record this reader will yield.
    pub fn position(&self) -> LogPosition {
        LogPosition(self.next_position)
    }

    /// Current log head.
    pub fn head(&self) -> LogPosition {
        self.store.head()
    }

    /// True when the reader has consumed everything durable so far.
    pub fn at_head(&self) -> bool {
        self.next_position >= self.store.head().as_u64()
    }

    /// Reads the frame at the current position.
    ///
    /// Returns `Ok(None)` at the head. Fails with a position-unavailable
    /// error if the position has been recycled, or a corruption error if
    /// the frame is damaged.
    pub fn read_next(&mut self) -> LogResult<Option<RawRecord>> {
        let head = self.store.head().as_u64();
        if self.next_position >= head {
            return Ok(None);
        }

        let floor = self.store.floor().as_u64();
        if self.next_position < floor {
            return Err(LogError::position_unavailable(
                LogPosition(self.next_position),
                LogPosition(floor),
            ));
        }

        let segment = self.store.segment_for(self.next_position).ok_or_else(|| {
            // The containing segment was recycled between the floor check
            // and the lookup
            LogError::position_unavailable(LogPosition(self.next_position), self.store.floor())
        })?;

        if !matches!(self.current, Some((_, start)) if start == segment.start) {
            let file = File::open(&segment.path).map_err(|e| {
                LogError::read_failed(
                    format!("failed to open segment: {}", segment.path.display()),
                    e,
                )
            })?;
            self.current = Some((file, segment.start));
        }
        let (file, seg_start) = self.current.as_mut().expect("segment handle present");

        let offset = self.next_position - *seg_start;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| LogError::read_failed("failed to seek segment", e))?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)
            .map_err(|_| LogError::corruption("frame length truncated"))?;
        let frame_len = u32::from_le_bytes(len_buf) as usize;
        if frame_len < 4 {
            return Err(LogError::corruption(format!(
                "invalid frame length {} at position {}",
                frame_len, self.next_position
            )));
        }

        let mut frame = vec![0u8; frame_len];
        frame[..4].copy_from_slice(&len_buf);
        file.read_exact(&mut frame[4..])
            .map_err(|_| LogError::corruption("frame body truncated"))?;

        let (txn_id, body, consumed) = decode_frame(&frame)?;
        let position = LogPosition(self.next_position);
        self.next_position += consumed as u64;

        // Frames never span segments; crossing the boundary drops the handle
        if self.next_position >= segment.start + segment.len {
            self.current = None;
        }

        Ok(Some(RawRecord {
            position,
            txn_id,
            body,
        }))
    }

    /// Reads the next frame, suspending at the head until new data is
    /// durable.
    pub async fn next_record(&mut self) -> LogResult<RawRecord> {
        loop {
            if let Some(record) = self.read_next()? {
                return Ok(record);
            }
            let target = self.next_position;
            self.head_rx
                .wait_for(|head| *head > target)
                .await
                .map_err(|_| LogError::corruption("log store closed while awaiting head"))?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::writer::LogWriter;
    use super::*;
    use serde_json::json;

    fn seeded_store(dir: &std::path::Path, segment_size: u64) -> Arc<LogStore> {
        let store = Arc::new(LogStore::open(dir, segment_size).unwrap());
        let mut writer = LogWriter::new(store.clone()).unwrap();
        for txn in 1..=4u64 {
            writer.begin(txn).unwrap();
            writer
                .insert(txn, "users", &format!("u{}", txn), json!({"n": txn}))
                .unwrap();
            writer.commit_at(txn, 1_000 + txn as i64).unwrap();
        }
        store
    }

    #[test]
    fn test_reads_in_position_order() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = seeded_store(dir.path(), 1024 * 1024);
        let mut reader = LogReader::new(store, LogPosition::START);

        let mut last = None;
        while let Some(record) = reader.read_next().unwrap() {
            if let Some(prev) = last {
                assert!(record.position > prev, "records must never reorder");
            }
            last = Some(record.position);
        }
        assert!(reader.at_head());
    }

    #[test]
    fn test_read_below_floor_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = seeded_store(dir.path(), 64);
        let head = store.head();
        store.recycle_below(head).unwrap();
        let floor = store.floor();
        assert!(floor > LogPosition(0));

        let mut reader = LogReader::new(store, LogPosition::START);
        let err = reader.read_next().unwrap_err();
        assert!(err.is_fatal_for_slot());
        assert_eq!(err.positions(), Some((LogPosition(0), floor)));
    }

    #[tokio::test]
    async fn test_reader_wakes_on_append() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = Arc::new(LogStore::open(dir.path(), 1024 * 1024).unwrap());
        let mut reader = LogReader::new(store.clone(), LogPosition::START);

        let writer_store = store.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            let mut writer = LogWriter::new(writer_store).unwrap();
            writer.begin(1).unwrap();
        });

        let record = reader.next_record().await.unwrap();
        assert_eq!(record.txn_id, 1);
        handle.await.unwrap();
    }
}
