//! Segmented change-log store
//!
//! The log lives in `<data_dir>/log/` as a series of contiguous segment
//! files named `segment-<start-position>.log`. Segment starts are global
//! byte offsets: each segment begins exactly where the previous one ended,
//! so a `LogPosition` addresses a unique frame in a unique segment.
//!
//! Opening the store replays and checksum-validates every segment. Any
//! structural damage halts with an explicit corruption error; there is no
//! partial replay and no repair.
//!
//! Segments are the unit of retention. `recycle_below` removes whole
//! segments that lie entirely below the retention floor and is only ever
//! invoked through the slot manager's retention sink.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use tokio::sync::watch;

use super::errors::{LogError, LogResult};
use super::position::LogPosition;
use super::record::decode_frame;

/// Metadata for one segment file.
#[derive(Debug, Clone)]
pub(super) struct SegmentMeta {
    /// Global position of the segment's first byte
    pub start: u64,
    /// Bytes currently in the segment
    pub len: u64,
    /// Segment file path
    pub path: PathBuf,
}

impl SegmentMeta {
    fn end(&self) -> u64 {
        self.start + self.len
    }
}

#[derive(Debug)]
struct LogState {
    /// Segments sorted by start position; contiguous
    segments: Vec<SegmentMeta>,
    /// Position one past the last durable record
    head: u64,
}

/// Shared handle to the segmented log.
///
/// Many readers may consume the log concurrently at independent positions;
/// exactly one writer appends.
pub struct LogStore {
    dir: PathBuf,
    segment_size: u64,
    state: RwLock<LogState>,
    head_tx: watch::Sender<u64>,
    writer_taken: AtomicBool,
}

impl LogStore {
    /// Opens (or initializes) the log directory under `data_dir`.
    ///
    /// Every existing segment is fully decoded and checksum-verified.
    /// Trailing garbage, gaps between segments, or any frame-level damage
    /// is a fatal corruption error.
    pub fn open(data_dir: &Path, segment_size: u64) -> LogResult<Self> {
        let dir = data_dir.join("log");
        fs::create_dir_all(&dir).map_err(|e| {
            LogError::append_failed(
                format!("failed to create log directory: {}", dir.display()),
                e,
            )
        })?;

        let mut segments = Self::scan_segments(&dir)?;
        segments.sort_by_key(|s| s.start);

        // Contiguity: each segment starts where the previous one ended
        for pair in segments.windows(2) {
            if pair[0].end() != pair[1].start {
                return Err(LogError::corruption(format!(
                    "gap in log: segment at {} ends at {}, next starts at {}",
                    pair[0].start,
                    pair[0].end(),
                    pair[1].start
                )));
            }
        }

        let head = segments.last().map(|s| s.end()).unwrap_or(0);
        let (head_tx, _) = watch::channel(head);

        Ok(Self {
            dir,
            segment_size,
            state: RwLock::new(LogState { segments, head }),
            head_tx,
            writer_taken: AtomicBool::new(false),
        })
    }

    fn scan_segments(dir: &Path) -> LogResult<Vec<SegmentMeta>> {
        let mut segments = Vec::new();
        let entries = fs::read_dir(dir).map_err(|e| {
            LogError::read_failed(format!("failed to read log dir: {}", dir.display()), e)
        })?;

        for entry in entries {
            let entry = entry
                .map_err(|e| LogError::read_failed("failed to read log dir entry", e))?;
            let path = entry.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name,
                None => continue,
            };
            let Some(start) = parse_segment_name(name) else {
                continue;
            };

            let len = Self::validate_segment(&path, start)?;
            segments.push(SegmentMeta { start, len, path });
        }

        Ok(segments)
    }

    /// Decode every frame in a segment, returning its validated length.
    fn validate_segment(path: &Path, start: u64) -> LogResult<u64> {
        let data = fs::read(path).map_err(|e| {
            LogError::read_failed(format!("failed to read segment: {}", path.display()), e)
        })?;

        let mut offset = 0usize;
        while offset < data.len() {
            let (_, _, consumed) = decode_frame(&data[offset..]).map_err(|e| {
                LogError::corruption(format!(
                    "segment {} corrupt at position {}: {}",
                    path.display(),
                    start + offset as u64,
                    e
                ))
            })?;
            offset += consumed;
        }

        Ok(data.len() as u64)
    }

    /// Current head: the position one past the last durable record.
    pub fn head(&self) -> LogPosition {
        LogPosition(self.state.read().expect("log state lock poisoned").head)
    }

    /// Oldest retained position. Equal to head when the log is empty.
    pub fn floor(&self) -> LogPosition {
        let state = self.state.read().expect("log state lock poisoned");
        LogPosition(state.segments.first().map(|s| s.start).unwrap_or(state.head))
    }

    /// Watch channel following the head position.
    pub fn head_watch(&self) -> watch::Receiver<u64> {
        self.head_tx.subscribe()
    }

    /// Segment metadata for the segment containing `position`, if retained.
    pub(super) fn segment_for(&self, position: u64) -> Option<SegmentMeta> {
        let state = self.state.read().expect("log state lock poisoned");
        state
            .segments
            .iter()
            .find(|s| s.start <= position && position < s.end())
            .cloned()
    }

    /// Claim the single writer handle. Fails if already claimed.
    pub(super) fn claim_writer(&self) -> LogResult<()> {
        if self.writer_taken.swap(true, Ordering::SeqCst) {
            return Err(LogError::corruption(
                "log writer already claimed: the log is single-writer",
            ));
        }
        Ok(())
    }

    pub(super) fn release_writer(&self) {
        self.writer_taken.store(false, Ordering::SeqCst);
    }

    /// Last segment metadata, for the writer to resume appending.
    pub(super) fn last_segment(&self) -> Option<SegmentMeta> {
        self.state
            .read()
            .expect("log state lock poisoned")
            .segments
            .last()
            .cloned()
    }

    /// Segment size threshold for rotation.
    pub(super) fn segment_size(&self) -> u64 {
        self.segment_size
    }

    /// Path for a segment starting at `start`.
    pub(super) fn segment_path(&self, start: u64) -> PathBuf {
        self.dir.join(format!("segment-{:020}.log", start))
    }

    /// Record a durable append and publish the new head.
    ///
    /// Called by the writer after the frame has been fsynced.
    pub(super) fn commit_append(&self, new_segment: Option<SegmentMeta>, appended: u64) {
        let head = {
            let mut state = self.state.write().expect("log state lock poisoned");
            if let Some(segment) = new_segment {
                state.segments.push(segment);
            }
            let last = state
                .segments
                .last_mut()
                .expect("append without a segment");
            last.len += appended;
            state.head += appended;
            state.head
        };
        let _ = self.head_tx.send(head);
    }

    /// Recycle segments lying entirely below `floor`.
    ///
    /// The newest segment is never removed, even when fully acknowledged,
    /// so the head position always stays addressable. Returns the number of
    /// segments removed.
    pub fn recycle_below(&self, floor: LogPosition) -> LogResult<usize> {
        let mut removed_paths = Vec::new();
        {
            let mut state = self.state.write().expect("log state lock poisoned");
            while state.segments.len() > 1 {
                let first = &state.segments[0];
                if first.end() <= floor.0 {
                    removed_paths.push(state.segments.remove(0).path);
                } else {
                    break;
                }
            }
        }

        for path in &removed_paths {
            fs::remove_file(path).map_err(|e| {
                LogError::append_failed(
                    format!("failed to recycle segment: {}", path.display()),
                    e,
                )
            })?;
        }

        Ok(removed_paths.len())
    }
}

fn parse_segment_name(name: &str) -> Option<u64> {
    let start = name.strip_prefix("segment-")?.strip_suffix(".log")?;
    start.parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::super::record::{encode_frame, RecordBody};
    use super::*;

    fn write_segment(dir: &Path, start: u64, frames: &[Vec<u8>]) {
        let seg_dir = dir.join("log");
        fs::create_dir_all(&seg_dir).unwrap();
        let path = seg_dir.join(format!("segment-{:020}.log", start));
        let bytes: Vec<u8> = frames.iter().flatten().copied().collect();
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn test_open_empty_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), 1024).unwrap();
        assert_eq!(store.head(), LogPosition(0));
        assert_eq!(store.floor(), LogPosition(0));
    }

    #[test]
    fn test_open_validates_existing_segments() {
        let dir = tempfile::TempDir::new().unwrap();
        let frame = encode_frame(1, &RecordBody::Begin).unwrap();
        let frame_len = frame.len() as u64;
        write_segment(dir.path(), 0, &[frame]);

        let store = LogStore::open(dir.path(), 1024).unwrap();
        assert_eq!(store.head(), LogPosition(frame_len));
    }

    #[test]
    fn test_open_rejects_corrupt_segment() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut frame = encode_frame(1, &RecordBody::Begin).unwrap();
        let mid = frame.len() / 2;
        frame[mid] ^= 0xFF;
        write_segment(dir.path(), 0, &[frame]);

        assert!(LogStore::open(dir.path(), 1024).is_err());
    }

    #[test]
    fn test_open_rejects_gap_between_segments() {
        let dir = tempfile::TempDir::new().unwrap();
        let frame = encode_frame(1, &RecordBody::Begin).unwrap();
        write_segment(dir.path(), 0, &[frame.clone()]);
        // Second segment starts past the end of the first
        write_segment(dir.path(), frame.len() as u64 + 8, &[frame]);

        assert!(LogStore::open(dir.path(), 1024).is_err());
    }

    #[test]
    fn test_single_writer_enforced() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = LogStore::open(dir.path(), 1024).unwrap();
        store.claim_writer().unwrap();
        assert!(store.claim_writer().is_err());
        store.release_writer();
        assert!(store.claim_writer().is_ok());
    }
}
