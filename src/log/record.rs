//! Raw change-log records
//!
//! Frame layout, little-endian throughout:
//!
//! - Record Length (u32) - total frame length including this field
//! - Record Kind (u8): BEGIN / CHANGE / COMMIT / ABORT
//! - Transaction ID (u64)
//! - Payload (variable, kind-specific)
//! - Checksum (u32) - CRC32 over everything before it
//!
//! Change payloads carry the table, a stable row key, the operation, and
//! JSON row images: `before` (required for update/delete when a publication
//! needs old values) and `after` (absent for delete). Positions are not
//! stored inside the frame; a record's position is the byte offset at which
//! its frame starts, assigned by the reader.

use std::io;

use serde_json::Value;

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{LogError, LogResult};
use super::position::LogPosition;

/// Record kinds in the raw log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    /// Transaction opened
    Begin = 0,
    /// Row-level change inside an open transaction
    Change = 1,
    /// Transaction durably committed; the visibility barrier
    Commit = 2,
    /// Transaction rolled back; its changes must never be emitted
    Abort = 3,
}

impl RecordKind {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(RecordKind::Begin),
            1 => Some(RecordKind::Change),
            2 => Some(RecordKind::Commit),
            3 => Some(RecordKind::Abort),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Row-level operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChangeOp {
    /// New row
    Insert = 0,
    /// Full replacement of an existing row
    Update = 1,
    /// Row removal (after image absent)
    Delete = 2,
}

impl ChangeOp {
    /// Convert from u8, returns None for invalid values
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ChangeOp::Insert),
            1 => Some(ChangeOp::Update),
            2 => Some(ChangeOp::Delete),
            _ => None,
        }
    }

    /// Convert to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Wire name used by encoders
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOp::Insert => "insert",
            ChangeOp::Update => "update",
            ChangeOp::Delete => "delete",
        }
    }
}

/// Payload of a CHANGE record.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangePayload {
    /// Table the row belongs to
    pub table: String,
    /// Stable row identity within the table
    pub row_key: String,
    /// Operation kind
    pub op: ChangeOp,
    /// Row image before the operation (update/delete)
    pub before: Option<Value>,
    /// Row image after the operation (insert/update)
    pub after: Option<Value>,
}

impl ChangePayload {
    /// Create an insert payload.
    pub fn insert(table: impl Into<String>, row_key: impl Into<String>, after: Value) -> Self {
        Self {
            table: table.into(),
            row_key: row_key.into(),
            op: ChangeOp::Insert,
            before: None,
            after: Some(after),
        }
    }

    /// Create an update payload with before and after images.
    pub fn update(
        table: impl Into<String>,
        row_key: impl Into<String>,
        before: Option<Value>,
        after: Value,
    ) -> Self {
        Self {
            table: table.into(),
            row_key: row_key.into(),
            op: ChangeOp::Update,
            before,
            after: Some(after),
        }
    }

    /// Create a delete payload. The after image is always absent.
    pub fn delete(
        table: impl Into<String>,
        row_key: impl Into<String>,
        before: Option<Value>,
    ) -> Self {
        Self {
            table: table.into(),
            row_key: row_key.into(),
            op: ChangeOp::Delete,
            before,
            after: None,
        }
    }

    fn serialize_into(&self, buf: &mut Vec<u8>) -> LogResult<()> {
        buf.push(self.op.as_u8());
        write_bytes(buf, self.table.as_bytes());
        write_bytes(buf, self.row_key.as_bytes());
        write_opt_json(buf, self.before.as_ref())?;
        write_opt_json(buf, self.after.as_ref())?;
        Ok(())
    }

    fn deserialize(data: &[u8]) -> LogResult<Self> {
        let mut cursor = Cursor::new(data);
        let op_byte = cursor.read_u8()?;
        let op = ChangeOp::from_u8(op_byte)
            .ok_or_else(|| LogError::corruption(format!("invalid change op: {}", op_byte)))?;
        let table = cursor.read_string()?;
        let row_key = cursor.read_string()?;
        let before = cursor.read_opt_json()?;
        let after = cursor.read_opt_json()?;
        cursor.expect_exhausted()?;
        Ok(Self {
            table,
            row_key,
            op,
            before,
            after,
        })
    }
}

/// Payload of a COMMIT record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPayload {
    /// Commit wall-clock timestamp, milliseconds since the Unix epoch
    pub commit_timestamp_ms: i64,
}

/// Kind-specific record body.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// Transaction opened
    Begin,
    /// Row change buffered under the owning transaction
    Change(ChangePayload),
    /// Transaction committed; makes the buffered changes visible
    Commit(CommitPayload),
    /// Transaction discarded
    Abort,
}

impl RecordBody {
    /// Record kind of this body.
    pub fn kind(&self) -> RecordKind {
        match self {
            RecordBody::Begin => RecordKind::Begin,
            RecordBody::Change(_) => RecordKind::Change,
            RecordBody::Commit(_) => RecordKind::Commit,
            RecordBody::Abort => RecordKind::Abort,
        }
    }
}

/// A raw record as read from the log.
///
/// `position` is the byte offset of the frame's first byte; records compare
/// in durable write order by position.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    /// Offset of this record's frame in the log
    pub position: LogPosition,
    /// Owning transaction
    pub txn_id: u64,
    /// Kind-specific body
    pub body: RecordBody,
}

/// Minimum frame size: length + kind + txn_id + checksum.
const MIN_FRAME_SIZE: usize = 4 + 1 + 8 + 4;

/// Serialize a record body into a complete checksummed frame.
pub fn encode_frame(txn_id: u64, body: &RecordBody) -> LogResult<Vec<u8>> {
    let mut payload = Vec::new();
    match body {
        RecordBody::Begin | RecordBody::Abort => {}
        RecordBody::Change(change) => change.serialize_into(&mut payload)?,
        RecordBody::Commit(commit) => {
            payload.extend_from_slice(&commit.commit_timestamp_ms.to_le_bytes());
        }
    }

    let frame_len = (MIN_FRAME_SIZE + payload.len()) as u32;
    let mut frame = Vec::with_capacity(frame_len as usize);
    frame.extend_from_slice(&frame_len.to_le_bytes());
    frame.push(body.kind().as_u8());
    frame.extend_from_slice(&txn_id.to_le_bytes());
    frame.extend_from_slice(&payload);

    let checksum = compute_checksum(&frame);
    frame.extend_from_slice(&checksum.to_le_bytes());

    Ok(frame)
}

/// Deserialize one frame, verifying length and checksum.
///
/// Returns the transaction id, body, and the number of bytes consumed.
pub fn decode_frame(data: &[u8]) -> LogResult<(u64, RecordBody, usize)> {
    if data.len() < MIN_FRAME_SIZE {
        return Err(LogError::corruption("record frame too short"));
    }

    let frame_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if frame_len < MIN_FRAME_SIZE {
        return Err(LogError::corruption(format!(
            "invalid record length: {}",
            frame_len
        )));
    }
    if data.len() < frame_len {
        return Err(LogError::corruption(format!(
            "record truncated: expected {} bytes, got {}",
            frame_len,
            data.len()
        )));
    }

    let checksum_offset = frame_len - 4;
    let stored_checksum = u32::from_le_bytes([
        data[checksum_offset],
        data[checksum_offset + 1],
        data[checksum_offset + 2],
        data[checksum_offset + 3],
    ]);
    if !verify_checksum(&data[..checksum_offset], stored_checksum) {
        return Err(LogError::corruption(format!(
            "checksum mismatch: computed {:08x}, stored {:08x}",
            compute_checksum(&data[..checksum_offset]),
            stored_checksum
        )));
    }

    let kind_byte = data[4];
    let kind = RecordKind::from_u8(kind_byte)
        .ok_or_else(|| LogError::corruption(format!("invalid record kind: {}", kind_byte)))?;

    let txn_id = u64::from_le_bytes([
        data[5], data[6], data[7], data[8], data[9], data[10], data[11], data[12],
    ]);

    let payload = &data[13..checksum_offset];
    let body = match kind {
        RecordKind::Begin => {
            expect_empty(payload, "begin")?;
            RecordBody::Begin
        }
        RecordKind::Abort => {
            expect_empty(payload, "abort")?;
            RecordBody::Abort
        }
        RecordKind::Commit => {
            if payload.len() != 8 {
                return Err(LogError::corruption("commit payload must be 8 bytes"));
            }
            let ts = i64::from_le_bytes([
                payload[0], payload[1], payload[2], payload[3], payload[4], payload[5],
                payload[6], payload[7],
            ]);
            RecordBody::Commit(CommitPayload {
                commit_timestamp_ms: ts,
            })
        }
        RecordKind::Change => RecordBody::Change(ChangePayload::deserialize(payload)?),
    };

    Ok((txn_id, body, frame_len))
}

fn expect_empty(payload: &[u8], kind: &str) -> LogResult<()> {
    if payload.is_empty() {
        Ok(())
    } else {
        Err(LogError::corruption(format!(
            "{} record carries unexpected payload",
            kind
        )))
    }
}

fn write_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn write_opt_json(buf: &mut Vec<u8>, value: Option<&Value>) -> LogResult<()> {
    match value {
        None => buf.push(0),
        Some(value) => {
            buf.push(1);
            let bytes = serde_json::to_vec(value).map_err(|e| {
                LogError::append_failed(
                    "failed to serialize row image",
                    io::Error::new(io::ErrorKind::InvalidData, e),
                )
            })?;
            write_bytes(buf, &bytes);
        }
    }
    Ok(())
}

/// Bounds-checked payload cursor.
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> LogResult<&'a [u8]> {
        if self.offset + len > self.data.len() {
            return Err(LogError::corruption("change payload truncated"));
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn read_u8(&mut self) -> LogResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn read_len(&mut self) -> LogResult<usize> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize)
    }

    fn read_string(&mut self) -> LogResult<String> {
        let len = self.read_len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| LogError::corruption(format!("invalid UTF-8 in change payload: {}", e)))
    }

    fn read_opt_json(&mut self) -> LogResult<Option<Value>> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => {
                let len = self.read_len()?;
                let bytes = self.take(len)?;
                let value = serde_json::from_slice(bytes).map_err(|e| {
                    LogError::corruption(format!("invalid JSON row image: {}", e))
                })?;
                Ok(Some(value))
            }
            other => Err(LogError::corruption(format!(
                "invalid image flag: {}",
                other
            ))),
        }
    }

    fn expect_exhausted(&self) -> LogResult<()> {
        if self.offset == self.data.len() {
            Ok(())
        } else {
            Err(LogError::corruption("trailing bytes in change payload"))
        }
    }
}
