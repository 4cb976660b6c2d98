//! Segmented change-log subsystem
//!
//! The durable record stream the whole engine decodes from. The log is
//! append-only, single-writer, multi-reader; every frame is checksummed and
//! fsynced before its position becomes visible to readers.
//!
//! # Invariants Enforced
//!
//! - Positions are strictly increasing in durable write order
//! - fsync before head publication
//! - Checksums on every frame, halt on corruption
//! - Retention recycling never removes data above the floor
//! - Readers fail explicitly below the floor, never silently skip

mod checksum;
mod errors;
mod position;
mod reader;
mod record;
mod store;
mod writer;

pub use checksum::{compute_checksum, verify_checksum};
pub use errors::{LogError, LogErrorCode, LogResult};
pub use position::LogPosition;
pub use reader::LogReader;
pub use record::{
    decode_frame, encode_frame, ChangeOp, ChangePayload, CommitPayload, RawRecord, RecordBody,
    RecordKind,
};
pub use store::LogStore;
pub use writer::LogWriter;
