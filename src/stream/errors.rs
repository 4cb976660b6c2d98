//! Streaming session errors

use thiserror::Error;

use crate::encode::EncodeError;
use crate::log::LogError;
use crate::reassembly::ReassemblyError;
use crate::slot::SlotError;

#[derive(Debug, Error)]
pub enum StreamError {
    /// The consumer sent a message the protocol does not allow here
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The consumer stopped acknowledging within the stall timeout
    #[error("slot {slot}: consumer stalled for {seconds}s with backpressure engaged")]
    DeliveryStall { slot: String, seconds: u64 },

    /// The consumer channel closed mid-session
    #[error("connection closed")]
    ConnectionClosed,

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl StreamError {
    /// Error code sent to the consumer in an `Error` frame.
    pub fn code(&self) -> &'static str {
        match self {
            StreamError::ProtocolViolation(_) => "CDC_STREAM_PROTOCOL",
            StreamError::DeliveryStall { .. } => "CDC_STREAM_STALL",
            StreamError::ConnectionClosed => "CDC_STREAM_CLOSED",
            StreamError::Slot(_) => "CDC_STREAM_SLOT",
            StreamError::Log(e) => e.code().code(),
            StreamError::Reassembly(_) => "CDC_STREAM_REASSEMBLY",
            StreamError::Encode(_) => "CDC_STREAM_ENCODE",
        }
    }

    /// True when the failure poisons the slot itself rather than just
    /// this session. A new session on the same slot would hit it again.
    pub fn is_fatal_for_slot(&self) -> bool {
        match self {
            StreamError::Log(e) => e.is_fatal_for_slot(),
            StreamError::Reassembly(e) => e.is_fatal_for_slot(),
            _ => false,
        }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;
