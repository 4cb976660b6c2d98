//! Streaming wire protocol
//!
//! Tagged JSON messages exchanged over a session's channel pair. The
//! consumer drives with `StartStream`, acknowledges with `Ack`, and the
//! engine answers with data frames, keepalives, and a terminal error
//! frame when a session dies.

use serde::{Deserialize, Serialize};

use crate::log::LogPosition;

/// Messages from consumer to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Open a stream on a slot. When the slot does not exist yet and
    /// both `start_position` and `publication` are given, the slot is
    /// created implicitly before streaming begins.
    StartStream {
        slot: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start_position: Option<LogPosition>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        publication: Option<String>,
    },

    /// Confirm durable application of everything up to `position`.
    Ack { position: LogPosition },

    /// Close the stream cleanly.
    StopStream,
}

/// Messages from engine to consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Stream accepted. Delivery resumes after `confirmed_position`.
    StreamStarted { confirmed_position: LogPosition },

    /// One encoded transaction.
    Data {
        commit_position: LogPosition,
        payload: Vec<u8>,
    },

    /// Liveness signal carrying the current log head. Sent when no data
    /// has flowed for the keepalive interval.
    Keepalive { head_position: LogPosition },

    /// Terminal error frame; the session is closed after sending it.
    Error { code: String, message: String },
}
