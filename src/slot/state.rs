//! Durable slot state
//!
//! One record per slot, persisted as JSON and reloaded on startup. Losing
//! or corrupting a slot record is equivalent to losing the slot: the
//! consumer must resynchronize from a fresh snapshot.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::log::LogPosition;

/// Durable state of one replication slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    /// Slot name
    pub name: String,

    /// Publication this slot replicates; bound at creation, immutable
    pub publication: String,

    /// Encoder selected at creation (registry name, e.g. "json")
    pub encoder: String,

    /// Oldest log position the slot may still need. Feeds the global
    /// retention floor; always at or below `confirmed_position`
    pub restart_position: LogPosition,

    /// Highest position the consumer has acknowledged applying
    pub confirmed_position: LogPosition,

    /// Session currently bound to the slot, if any. Runtime-only and
    /// never persisted: a session cannot outlive its process
    #[serde(skip)]
    pub owner_session_id: Option<Uuid>,

    /// RFC3339 creation timestamp
    pub created_at: String,
}

impl SlotState {
    /// Create a fresh slot with both cursors at `start_position`.
    pub fn new(
        name: impl Into<String>,
        publication: impl Into<String>,
        encoder: impl Into<String>,
        start_position: LogPosition,
    ) -> Self {
        Self {
            name: name.into(),
            publication: publication.into(),
            encoder: encoder.into(),
            restart_position: start_position,
            confirmed_position: start_position,
            owner_session_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Slot cursor invariant: restart never exceeds confirmed.
    pub fn is_consistent(&self) -> bool {
        self.restart_position <= self.confirmed_position
    }
}
