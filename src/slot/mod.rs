//! Replication slot management
//!
//! A slot is the durable cursor of one consumer: it records how far the
//! consumer has confirmed delivery and the oldest log position it may
//! still need. Slots pin log retention; the minimum restart position
//! across all slots is the floor below which segments may be recycled.

pub mod errors;
pub mod manager;
pub mod state;
pub mod store;

pub use errors::{SlotError, SlotErrorKind, SlotResult};
pub use manager::{RetentionSink, SlotManager};
pub use state::SlotState;
pub use store::SlotStore;
