//! Observability subsystem for aerocdc
//!
//! Structured JSON logging for engine, slot, and session lifecycle events.
//!
//! # Principles
//!
//! 1. Observability is read-only
//! 2. No side effects on replication behavior
//! 3. Synchronous, no background threads
//! 4. Deterministic output (sorted keys, one line per event)

mod logger;

pub use logger::{Logger, Severity};
