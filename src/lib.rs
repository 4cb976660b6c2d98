//! aerocdc - A strict, deterministic change data capture and logical
//! replication engine.
//!
//! The engine consumes an append-only change log produced by a primary
//! store, reassembles interleaved records into commit-ordered transactions,
//! filters them per publication, and streams them to per-slot consumers with
//! durable cursors, at-least-once delivery, and idempotent apply.

pub mod admin;
pub mod apply;
pub mod cli;
pub mod config;
pub mod encode;
pub mod engine;
pub mod log;
pub mod observability;
pub mod publication;
pub mod reassembly;
pub mod slot;
pub mod stream;
