//! Transaction reassembly subsystem
//!
//! Turns the interleaved raw record stream into complete, commit-ordered
//! transactions. Uncommitted work is buffered, aborted work is discarded,
//! and nothing is observable downstream before its commit record is
//! durable in the log.

mod errors;
mod reassembler;
mod transaction;

pub use errors::{ReassemblyError, ReassemblyResult};
pub use reassembler::Reassembler;
pub use transaction::{ChangeRecord, Transaction};
