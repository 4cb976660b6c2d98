//! Streaming delivery
//!
//! The consumer-facing half of the engine: the wire protocol, the
//! per-session backpressure gauge, and the session loop that ships
//! encoded transactions and folds acknowledgments back into slot state.

pub mod backpressure;
pub mod errors;
pub mod protocol;
pub mod session;

pub use backpressure::{AckOutcome, BackpressureGauge};
pub use errors::{StreamError, StreamResult};
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{SessionState, StreamingSession};
