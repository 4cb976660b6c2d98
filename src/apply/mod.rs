//! Consumer-side apply
//!
//! A reference consumer that turns delivered payloads into idempotent
//! writes against a keyed target, tracking a durable watermark so
//! redelivery after reconnect is harmless.

pub mod errors;
pub mod target;
pub mod worker;

pub use errors::{ApplyError, ApplyResult};
pub use target::{ApplyTarget, MemoryTarget};
pub use worker::{content_hash, ApplyWorker};
