//! Publication subsystem
//!
//! Named, immutable selections of tables/rows/columns eligible for
//! replication, plus the matcher that applies them to reassembled
//! transactions.

mod errors;
mod filter;
mod matcher;
mod registry;

pub use errors::{PublicationError, PublicationResult};
pub use filter::{project_columns, FilterOp, RowFilter};
pub use matcher::match_transaction;
pub use registry::{Publication, PublicationRegistry, TableSelector};
