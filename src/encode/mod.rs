//! Transaction encoders
//!
//! An encoder turns a reassembled transaction into the byte payload a
//! streaming session ships to its consumer. Encoding is deterministic:
//! the same transaction always produces the same bytes, so consumers can
//! content-hash payloads for deduplication.

pub mod json;

use std::sync::Arc;

use thiserror::Error;

use crate::reassembly::Transaction;

pub use json::{DecodedChange, DecodedTransaction, JsonDecoder, JsonEncoder};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize change at position {position}: {source}")]
    Serialize {
        position: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("payload is not valid {format}: {detail}")]
    Decode { format: &'static str, detail: String },
}

/// Serializes whole transactions for delivery.
pub trait TransactionEncoder: Send + Sync {
    /// Encode one committed transaction. Called for empty transactions
    /// too; those still produce a positioned commit marker.
    fn encode(&self, txn: &Transaction) -> Result<Vec<u8>, EncodeError>;

    /// MIME-style content type of the produced payloads.
    fn content_type(&self) -> &'static str;
}

/// Look up an encoder by registry name.
pub fn encoder_for(name: &str) -> Option<Arc<dyn TransactionEncoder>> {
    match name {
        "json" => Some(Arc::new(JsonEncoder)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_knows_json() {
        let enc = encoder_for("json").unwrap();
        assert_eq!(enc.content_type(), "application/x-ndjson");
        assert!(encoder_for("protobuf").is_none());
    }
}
