//! NDJSON transaction encoding
//!
//! One JSON object per line: every change in commit order, then a single
//! commit marker line. Empty transactions encode to the marker alone, so
//! a consumer always learns the commit position even when its publication
//! filtered every change out.
//!
//! Object keys serialize in sorted order, which makes payload bytes a
//! pure function of the transaction.

use serde_json::{json, Value};

use crate::log::ChangeOp;
use crate::reassembly::Transaction;

use super::{EncodeError, TransactionEncoder};

pub struct JsonEncoder;

impl TransactionEncoder for JsonEncoder {
    fn encode(&self, txn: &Transaction) -> Result<Vec<u8>, EncodeError> {
        let mut out = Vec::new();

        for record in &txn.changes {
            let line = json!({
                "position": record.position.as_u64(),
                "transaction_id": txn.txn_id,
                "table": record.change.table,
                "op": record.change.op.as_str(),
                "key": record.change.row_key,
                "before": record.change.before,
                "after": record.change.after,
                "commit_timestamp": txn.commit_timestamp_ms,
            });
            serde_json::to_writer(&mut out, &line).map_err(|source| EncodeError::Serialize {
                position: record.position.as_u64(),
                source,
            })?;
            out.push(b'\n');
        }

        let marker = json!({
            "marker": "commit",
            "transaction_id": txn.txn_id,
            "commit_position": txn.commit_position.as_u64(),
            "commit_timestamp": txn.commit_timestamp_ms,
            "change_count": txn.changes.len(),
        });
        serde_json::to_writer(&mut out, &marker).map_err(|source| EncodeError::Serialize {
            position: txn.commit_position.as_u64(),
            source,
        })?;
        out.push(b'\n');

        Ok(out)
    }

    fn content_type(&self) -> &'static str {
        "application/x-ndjson"
    }
}

/// One change parsed back out of an NDJSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChange {
    pub position: u64,
    pub table: String,
    pub op: ChangeOp,
    pub key: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// A whole transaction parsed back out of an NDJSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedTransaction {
    pub txn_id: u64,
    pub commit_position: u64,
    pub commit_timestamp_ms: i64,
    pub changes: Vec<DecodedChange>,
}

/// Parses NDJSON payloads produced by [`JsonEncoder`].
pub struct JsonDecoder;

impl JsonDecoder {
    pub fn decode(payload: &[u8]) -> Result<DecodedTransaction, EncodeError> {
        let text = std::str::from_utf8(payload).map_err(|e| EncodeError::Decode {
            format: "ndjson",
            detail: format!("payload is not utf-8: {}", e),
        })?;

        let mut changes = Vec::new();
        let mut marker: Option<Value> = None;

        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            if marker.is_some() {
                return Err(Self::malformed("content after commit marker"));
            }
            let value: Value = serde_json::from_str(line).map_err(|e| EncodeError::Decode {
                format: "ndjson",
                detail: format!("invalid json line: {}", e),
            })?;

            if value.get("marker").and_then(Value::as_str) == Some("commit") {
                marker = Some(value);
            } else {
                changes.push(Self::decode_change(&value)?);
            }
        }

        let marker = marker.ok_or_else(|| Self::malformed("missing commit marker"))?;
        let declared = marker
            .get("change_count")
            .and_then(Value::as_u64)
            .ok_or_else(|| Self::malformed("marker missing change_count"))?;
        if declared as usize != changes.len() {
            return Err(Self::malformed("change_count does not match payload"));
        }

        Ok(DecodedTransaction {
            txn_id: Self::u64_field(&marker, "transaction_id")?,
            commit_position: Self::u64_field(&marker, "commit_position")?,
            commit_timestamp_ms: marker
                .get("commit_timestamp")
                .and_then(Value::as_i64)
                .ok_or_else(|| Self::malformed("marker missing commit_timestamp"))?,
            changes,
        })
    }

    fn decode_change(value: &Value) -> Result<DecodedChange, EncodeError> {
        let op = match Self::str_field(value, "op")?.as_str() {
            "insert" => ChangeOp::Insert,
            "update" => ChangeOp::Update,
            "delete" => ChangeOp::Delete,
            other => {
                return Err(Self::malformed(&format!("unknown op: {}", other)));
            }
        };
        Ok(DecodedChange {
            position: Self::u64_field(value, "position")?,
            table: Self::str_field(value, "table")?,
            op,
            key: Self::str_field(value, "key")?,
            before: Self::image_field(value, "before"),
            after: Self::image_field(value, "after"),
        })
    }

    fn image_field(value: &Value, field: &str) -> Option<Value> {
        match value.get(field) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.clone()),
        }
    }

    fn u64_field(value: &Value, field: &str) -> Result<u64, EncodeError> {
        value
            .get(field)
            .and_then(Value::as_u64)
            .ok_or_else(|| Self::malformed(&format!("missing numeric field: {}", field)))
    }

    fn str_field(value: &Value, field: &str) -> Result<String, EncodeError> {
        value
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Self::malformed(&format!("missing string field: {}", field)))
    }

    fn malformed(detail: &str) -> EncodeError {
        EncodeError::Decode {
            format: "ndjson",
            detail: detail.to_string(),
        }
    }
}
