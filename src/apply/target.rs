//! Apply targets
//!
//! A target is where replicated rows land on the consumer side. Targets
//! must be idempotent and keyed: re-applying a change the target already
//! holds converges to the same state, which is what makes at-least-once
//! delivery safe.

use std::collections::BTreeMap;

use serde_json::Value;

use super::errors::ApplyResult;

/// Destination for replicated changes.
pub trait ApplyTarget: Send {
    /// Insert or replace the row at `(table, key)`.
    fn upsert(&mut self, table: &str, key: &str, row: &Value) -> ApplyResult<()>;

    /// Remove the row at `(table, key)`. Deleting an absent row is a
    /// no-op, not an error.
    fn delete(&mut self, table: &str, key: &str) -> ApplyResult<()>;

    /// Make everything applied so far durable. The worker only
    /// advances its watermark after flush returns.
    fn flush(&mut self) -> ApplyResult<()>;
}

/// In-memory target keyed by `(table, row key)`.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    rows: BTreeMap<(String, String), Value>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, table: &str, key: &str) -> Option<&Value> {
        self.rows.get(&(table.to_string(), key.to_string()))
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Snapshot of every row, for equivalence checks in tests.
    pub fn rows(&self) -> &BTreeMap<(String, String), Value> {
        &self.rows
    }
}

impl ApplyTarget for MemoryTarget {
    fn upsert(&mut self, table: &str, key: &str, row: &Value) -> ApplyResult<()> {
        self.rows
            .insert((table.to_string(), key.to_string()), row.clone());
        Ok(())
    }

    fn delete(&mut self, table: &str, key: &str) -> ApplyResult<()> {
        self.rows.remove(&(table.to_string(), key.to_string()));
        Ok(())
    }

    fn flush(&mut self) -> ApplyResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upsert_is_idempotent() {
        let mut target = MemoryTarget::new();
        target.upsert("orders", "o-1", &json!({"amount": 5})).unwrap();
        target.upsert("orders", "o-1", &json!({"amount": 5})).unwrap();
        assert_eq!(target.row_count(), 1);
        assert_eq!(target.get("orders", "o-1"), Some(&json!({"amount": 5})));
    }

    #[test]
    fn test_delete_absent_row_is_noop() {
        let mut target = MemoryTarget::new();
        target.delete("orders", "missing").unwrap();
        assert_eq!(target.row_count(), 0);
    }
}
