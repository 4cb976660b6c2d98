//! Row and column filtering
//!
//! Publications can restrict which rows of a table replicate (row filters,
//! evaluated against JSON row images) and which columns of each image
//! survive (column projections). Filter semantics are deliberately small:
//! a flat field compared against a literal value.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Comparison operator for row filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
}

impl FilterOp {
    /// Parse an operator from its admin-surface spelling.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" | "eq" => Some(FilterOp::Eq),
            "!=" | "<>" | "neq" => Some(FilterOp::Neq),
            ">" | "gt" => Some(FilterOp::Gt),
            ">=" | "gte" => Some(FilterOp::Gte),
            "<" | "lt" => Some(FilterOp::Lt),
            "<=" | "lte" => Some(FilterOp::Lte),
            "in" | "IN" => Some(FilterOp::In),
            _ => None,
        }
    }
}

/// A predicate over one field of a row image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Field to filter on
    pub field: String,
    /// Operator
    pub op: FilterOp,
    /// Literal to compare against
    pub value: Value,
}

impl RowFilter {
    /// Evaluate this filter against a row image.
    ///
    /// A missing field or a non-object image never matches.
    pub fn matches(&self, image: &Value) -> bool {
        let Some(field_value) = image.get(&self.field) else {
            return false;
        };

        match self.op {
            FilterOp::Eq => field_value == &self.value,
            FilterOp::Neq => field_value != &self.value,
            FilterOp::Gt => compare_numeric(field_value, &self.value, |a, b| a > b),
            FilterOp::Gte => compare_numeric(field_value, &self.value, |a, b| a >= b),
            FilterOp::Lt => compare_numeric(field_value, &self.value, |a, b| a < b),
            FilterOp::Lte => compare_numeric(field_value, &self.value, |a, b| a <= b),
            FilterOp::In => match self.value.as_array() {
                Some(candidates) => candidates.contains(field_value),
                None => false,
            },
        }
    }
}

fn compare_numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Keep only the named columns of a row image.
///
/// Non-object images pass through untouched.
pub fn project_columns(image: &Value, columns: &BTreeSet<String>) -> Value {
    match image.as_object() {
        Some(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| columns.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        None => image.clone(),
    }
}
