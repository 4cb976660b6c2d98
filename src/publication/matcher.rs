//! Publication matcher
//!
//! Filters a reassembled transaction against one publication: a change
//! survives iff its table is selected and the row filter passes. Deletes
//! are filtered on their before image (there is no after image to judge);
//! inserts and updates on their after image. Column projections prune the
//! surviving images.
//!
//! The filtered transaction is returned even when every change was
//! removed: the streaming session turns empty transactions into positioned
//! commit markers so the slot can still advance.

use crate::log::{ChangeOp, ChangePayload};
use crate::reassembly::{ChangeRecord, Transaction};

use super::filter::project_columns;
use super::registry::Publication;

/// Filter `txn` against `publication`.
pub fn match_transaction(txn: &Transaction, publication: &Publication) -> Transaction {
    let changes = txn
        .changes
        .iter()
        .filter(|record| change_matches(&record.change, publication))
        .map(|record| ChangeRecord {
            position: record.position,
            change: apply_projection(&record.change, publication),
        })
        .collect();

    Transaction {
        txn_id: txn.txn_id,
        begin_position: txn.begin_position,
        commit_position: txn.commit_position,
        commit_timestamp_ms: txn.commit_timestamp_ms,
        changes,
        restart_floor: txn.restart_floor,
    }
}

fn change_matches(change: &ChangePayload, publication: &Publication) -> bool {
    if !publication.selector.selects(&change.table) {
        return false;
    }

    let Some(filters) = publication.filters_for(&change.table) else {
        return true;
    };

    // Deletes are judged on the old row; everything else on the new one
    let image = match change.op {
        ChangeOp::Delete => change.before.as_ref(),
        ChangeOp::Insert | ChangeOp::Update => change.after.as_ref(),
    };
    let Some(image) = image else {
        // A filtered table without the needed image cannot be proven to
        // match; excluding it is the conservative reading
        return false;
    };

    filters.iter().all(|filter| filter.matches(image))
}

fn apply_projection(change: &ChangePayload, publication: &Publication) -> ChangePayload {
    let Some(columns) = publication.columns_for(&change.table) else {
        return change.clone();
    };

    ChangePayload {
        table: change.table.clone(),
        row_key: change.row_key.clone(),
        op: change.op,
        before: change.before.as_ref().map(|v| project_columns(v, columns)),
        after: change.after.as_ref().map(|v| project_columns(v, columns)),
    }
}
