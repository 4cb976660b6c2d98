//! Per-slot delivery pipeline
//!
//! Wires a log reader, a transaction reassembler, a publication, and an
//! encoder into one pull loop. Every call yields the next committed
//! transaction past the slot's confirmed position, filtered and encoded,
//! in commit order. All pipeline state lives on the struct, so a caller
//! may poll it inside `select!` and resume after cancellation without
//! losing records.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::encode::TransactionEncoder;
use crate::log::{LogPosition, LogReader, LogStore};
use crate::publication::{match_transaction, Publication};
use crate::reassembly::Reassembler;
use crate::slot::SlotState;
use crate::stream::StreamResult;

/// One encoded transaction ready to ship.
pub struct EncodedBatch {
    pub payload: Vec<u8>,
    pub commit_position: LogPosition,
    pub restart_floor: LogPosition,
    pub change_count: usize,
    /// True if the reader had consumed every durable record when this
    /// transaction was produced
    pub at_head: bool,
}

pub struct SlotPipeline {
    reader: LogReader,
    reassembler: Reassembler,
    publication: Arc<Publication>,
    encoder: Arc<dyn TransactionEncoder>,
    confirmed: LogPosition,
}

impl SlotPipeline {
    /// Build a pipeline resuming from the slot's durable cursors: the
    /// reader starts at the restart position, the reassembler tolerates
    /// redelivered fragments of transactions committed at or below the
    /// confirmed position, and transactions the consumer already
    /// acknowledged are dropped instead of re-sent.
    pub fn new(
        log: Arc<LogStore>,
        slot: &SlotState,
        publication: Arc<Publication>,
        encoder: Arc<dyn TransactionEncoder>,
        max_open_transactions: usize,
    ) -> Self {
        let reader = LogReader::new(log, slot.restart_position);
        let reassembler = if slot.confirmed_position > LogPosition::START {
            Reassembler::resuming(max_open_transactions, slot.confirmed_position)
        } else {
            Reassembler::new(max_open_transactions)
        };
        Self {
            reader,
            reassembler,
            publication,
            encoder,
            confirmed: slot.confirmed_position,
        }
    }

    /// Current log head, for keepalives.
    pub fn head(&self) -> LogPosition {
        self.reader.head()
    }

    /// True when the reader has consumed everything durably written.
    pub fn at_head(&self) -> bool {
        self.reader.at_head()
    }

    /// Pull the next deliverable transaction, waiting for new log
    /// records when caught up. Cancellation-safe: partial reassembly
    /// state is kept on `self`.
    pub async fn next_batch(&mut self) -> StreamResult<EncodedBatch> {
        loop {
            let record = self.reader.next_record().await?;
            let Some(txn) = self.reassembler.feed(record)? else {
                continue;
            };
            if txn.commit_position <= self.confirmed {
                continue;
            }
            let filtered = match_transaction(&txn, &self.publication);
            let payload = self.encoder.encode(&filtered)?;
            return Ok(EncodedBatch {
                payload,
                commit_position: filtered.commit_position,
                restart_floor: filtered.restart_floor,
                change_count: filtered.change_count(),
                at_head: self.reader.at_head(),
            });
        }
    }

    /// Pump batches into `tx` until the receiver hangs up or the
    /// pipeline fails. The bounded channel is the delivery buffer: a
    /// session that stops receiving stalls this task at `send`, so a
    /// paused consumer halts log reading instead of buffering without
    /// bound. A pipeline error is forwarded once and ends the task.
    pub async fn pump(mut self, tx: mpsc::Sender<StreamResult<EncodedBatch>>) {
        loop {
            let batch = self.next_batch().await;
            let failed = batch.is_err();
            if tx.send(batch).await.is_err() || failed {
                return;
            }
        }
    }
}
