//! Apply worker
//!
//! Reference consumer: decodes NDJSON payloads, applies each change to
//! a target, and acknowledges with a durable watermark. Transactions at
//! or below the watermark are skipped without touching the target, so a
//! redelivered payload after reconnect converges to the same state as
//! if it had been delivered once.

use base64::Engine as _;
use sha2::{Digest, Sha256};
use tokio::sync::mpsc;

use crate::encode::{DecodedTransaction, JsonDecoder};
use crate::log::{ChangeOp, LogPosition};
use crate::observability::Logger;
use crate::stream::{ClientMessage, ServerMessage};

use super::errors::{ApplyError, ApplyResult};
use super::target::ApplyTarget;

/// Short content hash of a payload, for duplicate tracing in logs.
pub fn content_hash(payload: &[u8]) -> String {
    let digest = Sha256::digest(payload);
    base64::engine::general_purpose::STANDARD_NO_PAD.encode(&digest[..12])
}

pub struct ApplyWorker<T: ApplyTarget> {
    target: T,
    watermark: LogPosition,
}

impl<T: ApplyTarget> ApplyWorker<T> {
    pub fn new(target: T, watermark: LogPosition) -> Self {
        Self { target, watermark }
    }

    /// Highest commit position durably applied.
    pub fn watermark(&self) -> LogPosition {
        self.watermark
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn into_target(self) -> T {
        self.target
    }

    /// Apply one payload and return the watermark to acknowledge.
    ///
    /// A payload whose commit position is at or below the watermark has
    /// already been applied; it is skipped and the current watermark is
    /// re-acknowledged.
    pub fn apply_payload(&mut self, payload: &[u8]) -> ApplyResult<LogPosition> {
        let txn = JsonDecoder::decode(payload)?;
        let commit = LogPosition(txn.commit_position);

        if commit <= self.watermark {
            Logger::trace(
                "apply_skip_duplicate",
                &[
                    ("commit_position", &commit.to_string()),
                    ("watermark", &self.watermark.to_string()),
                    ("content_hash", &content_hash(payload)),
                ],
            );
            return Ok(self.watermark);
        }

        self.apply_transaction(&txn)?;
        self.target.flush()?;
        self.watermark = commit;

        Logger::trace(
            "apply_commit",
            &[
                ("commit_position", &commit.to_string()),
                ("change_count", &txn.changes.len().to_string()),
            ],
        );
        Ok(self.watermark)
    }

    fn apply_transaction(&mut self, txn: &DecodedTransaction) -> ApplyResult<()> {
        for change in &txn.changes {
            match change.op {
                ChangeOp::Insert | ChangeOp::Update => {
                    let row = change.after.as_ref().ok_or_else(|| ApplyError::MissingImage {
                        table: change.table.clone(),
                        key: change.key.clone(),
                    })?;
                    self.target.upsert(&change.table, &change.key, row)?;
                }
                ChangeOp::Delete => {
                    self.target.delete(&change.table, &change.key)?;
                }
            }
        }
        Ok(())
    }

    /// Consume server frames until the stream ends, acknowledging after
    /// every applied transaction and repeating the watermark on
    /// keepalives.
    pub async fn run(
        &mut self,
        rx: &mut mpsc::Receiver<ServerMessage>,
        acks: &mpsc::Sender<ClientMessage>,
    ) -> ApplyResult<()> {
        while let Some(frame) = rx.recv().await {
            match frame {
                ServerMessage::StreamStarted { confirmed_position } => {
                    // The slot cursor is authoritative: a worker whose
                    // local watermark lags it would otherwise ack a
                    // stale position on the first keepalive.
                    if confirmed_position > self.watermark {
                        self.watermark = confirmed_position;
                    }
                    Logger::info(
                        "apply_stream_started",
                        &[("confirmed_position", &confirmed_position.to_string())],
                    );
                }
                ServerMessage::Data { payload, .. } => {
                    let watermark = self.apply_payload(&payload)?;
                    if acks
                        .send(ClientMessage::Ack {
                            position: watermark,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                ServerMessage::Keepalive { .. } => {
                    if acks
                        .send(ClientMessage::Ack {
                            position: self.watermark,
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                ServerMessage::Error { code, message } => {
                    Logger::error(
                        "apply_stream_error",
                        &[("code", &code), ("message", &message)],
                    );
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::MemoryTarget;
    use crate::encode::{JsonEncoder, TransactionEncoder};
    use crate::log::ChangePayload;
    use crate::reassembly::{ChangeRecord, Transaction};
    use serde_json::json;

    fn encoded(txn_id: u64, commit: u64, changes: Vec<ChangeRecord>) -> Vec<u8> {
        let txn = Transaction {
            txn_id,
            begin_position: LogPosition(commit.saturating_sub(50)),
            commit_position: LogPosition(commit),
            commit_timestamp_ms: 1_700_000_000_000,
            restart_floor: LogPosition(commit.saturating_sub(50)),
            changes,
        };
        JsonEncoder.encode(&txn).unwrap()
    }

    fn worker() -> ApplyWorker<MemoryTarget> {
        ApplyWorker::new(MemoryTarget::new(), LogPosition::START)
    }

    #[test]
    fn test_apply_advances_watermark() {
        let mut w = worker();
        let payload = encoded(
            1,
            100,
            vec![ChangeRecord {
                position: LogPosition(60),
                change: ChangePayload::insert("orders", "o-1", json!({"amount": 5})),
            }],
        );
        let wm = w.apply_payload(&payload).unwrap();
        assert_eq!(wm, LogPosition(100));
        assert_eq!(w.target().get("orders", "o-1"), Some(&json!({"amount": 5})));
    }

    #[test]
    fn test_redelivered_payload_is_skipped() {
        let mut w = worker();
        let payload = encoded(
            1,
            100,
            vec![ChangeRecord {
                position: LogPosition(60),
                change: ChangePayload::insert("orders", "o-1", json!({"v": 1})),
            }],
        );
        w.apply_payload(&payload).unwrap();

        // Mutate the target, then redeliver: the duplicate must not
        // clobber state applied since.
        w.target
            .upsert("orders", "o-1", &json!({"v": 2}))
            .unwrap();
        let wm = w.apply_payload(&payload).unwrap();
        assert_eq!(wm, LogPosition(100));
        assert_eq!(w.target().get("orders", "o-1"), Some(&json!({"v": 2})));
    }

    #[test]
    fn test_delete_applied() {
        let mut w = worker();
        let insert = encoded(
            1,
            100,
            vec![ChangeRecord {
                position: LogPosition(60),
                change: ChangePayload::insert("orders", "o-1", json!({"v": 1})),
            }],
        );
        let delete = encoded(
            2,
            200,
            vec![ChangeRecord {
                position: LogPosition(150),
                change: ChangePayload::delete("orders", "o-1", Some(json!({"v": 1}))),
            }],
        );
        w.apply_payload(&insert).unwrap();
        w.apply_payload(&delete).unwrap();
        assert_eq!(w.target().row_count(), 0);
        assert_eq!(w.watermark(), LogPosition(200));
    }

    #[test]
    fn test_empty_transaction_still_advances_watermark() {
        let mut w = worker();
        let payload = encoded(1, 100, vec![]);
        let wm = w.apply_payload(&payload).unwrap();
        assert_eq!(wm, LogPosition(100));
        assert_eq!(w.target().row_count(), 0);
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
    }
}
