//! Shared helpers for integration tests
#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;

use aerocdc::config::EngineConfig;
use aerocdc::engine::CdcEngine;
use aerocdc::log::{LogPosition, LogWriter};
use aerocdc::publication::Publication;
use aerocdc::stream::ServerMessage;

/// Open an engine over a fresh data directory with test-friendly
/// thresholds.
pub fn open_engine(data_dir: &Path) -> CdcEngine {
    open_engine_with(data_dir, |_| {})
}

pub fn open_engine_with(data_dir: &Path, tweak: impl FnOnce(&mut EngineConfig)) -> CdcEngine {
    let mut config = EngineConfig::new(data_dir);
    config.keepalive_interval_secs = 1;
    config.stall_timeout_secs = 2;
    tweak(&mut config);
    CdcEngine::open(config).unwrap()
}

/// Create a catch-all publication named `all`.
pub fn create_all_publication(engine: &CdcEngine) {
    engine
        .create_publication(Publication::all_tables("all"))
        .unwrap();
}

/// Write one single-change committed transaction, returning its commit
/// position.
pub fn write_txn(
    writer: &mut LogWriter,
    txn_id: u64,
    table: &str,
    key: &str,
    row: Value,
) -> LogPosition {
    writer.begin(txn_id).unwrap();
    writer.insert(txn_id, table, key, row).unwrap();
    writer.commit(txn_id).unwrap()
}

/// Receive the next `Data` frame, skipping keepalives.
pub async fn next_data(rx: &mut mpsc::Receiver<ServerMessage>) -> (LogPosition, Vec<u8>) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for data frame")
            .expect("stream closed while waiting for data frame");
        match frame {
            ServerMessage::Data {
                commit_position,
                payload,
            } => return (commit_position, payload),
            ServerMessage::Keepalive { .. } => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Receive the next `Error` frame, skipping keepalives and data.
pub async fn next_error(rx: &mut mpsc::Receiver<ServerMessage>) -> (String, String) {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for error frame")
            .expect("stream closed while waiting for error frame");
        match frame {
            ServerMessage::Error { code, message } => return (code, message),
            _ => continue,
        }
    }
}

/// Expect a `StreamStarted` frame.
pub async fn expect_started(rx: &mut mpsc::Receiver<ServerMessage>) -> LogPosition {
    let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for stream_started")
        .expect("stream closed before stream_started");
    match frame {
        ServerMessage::StreamStarted { confirmed_position } => confirmed_position,
        other => panic!("expected stream_started, got {:?}", other),
    }
}

/// Poll until `cond` holds or a timeout elapses.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not reached within timeout");
}

/// A small row image.
pub fn row(v: i64) -> Value {
    json!({ "amount": v })
}
