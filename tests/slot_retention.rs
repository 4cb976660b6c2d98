//! Slot lifecycle and log retention
//!
//! The slowest slot pins the retention floor: segments stay readable
//! until every slot has moved past them, and a reader below the floor
//! fails with a position-unavailable error rather than silently
//! skipping history.

mod common;

use aerocdc::engine::EngineError;
use aerocdc::log::{LogErrorCode, LogPosition, LogReader};
use aerocdc::slot::SlotErrorKind;
use aerocdc::stream::ClientMessage;

use common::*;

const TXN_COUNT: u64 = 20;

#[tokio::test]
async fn slow_slot_pins_retention_until_dropped() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = open_engine_with(dir.path(), |c| c.segment_size_bytes = 128);
    create_all_publication(&engine);

    engine
        .create_slot("fast", "all", "json", LogPosition::START)
        .unwrap();
    engine
        .create_slot("slow", "all", "json", LogPosition::START)
        .unwrap();

    let mut writer = engine.log_writer().unwrap();
    let mut last_commit = LogPosition::START;
    for i in 0..TXN_COUNT {
        last_commit = write_txn(&mut writer, i + 1, "orders", &format!("o-{}", i), row(i as i64));
    }
    drop(writer);

    // Fast consumer drains and acknowledges everything
    let (client, mut server) = engine.connect();
    client
        .send(ClientMessage::StartStream {
            slot: "fast".into(),
            start_position: None,
            publication: None,
        })
        .await
        .unwrap();
    expect_started(&mut server).await;
    for _ in 0..TXN_COUNT {
        next_data(&mut server).await;
    }
    client
        .send(ClientMessage::Ack {
            position: last_commit,
        })
        .await
        .unwrap();

    let slots = engine.slots().clone();
    wait_until(move || {
        slots
            .get("fast")
            .map(|s| s.confirmed_position == last_commit)
            .unwrap_or(false)
    })
    .await;

    // The idle slot still pins the whole log
    assert_eq!(engine.slots().retention_floor(), Some(LogPosition::START));
    assert_eq!(engine.log().floor(), LogPosition::START);

    // Reading from the start still works while the floor holds
    let mut reader = LogReader::new(engine.log().clone(), LogPosition::START);
    assert!(reader.read_next().unwrap().is_some());

    // Dropping the idle slot releases retention; early segments go away
    engine.drop_slot("slow").unwrap();
    assert!(engine.log().floor() > LogPosition::START);

    // A reader below the new floor fails loudly
    let mut reader = LogReader::new(engine.log().clone(), LogPosition::START);
    let err = reader.read_next().unwrap_err();
    assert_eq!(err.code(), LogErrorCode::PositionUnavailable);

    // And a slot can no longer be created below the floor
    let err = engine
        .create_slot("late", "all", "json", LogPosition::START)
        .unwrap_err();
    assert!(matches!(err, EngineError::Log(_)));
}

#[tokio::test]
async fn duplicate_slot_names_are_rejected() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    create_all_publication(&engine);

    engine
        .create_slot("s", "all", "json", LogPosition::START)
        .unwrap();
    let err = engine
        .create_slot("s", "all", "json", LogPosition::START)
        .unwrap_err();
    match err {
        EngineError::Slot(e) => assert_eq!(e.kind, SlotErrorKind::DuplicateSlot),
        other => panic!("expected slot error, got {:?}", other),
    }
}

#[tokio::test]
async fn regressive_acknowledgment_closes_the_session() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    create_all_publication(&engine);

    let mut writer = engine.log_writer().unwrap();
    let t1_commit = write_txn(&mut writer, 1, "orders", "o-1", row(1));
    let t2_commit = write_txn(&mut writer, 2, "orders", "o-2", row(2));
    drop(writer);

    engine
        .create_slot("s", "all", "json", LogPosition::START)
        .unwrap();

    let (client, mut server) = engine.connect();
    client
        .send(ClientMessage::StartStream {
            slot: "s".into(),
            start_position: None,
            publication: None,
        })
        .await
        .unwrap();
    expect_started(&mut server).await;

    next_data(&mut server).await;
    next_data(&mut server).await;
    client
        .send(ClientMessage::Ack {
            position: t2_commit,
        })
        .await
        .unwrap();

    let slots = engine.slots().clone();
    wait_until(move || {
        slots
            .get("s")
            .map(|s| s.confirmed_position == t2_commit)
            .unwrap_or(false)
    })
    .await;

    // Going backwards is a protocol violation; the session dies, the
    // slot's durable cursor does not move
    client
        .send(ClientMessage::Ack {
            position: t1_commit,
        })
        .await
        .unwrap();
    let (code, _) = next_error(&mut server).await;
    assert_eq!(code, "CDC_STREAM_SLOT");
    assert_eq!(
        engine.slots().get("s").unwrap().confirmed_position,
        t2_commit
    );
}

#[tokio::test]
async fn slot_admits_one_session_at_a_time() {
    let dir = tempfile::TempDir::new().unwrap();
    let engine = open_engine(dir.path());
    create_all_publication(&engine);

    engine
        .create_slot("s", "all", "json", LogPosition::START)
        .unwrap();

    let (client_a, mut server_a) = engine.connect();
    client_a
        .send(ClientMessage::StartStream {
            slot: "s".into(),
            start_position: None,
            publication: None,
        })
        .await
        .unwrap();
    expect_started(&mut server_a).await;

    let (client_b, mut server_b) = engine.connect();
    client_b
        .send(ClientMessage::StartStream {
            slot: "s".into(),
            start_position: None,
            publication: None,
        })
        .await
        .unwrap();
    let (code, message) = next_error(&mut server_b).await;
    assert_eq!(code, "CDC_STREAM_SLOT");
    assert!(message.contains("bound to another session"));

    // An acquired slot cannot be dropped
    let err = engine.drop_slot("s").unwrap_err();
    match err {
        EngineError::Slot(e) => assert_eq!(e.kind, SlotErrorKind::SlotBusy),
        other => panic!("expected slot error, got {:?}", other),
    }
}
