//! Streaming session loop
//!
//! One task per connected consumer. The session receives encoded
//! transactions from its slot pipeline over a bounded channel, ships
//! them in commit order, applies acknowledgments to the slot cursors,
//! and enforces backpressure and stall timeouts. While the backpressure
//! gauge is engaged, the session stops draining the pipeline channel
//! and processes only acknowledgments until the gauge falls below the
//! low watermark.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::engine::pipeline::EncodedBatch;
use crate::log::{LogPosition, LogStore};
use crate::observability::Logger;
use crate::slot::{SlotError, SlotManager};

use super::backpressure::BackpressureGauge;
use super::errors::{StreamError, StreamResult};
use super::protocol::{ClientMessage, ServerMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Replaying history between the restart cursor and the log head
    CatchingUp,
    /// At the head, delivering live commits
    Streaming,
    /// Backpressure engaged, delivery suspended
    Paused,
}

impl SessionState {
    fn as_str(self) -> &'static str {
        match self {
            SessionState::CatchingUp => "catching_up",
            SessionState::Streaming => "streaming",
            SessionState::Paused => "paused",
        }
    }
}

pub struct StreamingSession {
    session_id: Uuid,
    slot_name: String,
    log: Arc<LogStore>,
    slots: Arc<SlotManager>,
    gauge: BackpressureGauge,
    confirmed: LogPosition,
    keepalive_interval: Duration,
    stall_timeout: Duration,
    state: SessionState,
}

impl StreamingSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        slot_name: String,
        confirmed: LogPosition,
        log: Arc<LogStore>,
        slots: Arc<SlotManager>,
        high_watermark: usize,
        low_watermark: usize,
        keepalive_interval: Duration,
        stall_timeout: Duration,
    ) -> Self {
        Self {
            session_id,
            slot_name,
            log,
            slots,
            gauge: BackpressureGauge::new(high_watermark, low_watermark),
            confirmed,
            keepalive_interval,
            stall_timeout,
            state: SessionState::CatchingUp,
        }
    }

    /// Drive the session until the consumer stops, disconnects, or an
    /// error closes the stream. The caller releases the slot afterwards.
    pub async fn run(
        mut self,
        batches: &mut mpsc::Receiver<StreamResult<EncodedBatch>>,
        rx: &mut mpsc::Receiver<ClientMessage>,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> StreamResult<()> {
        let mut keepalive = tokio::time::interval(self.keepalive_interval);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        keepalive.reset();
        let mut stall_deadline: Option<Instant> = None;

        self.log_transition(self.state);

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(ClientMessage::Ack { position }) => {
                            if let Some(resumed_at) = self.handle_ack(position)? {
                                stall_deadline = None;
                                self.transition(resumed_at);
                            }
                        }
                        Some(ClientMessage::StopStream) => {
                            Logger::info(
                                "stream_stopped",
                                &[
                                    ("slot", &self.slot_name),
                                    ("session_id", &self.session_id.to_string()),
                                    ("confirmed_position", &self.confirmed.to_string()),
                                ],
                            );
                            return Ok(());
                        }
                        Some(ClientMessage::StartStream { .. }) => {
                            return Err(StreamError::ProtocolViolation(
                                "start_stream on an already-started session".to_string(),
                            ));
                        }
                        None => return Err(StreamError::ConnectionClosed),
                    }
                }

                batch = batches.recv(), if !self.gauge.is_paused() => {
                    let batch = batch.ok_or(StreamError::ConnectionClosed)??;
                    tx.send(ServerMessage::Data {
                        commit_position: batch.commit_position,
                        payload: batch.payload.clone(),
                    })
                    .await
                    .map_err(|_| StreamError::ConnectionClosed)?;
                    keepalive.reset();

                    let paused = self.gauge.on_send(
                        batch.commit_position,
                        batch.payload.len(),
                        batch.restart_floor,
                    );
                    if paused {
                        stall_deadline = Some(Instant::now() + self.stall_timeout);
                        self.transition(SessionState::Paused);
                    } else if batch.at_head {
                        self.transition(SessionState::Streaming);
                    } else {
                        self.transition(SessionState::CatchingUp);
                    }
                }

                _ = keepalive.tick() => {
                    tx.send(ServerMessage::Keepalive {
                        head_position: self.log.head(),
                    })
                    .await
                    .map_err(|_| StreamError::ConnectionClosed)?;
                }

                _ = deadline_elapsed(stall_deadline), if stall_deadline.is_some() => {
                    return Err(StreamError::DeliveryStall {
                        slot: self.slot_name.clone(),
                        seconds: self.stall_timeout.as_secs(),
                    });
                }
            }
        }
    }

    /// Apply one acknowledgment. Returns the state to resume in when
    /// the ack lifted backpressure, `None` otherwise.
    fn handle_ack(&mut self, position: LogPosition) -> StreamResult<Option<SessionState>> {
        // The apply worker repeats its watermark on keepalives and for
        // skipped duplicates. A re-ack of the confirmed position still
        // covers any redelivered frames in flight at or below it.
        if position == self.confirmed {
            let outcome = self.gauge.on_ack(position);
            return Ok(outcome.resumed.then_some(SessionState::CatchingUp));
        }
        if position < self.confirmed {
            return Err(StreamError::Slot(SlotError::ack_regression(
                &self.slot_name,
                self.confirmed,
                position,
            )));
        }

        // A reconnecting consumer may ack a durable watermark ahead of
        // anything sent on this connection; only a position past the log
        // head can never have been delivered.
        let head = self.log.head();
        if position > head {
            return Err(StreamError::ProtocolViolation(format!(
                "acknowledgment at {} is beyond the log head {}",
                position, head
            )));
        }

        let outcome = self.gauge.on_ack(position);
        // With no covering frame in flight the restart cursor holds in
        // place; advance never moves it backwards.
        let restart = outcome.restart_floor.unwrap_or(LogPosition::START);
        self.slots.advance(&self.slot_name, position, restart)?;
        self.confirmed = position;

        if outcome.resumed {
            Ok(Some(SessionState::CatchingUp))
        } else {
            Ok(None)
        }
    }

    fn transition(&mut self, next: SessionState) {
        if next != self.state {
            self.state = next;
            self.log_transition(next);
        }
    }

    fn log_transition(&self, state: SessionState) {
        Logger::info(
            "session_state",
            &[
                ("slot", &self.slot_name),
                ("session_id", &self.session_id.to_string()),
                ("state", state.as_str()),
            ],
        );
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
