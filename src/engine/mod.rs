//! Engine core
//!
//! Wires the log store, slot manager, and publication registry together
//! and spawns one session task per connected consumer. The engine is
//! cheap to clone; all shared state lives behind `Arc`.

pub mod pipeline;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{ConfigError, EngineConfig};
use crate::encode::encoder_for;
use crate::log::{LogError, LogPosition, LogStore, LogWriter};
use crate::observability::Logger;
use crate::publication::{Publication, PublicationError, PublicationRegistry};
use crate::slot::{RetentionSink, SlotError, SlotManager, SlotState};
use crate::stream::{ClientMessage, ServerMessage, StreamError, StreamingSession};

use self::pipeline::SlotPipeline;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Slot(#[from] SlotError),

    #[error(transparent)]
    Publication(#[from] PublicationError),

    #[error("unknown encoder: {0}")]
    UnknownEncoder(String),

    #[error("start position {start} is ahead of the log head {head}")]
    StartBeyondHead { start: LogPosition, head: LogPosition },
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Connects slot retention to log recycling. Recycle failures are
/// logged, not surfaced: retention is advisory and retried on the next
/// floor movement.
struct LogRetention(Arc<LogStore>);

impl RetentionSink for LogRetention {
    fn retain_from(&self, floor: LogPosition) {
        match self.0.recycle_below(floor) {
            Ok(0) => {}
            Ok(recycled) => Logger::info(
                "log_recycled",
                &[
                    ("floor", &floor.to_string()),
                    ("segments", &recycled.to_string()),
                ],
            ),
            Err(e) => Logger::warn(
                "log_recycle_failed",
                &[("floor", &floor.to_string()), ("error", &e.to_string())],
            ),
        }
    }
}

#[derive(Clone)]
pub struct CdcEngine {
    config: Arc<EngineConfig>,
    log: Arc<LogStore>,
    slots: Arc<SlotManager>,
    publications: Arc<PublicationRegistry>,
}

impl CdcEngine {
    /// Open an engine over `config.data_dir`, validating every log
    /// segment and reloading durable slot and publication state.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let log = Arc::new(LogStore::open(&config.data_dir, config.segment_size_bytes)?);
        let sink = Arc::new(LogRetention(log.clone()));
        let slots = Arc::new(SlotManager::open(&config.data_dir, sink)?);
        let publications = Arc::new(PublicationRegistry::open(&config.data_dir)?);

        // Recycle anything a previous process left below the floor
        if let Some(floor) = slots.retention_floor() {
            LogRetention(log.clone()).retain_from(floor);
        }

        Logger::info(
            "engine_opened",
            &[
                ("data_dir", &config.data_dir.display().to_string()),
                ("head", &log.head().to_string()),
                ("slots", &slots.names().len().to_string()),
            ],
        );

        Ok(Self {
            config: Arc::new(config),
            log,
            slots,
            publications,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn log(&self) -> &Arc<LogStore> {
        &self.log
    }

    pub fn slots(&self) -> &Arc<SlotManager> {
        &self.slots
    }

    pub fn publications(&self) -> &Arc<PublicationRegistry> {
        &self.publications
    }

    /// Exclusive producer handle for appending change records.
    pub fn log_writer(&self) -> EngineResult<LogWriter> {
        Ok(LogWriter::new(self.log.clone())?)
    }

    pub fn create_publication(&self, publication: Publication) -> EngineResult<Arc<Publication>> {
        Ok(self.publications.create(publication)?)
    }

    /// Create a slot bound to a publication and encoder. The start
    /// position must lie between the retention floor and the head.
    pub fn create_slot(
        &self,
        name: &str,
        publication: &str,
        encoder: &str,
        start_position: LogPosition,
    ) -> EngineResult<SlotState> {
        // Bindings are validated at creation so a session never
        // discovers a dangling publication or encoder later
        self.publications.get(publication)?;
        if encoder_for(encoder).is_none() {
            return Err(EngineError::UnknownEncoder(encoder.to_string()));
        }

        let floor = self.log.floor();
        if start_position < floor {
            return Err(EngineError::Log(LogError::position_unavailable(
                start_position,
                floor,
            )));
        }
        let head = self.log.head();
        if start_position > head {
            return Err(EngineError::StartBeyondHead {
                start: start_position,
                head,
            });
        }

        let slot = self.slots.create(name, publication, encoder, start_position)?;
        Logger::info(
            "slot_created",
            &[
                ("slot", name),
                ("publication", publication),
                ("start_position", &start_position.to_string()),
            ],
        );
        Ok(slot)
    }

    pub fn drop_slot(&self, name: &str) -> EngineResult<()> {
        self.slots.drop_slot(name)?;
        Logger::info("slot_dropped", &[("slot", name)]);
        Ok(())
    }

    /// Open a consumer connection. Returns the channel pair the
    /// consumer drives; a session task runs until the stream ends.
    pub fn connect(&self) -> (mpsc::Sender<ClientMessage>, mpsc::Receiver<ServerMessage>) {
        let capacity = self.config.channel_capacity;
        let (client_tx, client_rx) = mpsc::channel(capacity);
        let (server_tx, server_rx) = mpsc::channel(capacity);
        let engine = self.clone();
        tokio::spawn(async move {
            engine.handle_connection(client_rx, server_tx).await;
        });
        (client_tx, server_rx)
    }

    async fn handle_connection(
        self,
        mut rx: mpsc::Receiver<ClientMessage>,
        tx: mpsc::Sender<ServerMessage>,
    ) {
        let session_id = Uuid::new_v4();
        match self.run_session(session_id, &mut rx, &tx).await {
            Ok(()) => {}
            Err(err) => {
                Logger::error(
                    "session_failed",
                    &[
                        ("session_id", &session_id.to_string()),
                        ("code", err.code()),
                        ("error", &err.to_string()),
                    ],
                );
                let _ = tx
                    .send(ServerMessage::Error {
                        code: err.code().to_string(),
                        message: err.to_string(),
                    })
                    .await;
            }
        }
    }

    async fn run_session(
        &self,
        session_id: Uuid,
        rx: &mut mpsc::Receiver<ClientMessage>,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), StreamError> {
        let (slot_name, start_position, publication) = match rx.recv().await {
            Some(ClientMessage::StartStream {
                slot,
                start_position,
                publication,
            }) => (slot, start_position, publication),
            Some(_) => {
                return Err(StreamError::ProtocolViolation(
                    "first message must be start_stream".to_string(),
                ))
            }
            None => return Err(StreamError::ConnectionClosed),
        };

        // Implicit slot creation on first connect
        if self.slots.get(&slot_name).is_none() {
            match (start_position, publication) {
                (Some(start), Some(publication)) => {
                    self.create_slot(&slot_name, &publication, "json", start)
                        .map_err(|e| StreamError::ProtocolViolation(e.to_string()))?;
                }
                _ => {
                    return Err(StreamError::Slot(SlotError::not_found(&slot_name)));
                }
            }
        }

        let slot = self.slots.acquire(&slot_name, session_id)?;
        let result = self.stream_on_slot(session_id, &slot, rx, tx).await;
        self.slots.release(&slot_name, session_id);

        if let Err(err) = &result {
            if err.is_fatal_for_slot() {
                let confirmed = self
                    .slots
                    .get(&slot_name)
                    .map(|s| s.confirmed_position)
                    .unwrap_or(slot.confirmed_position);
                Logger::fatal(
                    "slot_failed",
                    &[
                        ("slot", &slot_name),
                        ("confirmed_position", &confirmed.to_string()),
                        ("reason", &err.to_string()),
                    ],
                );
            }
        }
        result
    }

    async fn stream_on_slot(
        &self,
        session_id: Uuid,
        slot: &SlotState,
        rx: &mut mpsc::Receiver<ClientMessage>,
        tx: &mpsc::Sender<ServerMessage>,
    ) -> Result<(), StreamError> {
        let publication = self
            .publications
            .get(&slot.publication)
            .map_err(|e| StreamError::ProtocolViolation(e.to_string()))?;
        let encoder = encoder_for(&slot.encoder).ok_or_else(|| {
            StreamError::ProtocolViolation(format!("unknown encoder: {}", slot.encoder))
        })?;

        tx.send(ServerMessage::StreamStarted {
            confirmed_position: slot.confirmed_position,
        })
        .await
        .map_err(|_| StreamError::ConnectionClosed)?;

        let pipeline = SlotPipeline::new(
            self.log.clone(),
            slot,
            publication,
            encoder,
            self.config.max_open_transactions,
        );
        let (batch_tx, mut batch_rx) = mpsc::channel(self.config.channel_capacity);
        let pump = tokio::spawn(pipeline.pump(batch_tx));

        let session = StreamingSession::new(
            session_id,
            slot.name.clone(),
            slot.confirmed_position,
            self.log.clone(),
            self.slots.clone(),
            self.config.high_watermark_bytes as usize,
            self.config.low_watermark_bytes as usize,
            Duration::from_secs(self.config.keepalive_interval_secs),
            Duration::from_secs(self.config.stall_timeout_secs),
        );
        let result = session.run(&mut batch_rx, rx, tx).await;

        // Dropping the batch receiver stops the pump at its next send
        drop(batch_rx);
        pump.abort();
        result
    }
}
