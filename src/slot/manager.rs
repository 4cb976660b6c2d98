//! Slot manager
//!
//! Owns all replication slots for an engine: creation, exclusive session
//! acquisition, monotonic cursor advancement, and the retention floor that
//! gates log recycling. Every cursor change is persisted before it is
//! visible to readers, and the floor is recomputed and pushed to the
//! retention sink under the same lock so the log can never be trimmed
//! past a slot that still needs it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::log::LogPosition;

use super::errors::{SlotError, SlotResult};
use super::state::SlotState;
use super::store::SlotStore;

/// Receives retention floor updates as slots advance or disappear.
///
/// The log store implements this to recycle segments below the floor.
pub trait RetentionSink: Send + Sync {
    fn retain_from(&self, floor: LogPosition);
}

pub struct SlotManager {
    store: SlotStore,
    slots: RwLock<HashMap<String, SlotState>>,
    sink: Arc<dyn RetentionSink>,
}

impl SlotManager {
    /// Open the slot directory and load every persisted slot.
    pub fn open(data_dir: &Path, sink: Arc<dyn RetentionSink>) -> SlotResult<Self> {
        let store = SlotStore::open(data_dir)?;
        let mut slots = HashMap::new();
        for slot in store.load_all()? {
            slots.insert(slot.name.clone(), slot);
        }
        Ok(Self {
            store,
            slots: RwLock::new(slots),
            sink,
        })
    }

    /// Create a new slot. Both cursors start at `start_position`.
    pub fn create(
        &self,
        name: &str,
        publication: &str,
        encoder: &str,
        start_position: LogPosition,
    ) -> SlotResult<SlotState> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if slots.contains_key(name) {
            return Err(SlotError::duplicate(name));
        }
        let slot = SlotState::new(name, publication, encoder, start_position);
        self.store.persist(&slot)?;
        slots.insert(name.to_string(), slot.clone());
        Ok(slot)
    }

    /// Bind a slot to a session. A slot admits at most one consumer.
    pub fn acquire(&self, name: &str, session_id: Uuid) -> SlotResult<SlotState> {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        let slot = slots.get_mut(name).ok_or_else(|| SlotError::not_found(name))?;
        if let Some(owner) = slot.owner_session_id {
            if owner != session_id {
                return Err(SlotError::already_active(name));
            }
        }
        slot.owner_session_id = Some(session_id);
        Ok(slot.clone())
    }

    /// Release a slot held by `session_id`. Releasing a slot some other
    /// session holds (or nobody holds) is a no-op.
    pub fn release(&self, name: &str, session_id: Uuid) {
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get_mut(name) {
            if slot.owner_session_id == Some(session_id) {
                slot.owner_session_id = None;
            }
        }
    }

    /// Advance a slot's cursors after a consumer acknowledgement.
    ///
    /// `confirmed` must not regress; `restart` is clamped to never exceed
    /// `confirmed`. The new state is persisted before it becomes visible,
    /// and the global retention floor is recomputed and pushed to the sink.
    pub fn advance(
        &self,
        name: &str,
        confirmed: LogPosition,
        restart: LogPosition,
    ) -> SlotResult<()> {
        let floor;
        {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            let slot = slots.get_mut(name).ok_or_else(|| SlotError::not_found(name))?;

            if confirmed < slot.confirmed_position {
                return Err(SlotError::ack_regression(
                    name,
                    slot.confirmed_position,
                    confirmed,
                ));
            }

            let restart = restart.min(confirmed).max(slot.restart_position);
            let mut next = slot.clone();
            next.confirmed_position = confirmed;
            next.restart_position = restart;
            self.store.persist(&next)?;
            *slot = next;

            floor = Self::floor_of(&slots);
        }
        if let Some(floor) = floor {
            self.sink.retain_from(floor);
        }
        Ok(())
    }

    /// Drop a slot. Fails if a session currently holds it.
    pub fn drop_slot(&self, name: &str) -> SlotResult<()> {
        let floor;
        {
            let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
            let slot = slots.get(name).ok_or_else(|| SlotError::not_found(name))?;
            if slot.owner_session_id.is_some() {
                return Err(SlotError::busy(name));
            }
            self.store.remove(name)?;
            slots.remove(name);
            floor = Self::floor_of(&slots);
        }
        if let Some(floor) = floor {
            self.sink.retain_from(floor);
        }
        Ok(())
    }

    /// Minimum restart position across all slots. `None` when no slots
    /// exist, in which case the log owes nothing to anyone.
    pub fn retention_floor(&self) -> Option<LogPosition> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        Self::floor_of(&slots)
    }

    pub fn get(&self, name: &str) -> Option<SlotState> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = slots.keys().cloned().collect();
        names.sort();
        names
    }

    fn floor_of(slots: &HashMap<String, SlotState>) -> Option<LogPosition> {
        slots.values().map(|s| s.restart_position).min()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        floors: Mutex<Vec<LogPosition>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                floors: Mutex::new(Vec::new()),
            })
        }
        fn last(&self) -> Option<LogPosition> {
            self.floors.lock().unwrap().last().copied()
        }
    }

    impl RetentionSink for RecordingSink {
        fn retain_from(&self, floor: LogPosition) {
            self.floors.lock().unwrap().push(floor);
        }
    }

    fn manager(dir: &Path, sink: Arc<RecordingSink>) -> SlotManager {
        SlotManager::open(dir, sink).unwrap()
    }

    #[test]
    fn test_duplicate_slot_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = manager(dir.path(), RecordingSink::new());
        mgr.create("s", "p", "json", LogPosition(0)).unwrap();
        let err = mgr.create("s", "p", "json", LogPosition(0)).unwrap_err();
        assert_eq!(err.kind, crate::slot::SlotErrorKind::DuplicateSlot);
    }

    #[test]
    fn test_single_active_consumer() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = manager(dir.path(), RecordingSink::new());
        mgr.create("s", "p", "json", LogPosition(0)).unwrap();

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        mgr.acquire("s", a).unwrap();
        let err = mgr.acquire("s", b).unwrap_err();
        assert_eq!(err.kind, crate::slot::SlotErrorKind::SlotAlreadyActive);

        // Reacquiring with the same session succeeds
        mgr.acquire("s", a).unwrap();

        mgr.release("s", a);
        mgr.acquire("s", b).unwrap();
    }

    #[test]
    fn test_ack_regression_leaves_state_unchanged() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = manager(dir.path(), RecordingSink::new());
        mgr.create("s", "p", "json", LogPosition(0)).unwrap();

        mgr.advance("s", LogPosition(100), LogPosition(90)).unwrap();
        let err = mgr
            .advance("s", LogPosition(50), LogPosition(40))
            .unwrap_err();
        assert!(err.is_protocol_violation());

        let slot = mgr.get("s").unwrap();
        assert_eq!(slot.confirmed_position, LogPosition(100));
        assert_eq!(slot.restart_position, LogPosition(90));
    }

    #[test]
    fn test_restart_clamped_to_confirmed() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = manager(dir.path(), RecordingSink::new());
        mgr.create("s", "p", "json", LogPosition(0)).unwrap();

        mgr.advance("s", LogPosition(100), LogPosition(200)).unwrap();
        let slot = mgr.get("s").unwrap();
        assert_eq!(slot.restart_position, LogPosition(100));
    }

    #[test]
    fn test_retention_floor_tracks_slowest_slot() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = RecordingSink::new();
        let mgr = manager(dir.path(), sink.clone());
        mgr.create("fast", "p", "json", LogPosition(0)).unwrap();
        mgr.create("slow", "p", "json", LogPosition(0)).unwrap();

        mgr.advance("fast", LogPosition(500), LogPosition(500)).unwrap();
        assert_eq!(mgr.retention_floor(), Some(LogPosition(0)));
        assert_eq!(sink.last(), Some(LogPosition(0)));

        mgr.advance("slow", LogPosition(200), LogPosition(200)).unwrap();
        assert_eq!(mgr.retention_floor(), Some(LogPosition(200)));
        assert_eq!(sink.last(), Some(LogPosition(200)));

        mgr.drop_slot("slow").unwrap();
        assert_eq!(sink.last(), Some(LogPosition(500)));
    }

    #[test]
    fn test_busy_slot_cannot_be_dropped() {
        let dir = tempfile::TempDir::new().unwrap();
        let mgr = manager(dir.path(), RecordingSink::new());
        mgr.create("s", "p", "json", LogPosition(0)).unwrap();
        mgr.acquire("s", Uuid::new_v4()).unwrap();
        let err = mgr.drop_slot("s").unwrap_err();
        assert_eq!(err.kind, crate::slot::SlotErrorKind::SlotBusy);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        {
            let mgr = manager(dir.path(), RecordingSink::new());
            mgr.create("s", "p", "json", LogPosition(0)).unwrap();
            mgr.advance("s", LogPosition(300), LogPosition(250)).unwrap();
            mgr.acquire("s", Uuid::new_v4()).unwrap();
        }
        let mgr = manager(dir.path(), RecordingSink::new());
        let slot = mgr.get("s").unwrap();
        assert_eq!(slot.confirmed_position, LogPosition(300));
        assert_eq!(slot.restart_position, LogPosition(250));
        assert!(slot.owner_session_id.is_none());
    }
}
