//! Durable slot store
//!
//! One JSON document per slot under `<data_dir>/slots/`, written with
//! temp-file, fsync, atomic-rename discipline so a crash mid-write leaves
//! the previous state intact. Cursor updates are persisted before they are
//! visible in memory; an acknowledged position is never lost to a restart.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{SlotError, SlotResult};
use super::state::SlotState;

/// Persists slot state documents.
pub struct SlotStore {
    dir: PathBuf,
}

impl SlotStore {
    /// Open the slot directory, creating it if missing.
    pub fn open(data_dir: &Path) -> SlotResult<Self> {
        let dir = data_dir.join("slots");
        fs::create_dir_all(&dir).map_err(|e| {
            SlotError::storage_failed(format!(
                "failed to create slot directory {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self { dir })
    }

    /// Load every persisted slot. Session bindings are runtime-only and
    /// come back empty.
    pub fn load_all(&self) -> SlotResult<Vec<SlotState>> {
        let mut slots = Vec::new();
        let entries = fs::read_dir(&self.dir).map_err(|e| {
            SlotError::storage_failed(format!("failed to read slot directory: {}", e))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                SlotError::storage_failed(format!("failed to read slot entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let raw = fs::read_to_string(&path).map_err(|e| {
                SlotError::storage_failed(format!(
                    "failed to read slot file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            let slot: SlotState = serde_json::from_str(&raw).map_err(|e| {
                SlotError::storage_failed(format!(
                    "slot file corrupt {}: {}",
                    path.display(),
                    e
                ))
            })?;
            if !slot.is_consistent() {
                return Err(SlotError::storage_failed(format!(
                    "slot file {} violates cursor invariant: restart {} > confirmed {}",
                    path.display(),
                    slot.restart_position,
                    slot.confirmed_position
                )));
            }

            slots.push(slot);
        }

        Ok(slots)
    }

    /// Persist one slot durably.
    pub fn persist(&self, slot: &SlotState) -> SlotResult<()> {
        let json = serde_json::to_string_pretty(slot).map_err(|e| {
            SlotError::storage_failed(format!("failed to serialize slot {}: {}", slot.name, e))
        })?;

        let final_path = self.slot_path(&slot.name);
        let tmp_path = self.dir.join(format!("{}.json.tmp", slot.name));

        let write = || -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(())
        };
        write().map_err(|e| {
            SlotError::storage_failed(format!("failed to persist slot {}: {}", slot.name, e))
        })
    }

    /// Remove a slot's durable record.
    pub fn remove(&self, name: &str) -> SlotResult<()> {
        fs::remove_file(self.slot_path(name)).map_err(|e| {
            SlotError::storage_failed(format!("failed to remove slot {}: {}", name, e))
        })
    }

    fn slot_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::LogPosition;
    use uuid::Uuid;

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();

        let mut slot = SlotState::new("orders_slot", "orders_pub", "json", LogPosition(100));
        slot.owner_session_id = Some(Uuid::new_v4());
        store.persist(&slot).unwrap();

        let loaded = store.load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "orders_slot");
        assert_eq!(loaded[0].confirmed_position, LogPosition(100));
        // Bindings never persist
        assert!(loaded[0].owner_session_id.is_none());
    }

    #[test]
    fn test_remove_releases_record() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();
        store
            .persist(&SlotState::new("s", "p", "json", LogPosition(0)))
            .unwrap();
        store.remove("s").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_inconsistent_slot_rejected_on_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = SlotStore::open(dir.path()).unwrap();

        let mut slot = SlotState::new("s", "p", "json", LogPosition(50));
        slot.restart_position = LogPosition(80);
        slot.confirmed_position = LogPosition(50);
        let json = serde_json::to_string(&slot).unwrap();
        fs::write(dir.path().join("slots").join("s.json"), json).unwrap();

        assert!(store.load_all().is_err());
    }
}
