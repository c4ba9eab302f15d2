use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub const USER_SLOT: &str = "user";
pub const TASKS_SLOT: &str = "tasks";
pub const CATEGORIES_SLOT: &str = "categories";

/// Named slots of serialized state. Each slot holds one JSON document.
pub trait SlotStorage: Send + Sync {
    fn get(&self, slot: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, slot: &str, value: &str) -> anyhow::Result<()>;
    fn remove(&self, slot: &str) -> anyhow::Result<()>;
    /// Moves the slot's current value aside under `<slot>.corrupt`.
    fn quarantine(&self, slot: &str) -> anyhow::Result<()>;
}

pub fn quarantine_name(slot: &str) -> String {
    format!("{slot}.corrupt")
}

/// One `<slot>.json` file per slot inside a data directory.
#[derive(Debug)]
pub struct FileSlotStorage {
    pub data_dir: PathBuf,
}

impl FileSlotStorage {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        info!(data_dir = %data_dir.display(), "opened slot storage");
        Ok(Self { data_dir })
    }

    pub fn slot_path(&self, slot: &str) -> PathBuf {
        self.data_dir.join(format!("{slot}.json"))
    }
}

impl SlotStorage for FileSlotStorage {
    #[tracing::instrument(skip(self))]
    fn get(&self, slot: &str) -> anyhow::Result<Option<String>> {
        let path = self.slot_path(slot);
        match fs::read_to_string(&path) {
            Ok(raw) => {
                debug!(file = %path.display(), bytes = raw.len(), "read slot");
                Ok(Some(raw))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed reading {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self, value))]
    fn set(&self, slot: &str, value: &str) -> anyhow::Result<()> {
        let path = self.slot_path(slot);
        debug!(file = %path.display(), bytes = value.len(), "writing slot atomically");

        let mut temp = NamedTempFile::new_in(&self.data_dir)?;
        temp.write_all(value.as_bytes())?;
        temp.flush()?;
        temp.persist(&path)
            .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn remove(&self, slot: &str) -> anyhow::Result<()> {
        let path = self.slot_path(slot);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed removing {}", path.display())),
        }
    }

    #[tracing::instrument(skip(self))]
    fn quarantine(&self, slot: &str) -> anyhow::Result<()> {
        let path = self.slot_path(slot);
        let target = self.slot_path(&quarantine_name(slot));
        match fs::rename(&path, &target) {
            Ok(()) => {
                warn!(from = %path.display(), to = %target.display(), "moved corrupt slot aside");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("failed moving {} to {}", path.display(), target.display())
            }),
        }
    }
}

/// Process-local slots, for tests and embedders that do not want files.
#[derive(Debug, Default)]
pub struct MemorySlotStorage {
    slots: Mutex<BTreeMap<String, String>>,
}

impl MemorySlotStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SlotStorage for MemorySlotStorage {
    fn get(&self, slot: &str) -> anyhow::Result<Option<String>> {
        Ok(self.slots.lock().get(slot).cloned())
    }

    fn set(&self, slot: &str, value: &str) -> anyhow::Result<()> {
        self.slots.lock().insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> anyhow::Result<()> {
        self.slots.lock().remove(slot);
        Ok(())
    }

    fn quarantine(&self, slot: &str) -> anyhow::Result<()> {
        let mut slots = self.slots.lock();
        if let Some(value) = slots.remove(slot) {
            slots.insert(quarantine_name(slot), value);
        }
        Ok(())
    }
}

/// Outcome of reading a typed slot at startup.
#[derive(Debug)]
pub enum Snapshot<T> {
    Loaded(T),
    Absent,
    Corrupt(anyhow::Error),
}

impl<T> Snapshot<T> {
    /// Corrupt snapshots count as absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            Snapshot::Loaded(value) => Some(value),
            Snapshot::Absent | Snapshot::Corrupt(_) => None,
        }
    }
}

#[tracing::instrument(skip(storage))]
pub fn load_slot<T: DeserializeOwned>(storage: &dyn SlotStorage, slot: &str) -> Snapshot<T> {
    let raw = match storage.get(slot) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!(slot, "slot absent");
            return Snapshot::Absent;
        }
        Err(err) => {
            warn!(slot, error = %err, "failed reading slot; treating as absent");
            return Snapshot::Corrupt(err);
        }
    };

    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Snapshot::Loaded(value),
        Err(err) => {
            warn!(slot, error = %err, "corrupt snapshot; falling back to defaults");
            Snapshot::Corrupt(anyhow!("failed parsing slot {slot}: {err}"))
        }
    }
}

#[tracing::instrument(skip(storage, value))]
pub fn save_slot<T: Serialize + ?Sized>(
    storage: &dyn SlotStorage,
    slot: &str,
    value: &T,
) -> anyhow::Result<()> {
    let serialized =
        serde_json::to_string(value).with_context(|| format!("failed serializing {slot}"))?;
    storage
        .set(slot, &serialized)
        .with_context(|| format!("failed to save {slot} snapshot"))
}
