//! Per-device storage for the timer snapshot.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Mutex,
    time::SystemTime,
};

use anyhow::{Context, Result};

use crate::timer::{SnapshotStore, TimerSnapshot};

/// Snapshot kept as a small JSON file, written through a temp file and a
/// rename so readers in other processes never see a torn write.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Modification time of the snapshot file, `None` when absent.
    pub fn modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).and_then(|m| m.modified()).ok()
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load(&self) -> Result<Option<TimerSnapshot>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("Failed to read timer snapshot {}", self.path.display())
                })
            }
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let snapshot = serde_json::from_str(&contents).with_context(|| {
            format!("Failed to parse timer snapshot {}", self.path.display())
        })?;
        Ok(Some(snapshot))
    }

    fn save(&self, snapshot: &TimerSnapshot) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create snapshot directory {}", parent.display())
            })?;
        }

        let serialized = serde_json::to_string(snapshot)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("Failed to move snapshot into place at {}", self.path.display())
        })
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to remove timer snapshot {}", self.path.display())
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    slot: Mutex<Option<TimerSnapshot>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peek(&self) -> Option<TimerSnapshot> {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn replace(&self, value: Option<TimerSnapshot>) {
        match self.slot.lock() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn load(&self) -> Result<Option<TimerSnapshot>> {
        Ok(self.peek())
    }

    fn save(&self, snapshot: &TimerSnapshot) -> Result<()> {
        self.replace(Some(snapshot.clone()));
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.replace(None);
        Ok(())
    }
}
