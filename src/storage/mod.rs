//! Persistence for the task document.
//!
//! The orchestration and import code never touch disk directly; they load a
//! [`TaskStore`] through a [`TaskRepository`], transform it, and hand it back.

mod file;

pub use file::TaskFile;

use std::sync::Mutex;

use crate::core::store::TaskStore;
use crate::error::{Error, Result};

/// Load/save contract for the task document.
pub trait TaskRepository {
    /// Load and verify the document.
    ///
    /// # Errors
    /// `Integrity` if the stored checksum does not match the task sequence.
    fn load(&self) -> Result<TaskStore>;

    /// Persist the document unconditionally.
    fn save(&self, store: &TaskStore) -> Result<()>;

    /// Persist only if the persisted document still carries
    /// `expected_checksum`, i.e. nobody wrote since the caller's snapshot.
    ///
    /// # Errors
    /// `StaleSnapshot` when the precondition fails; nothing is written.
    fn compare_and_save(&self, store: &TaskStore, expected_checksum: &str) -> Result<()>;
}

fn encode(store: &TaskStore) -> Result<String> {
    store.verify_checksum()?;
    Ok(serde_json::to_string_pretty(store)?)
}

fn decode(contents: &str) -> Result<TaskStore> {
    let store: TaskStore = serde_json::from_str(contents)?;
    store.verify_checksum()?;
    Ok(store)
}

/// In-memory repository holding the serialized document.
///
/// Keeps the exact bytes a file would hold, so callers can assert that a
/// failed operation left the persisted document byte-identical.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    contents: Mutex<Option<String>>,
}

impl MemoryRepository {
    pub fn new(store: &TaskStore) -> Result<Self> {
        Ok(Self {
            contents: Mutex::new(Some(encode(store)?)),
        })
    }

    /// The persisted bytes, if anything was saved.
    pub fn raw(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Overwrite the persisted bytes without any checks.
    pub fn set_raw(&self, contents: impl Into<String>) {
        *self.lock() = Some(contents.into());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        self.contents.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TaskRepository for MemoryRepository {
    fn load(&self) -> Result<TaskStore> {
        match self.lock().as_deref() {
            Some(contents) => decode(contents),
            None => Err(Error::NotFound("task document".to_string())),
        }
    }

    fn save(&self, store: &TaskStore) -> Result<()> {
        let encoded = encode(store)?;
        *self.lock() = Some(encoded);
        Ok(())
    }

    fn compare_and_save(&self, store: &TaskStore, expected_checksum: &str) -> Result<()> {
        let encoded = encode(store)?;
        let mut guard = self.lock();
        if let Some(current) = guard.as_deref() {
            let current: TaskStore = serde_json::from_str(current)?;
            if current.checksum() != expected_checksum {
                return Err(Error::StaleSnapshot {
                    expected: expected_checksum.to_string(),
                    actual: current.checksum().to_string(),
                });
            }
        }
        *guard = Some(encoded);
        Ok(())
    }
}
