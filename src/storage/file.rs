//! JSON task document on disk.

use std::fs;
use std::path::{Path, PathBuf};

use super::{decode, encode, TaskRepository};
use crate::core::store::TaskStore;
use crate::util::blocking;
use crate::{clog_debug, clog_error, Error, Result};

/// The task document at a fixed path.
///
/// Writes go through a `.tmp` file and a rename, after copying the previous
/// document to `.bak`.
#[derive(Debug, Clone)]
pub struct TaskFile {
    path: PathBuf,
}

impl TaskFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create an empty document if none exists yet. Returns whether one was
    /// written.
    pub fn init(&self) -> Result<bool> {
        if self.exists() {
            return Ok(false);
        }
        self.save(&TaskStore::new())?;
        Ok(true)
    }

    pub async fn load_async(&self) -> Result<TaskStore> {
        let file = self.clone();
        blocking(move || file.load()).await
    }

    pub async fn save_async(&self, store: TaskStore) -> Result<()> {
        let file = self.clone();
        blocking(move || file.save(&store)).await
    }

    fn read_current(&self) -> Result<Option<TaskStore>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write(&self, contents: &str) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                clog_debug!("Creating task directory: {}", dir.display());
                fs::create_dir_all(dir)?;
            }
        }

        if self.path.exists() {
            let backup_path = self.path.with_extension("json.bak");
            clog_debug!("Creating task backup: {}", backup_path.display());
            fs::copy(&self.path, &backup_path)?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, contents)?;
        fs::rename(&temp_path, &self.path)?;
        clog_debug!("Task document saved: {}", self.path.display());
        Ok(())
    }
}

impl TaskRepository for TaskFile {
    fn load(&self) -> Result<TaskStore> {
        clog_debug!("TaskFile::load path={}", self.path.display());
        if !self.path.exists() {
            return Err(Error::NotFound(format!(
                "task file {}",
                self.path.display()
            )));
        }
        let contents = fs::read_to_string(&self.path)?;
        let store = decode(&contents).inspect_err(|e| {
            if matches!(e, Error::Integrity { .. }) {
                clog_error!("Checksum mismatch in {}: {}", self.path.display(), e);
            }
        })?;
        clog_debug!("Task document loaded: {} tasks", store.len());
        Ok(store)
    }

    fn save(&self, store: &TaskStore) -> Result<()> {
        clog_debug!("TaskFile::save tasks={}", store.len());
        let contents = encode(store)?;
        self.write(&contents)
    }

    fn compare_and_save(&self, store: &TaskStore, expected_checksum: &str) -> Result<()> {
        let contents = encode(store)?;
        if let Some(current) = self.read_current()? {
            if current.checksum() != expected_checksum {
                return Err(Error::StaleSnapshot {
                    expected: expected_checksum.to_string(),
                    actual: current.checksum().to_string(),
                });
            }
        }
        self.write(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::NewTask;
    use tempfile::TempDir;

    fn sample_store() -> TaskStore {
        let mut store = TaskStore::new();
        let epic = store.add_task(NewTask::epic("Auth")).unwrap();
        store.add_task(NewTask::new("Login").parent(epic)).unwrap();
        store
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = TaskFile::new(dir.path().join("nested/tasks.json"));
        let store = sample_store();

        file.save(&store).unwrap();
        let loaded = file.load().unwrap();
        assert_eq!(loaded, store);
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let file = TaskFile::new(dir.path().join("tasks.json"));
        assert!(matches!(file.load(), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_init_creates_once() {
        let dir = TempDir::new().unwrap();
        let file = TaskFile::new(dir.path().join("tasks.json"));
        assert!(file.init().unwrap());
        assert!(!file.init().unwrap());
        assert!(file.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_writes_backup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let file = TaskFile::new(&path);

        file.save(&TaskStore::new()).unwrap();
        file.save(&sample_store()).unwrap();

        assert!(path.with_extension("json.bak").exists());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_surfaces_checksum_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.json");
        let file = TaskFile::new(&path);
        file.save(&sample_store()).unwrap();

        let tampered = fs::read_to_string(&path).unwrap().replace("Login", "Logout");
        fs::write(&path, &tampered).unwrap();

        assert!(matches!(file.load(), Err(Error::Integrity { .. })));
        // Never repaired in place
        assert_eq!(fs::read_to_string(&path).unwrap(), tampered);
    }

    #[test]
    fn test_compare_and_save_detects_concurrent_write() {
        let dir = TempDir::new().unwrap();
        let file = TaskFile::new(dir.path().join("tasks.json"));
        file.save(&sample_store()).unwrap();

        let snapshot = file.load().unwrap();
        let mut other = snapshot.clone();
        other.add_task(NewTask::new("Concurrent")).unwrap();
        file.save(&other).unwrap();

        let mut mine = snapshot.clone();
        mine.add_task(NewTask::new("Mine")).unwrap();
        let result = file.compare_and_save(&mine, snapshot.checksum());
        assert!(matches!(result, Err(Error::StaleSnapshot { .. })));
        assert_eq!(file.load().unwrap(), other);
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let dir = TempDir::new().unwrap();
        let file = TaskFile::new(dir.path().join("tasks.json"));
        let store = sample_store();
        file.save_async(store.clone()).await.unwrap();
        assert_eq!(file.load_async().await.unwrap(), store);
    }
}
