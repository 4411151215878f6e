//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Task documents in temporary directories
//! - Predefined epics and import packages

use std::path::{Path, PathBuf};
use tempfile::TempDir;

use cairn::core::{Task, TaskStatus, TaskStore};
use cairn::import::ImportPackage;
use cairn::storage::{TaskFile, TaskRepository};

/// A task document in a temporary directory.
pub struct TestStore {
    /// Keeps the directory alive for the duration of the test.
    pub temp_dir: TempDir,
    pub file: TaskFile,
}

impl TestStore {
    /// Persist `store` to a fresh `tasks.json`.
    pub fn with(store: &TaskStore) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let file = TaskFile::new(temp_dir.path().join(".cairn/tasks.json"));
        file.save(store).expect("Failed to save task document");
        Self { temp_dir, file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn load(&self) -> TaskStore {
        self.file.load().expect("Failed to load task document")
    }

    /// Exact bytes on disk.
    pub fn raw(&self) -> String {
        std::fs::read_to_string(self.path()).expect("Failed to read task document")
    }

    /// Write a package next to the task document and return its path.
    pub fn write_package(&self, name: &str, package: &ImportPackage) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        package.write(&path).expect("Failed to write package");
        path
    }

    pub fn status_of(&self, id: &str) -> TaskStatus {
        self.load()
            .get(&id.into())
            .map(|t| t.status)
            .expect("task should exist")
    }
}

/// Epic T1 with a diamond:
///
/// ```text
/// T2 (done) <- T3 <- T5
///           <- T4 <-/
/// ```
/// plus T6 depending on T5.
pub fn diamond_epic() -> TaskStore {
    TaskStore::from_tasks(vec![
        Task::epic("T1", "Checkout"),
        Task::new("T2", "Cart model")
            .with_parent("T1")
            .with_status(TaskStatus::Done),
        Task::new("T3", "Pricing").with_parent("T1").with_depends(["T2"]),
        Task::new("T4", "Inventory hold").with_parent("T1").with_depends(["T2"]),
        Task::new("T5", "Payment").with_parent("T1").with_depends(["T3", "T4"]),
        Task::new("T6", "Receipt").with_parent("T1").with_depends(["T5"]),
    ])
}

/// Destination holding "Fix login bug" (done) with the counter at 49.
pub fn login_destination() -> TaskStore {
    TaskStore::from_tasks(vec![
        Task::new("T1", "Fix login bug").with_status(TaskStatus::Done),
        Task::epic("T49", "Platform"),
    ])
}

/// Package whose T1 clashes with [`login_destination`] by title.
pub fn login_package() -> ImportPackage {
    ImportPackage::new(
        "auth-service",
        vec![
            Task::new("T1", "Fix login bug"),
            Task::new("T2", "Add login tests").with_depends(["T1"]),
        ],
    )
}
