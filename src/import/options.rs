use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::core::store::TaskStore;
use crate::core::task::{TaskId, TaskStatus};
use crate::error::{Error, Result};

/// What to do when an imported title already exists (case-insensitive).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConflictStrategy {
    /// Accept the task as-is.
    Duplicate,
    /// Append " (2)", " (3)", ... until the title is unique.
    Rename,
    /// Drop the imported task; references to it resolve to the existing owner.
    Skip,
    /// Abort the whole merge.
    #[default]
    Fail,
}

/// What to do with a dependency found in neither the package nor the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MissingDepStrategy {
    /// Drop the edge.
    #[default]
    Strip,
    /// Point the edge at a blocked placeholder task.
    Placeholder,
    /// Abort the whole merge.
    Fail,
}

/// Statuses an import may force onto every task.
const RESETTABLE: [TaskStatus; 3] = [TaskStatus::Pending, TaskStatus::Active, TaskStatus::Blocked];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportOptions {
    pub dry_run: bool,
    /// Attach imported root tasks under this existing task.
    pub parent_id: Option<TaskId>,
    pub phase_override: Option<String>,
    pub add_label: Option<String>,
    pub reset_status: Option<TaskStatus>,
    pub on_conflict: ConflictStrategy,
    pub on_missing_dep: MissingDepStrategy,
    /// Skip title-conflict detection entirely.
    pub force: bool,
}

impl ImportOptions {
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn on_conflict(mut self, strategy: ConflictStrategy) -> Self {
        self.on_conflict = strategy;
        self
    }

    pub fn on_missing_dep(mut self, strategy: MissingDepStrategy) -> Self {
        self.on_missing_dep = strategy;
        self
    }

    pub fn parent(mut self, parent: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    /// Reject option combinations that can never succeed, before any work.
    ///
    /// # Errors
    /// - `Validation` for a blank label or phase, or a status outside
    ///   pending/active/blocked
    /// - `NotFound` for a forced parent missing from `store`
    pub fn validate(&self, store: &TaskStore) -> Result<()> {
        if let Some(label) = &self.add_label {
            if label.trim().is_empty() {
                return Err(Error::Validation("label must not be empty".to_string()));
            }
        }
        if let Some(phase) = &self.phase_override {
            if phase.trim().is_empty() {
                return Err(Error::Validation("phase must not be empty".to_string()));
            }
        }
        if let Some(status) = self.reset_status {
            if !RESETTABLE.contains(&status) {
                return Err(Error::Validation(format!(
                    "cannot reset imported tasks to {}",
                    status
                )));
            }
        }
        if let Some(parent) = &self.parent_id {
            store.require(parent)?;
        }
        Ok(())
    }
}
