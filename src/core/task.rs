//! Task data model.
//!
//! Tasks are the units of work handed to agents. Epics are ordinary tasks
//! that additionally scope an orchestration session over their descendants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

const ID_PREFIX: char = 'T';

/// Identifier of a task within a store.
///
/// Issued from the store's sequence counter as `T<number>`. The core treats
/// the value as opaque apart from [`TaskId::number`], which is used to keep
/// the counter ahead of every issued ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Build the canonical ID for a sequence value.
    pub fn from_number(n: u64) -> Self {
        Self(format!("{}{}", ID_PREFIX, n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric part of a canonical `T<number>` ID.
    pub fn number(&self) -> Option<u64> {
        let digits = self.0.strip_prefix(ID_PREFIX)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok()
    }

    pub fn is_canonical(&self) -> bool {
        self.number().is_some()
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task status in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created, waiting to be picked up.
    #[default]
    Pending,
    /// Waiting on an operator or a failed validation.
    Blocked,
    /// Handed to a worker agent.
    Active,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Blocked,
        TaskStatus::Active,
        TaskStatus::Done,
        TaskStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Active => "active",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    #[default]
    Task,
    Epic,
    Subtask,
}

/// Explicit scheduling priority; absent means "no opinion".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Higher rank schedules first.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
        }
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// A single task in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(rename = "type", default)]
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    /// Dependency edges. Order carries no meaning; kept free of duplicates.
    #[serde(default)]
    pub depends: Vec<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    /// Append-only.
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task of type `task` with no edges.
    pub fn new(id: impl Into<TaskId>, title: &str) -> Self {
        Self {
            id: id.into(),
            title: title.to_string(),
            description: None,
            status: TaskStatus::Pending,
            task_type: TaskType::Task,
            parent_id: None,
            depends: Vec::new(),
            priority: None,
            phase: None,
            labels: Vec::new(),
            notes: Vec::new(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn epic(id: impl Into<TaskId>, title: &str) -> Self {
        Self {
            task_type: TaskType::Epic,
            ..Self::new(id, title)
        }
    }

    pub fn with_parent(mut self, parent: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn with_depends<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        for dep in deps {
            self.add_dependency(dep.into());
        }
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }

    pub fn is_epic(&self) -> bool {
        self.task_type == TaskType::Epic
    }

    /// Done or cancelled.
    pub fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Done | TaskStatus::Cancelled)
    }

    /// Status allows handing the task to an agent (dependencies aside).
    pub fn can_start(&self) -> bool {
        matches!(self.status, TaskStatus::Pending | TaskStatus::Blocked)
    }

    pub fn depends_on(&self, id: &TaskId) -> bool {
        self.depends.contains(id)
    }

    /// Returns false when the edge was already present.
    pub fn add_dependency(&mut self, id: TaskId) -> bool {
        if self.depends.contains(&id) {
            return false;
        }
        self.depends.push(id);
        true
    }

    /// Idempotent; returns false when the label was already present.
    pub fn add_label(&mut self, label: &str) -> bool {
        if self.labels.iter().any(|l| l == label) {
            return false;
        }
        self.labels.push(label.to_string());
        true
    }

    pub fn append_note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }

    /// Lowercased title used for case-insensitive uniqueness checks.
    pub fn title_key(&self) -> String {
        self.title.to_lowercase()
    }
}
