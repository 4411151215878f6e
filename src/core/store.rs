//! The task document: ordered task sequence plus integrity metadata.
//!
//! `TaskStore` is a plain value. Callers load it, run operations that take
//! `&mut TaskStore`, and hand it back to the storage layer. Every successful
//! mutation recomputes the checksum and refreshes `lastUpdated`; a failed
//! mutation leaves the value untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

use crate::core::graph::DependencyGraph;
use crate::core::task::{Priority, Task, TaskId, TaskStatus, TaskType};
use crate::error::{Error, Result};
use crate::{clog, clog_debug};

const STORE_VERSION: &str = "1.0";
const CHECKSUM_LEN: usize = 16;

/// Highest ID number the store will issue or keep on import.
pub const MAX_SEQUENCE: u64 = u64::MAX / 2;

/// Content fingerprint over a task sequence.
///
/// First 16 hex characters of SHA-256 over the compact JSON encoding.
pub fn compute_checksum(tasks: &[Task]) -> String {
    let encoded = serde_json::to_vec(tasks).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    let mut fingerprint = hex::encode(digest);
    fingerprint.truncate(CHECKSUM_LEN);
    fingerprint
}

/// Smallest ID number above `after` that `taken` does not claim.
///
/// # Errors
/// `Validation` once the numbers would pass [`MAX_SEQUENCE`].
pub(crate) fn next_free_number(after: u64, taken: impl Fn(&TaskId) -> bool) -> Result<u64> {
    let mut n = after;
    loop {
        n = n
            .checked_add(1)
            .filter(|n| *n <= MAX_SEQUENCE)
            .ok_or_else(|| Error::Validation(format!("no task IDs left after T{}", after)))?;
        if !taken(&TaskId::from_number(n)) {
            return Ok(n);
        }
    }
}

/// Dependency edges whose endpoints sit under different epic roots.
fn cross_epic_edges(tasks: &[Task]) -> Vec<(TaskId, TaskId)> {
    let graph = DependencyGraph::build(tasks);
    let epic_of = |id: &TaskId| graph.root(id).filter(|r| r.is_epic()).map(|r| &r.id);
    let mut edges = Vec::new();
    for task in tasks {
        let Some(own) = epic_of(&task.id) else {
            continue;
        };
        for dep in &task.depends {
            if epic_of(dep).is_some_and(|other| other != own) {
                edges.push((task.id.clone(), dep.clone()));
            }
        }
    }
    edges
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub checksum: String,
    /// Highest sequence value ever issued.
    pub sequence: u64,
}

/// Input for [`TaskStore::add_task`]; the store assigns the ID.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub parent_id: Option<TaskId>,
    pub depends: Vec<TaskId>,
    pub priority: Option<Priority>,
    pub phase: Option<String>,
    pub labels: Vec<String>,
}

impl NewTask {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn epic(title: &str) -> Self {
        Self {
            task_type: TaskType::Epic,
            ..Self::new(title)
        }
    }

    pub fn parent(mut self, parent: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent.into());
        self
    }

    pub fn depends<I, T>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TaskId>,
    {
        self.depends.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// One problem found by [`TaskStore::validate_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "issue")]
pub enum IntegrityIssue {
    DuplicateId { id: TaskId },
    DanglingParent { task: TaskId, parent: TaskId },
    DanglingDependency { task: TaskId, dependency: TaskId },
    SelfDependency { task: TaskId },
    CrossEpicDependency { task: TaskId, dependency: TaskId },
    Cycle { path: Vec<TaskId> },
    SequenceBehind { sequence: u64, highest: u64 },
    ChecksumMismatch { stored: String, computed: String },
}

/// The whole task document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStore {
    version: String,
    #[serde(rename = "_meta")]
    meta: StoreMeta,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    tasks: Vec<Task>,
    /// Archived tasks keep their IDs reserved.
    #[serde(default)]
    archived: Vec<Task>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            meta: StoreMeta {
                checksum: compute_checksum(&[]),
                sequence: 0,
            },
            last_updated: None,
            tasks: Vec::new(),
            archived: Vec::new(),
        }
    }

    /// Build a store from authored tasks, raising the sequence counter to the
    /// highest canonical ID present.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let mut store = Self::new();
        for task in &tasks {
            store.reserve(&task.id);
        }
        store.tasks = tasks;
        store.commit();
        store
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn archived(&self) -> &[Task] {
        &self.archived
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn checksum(&self) -> &str {
        &self.meta.checksum
    }

    pub fn sequence(&self) -> u64 {
        self.meta.sequence
    }

    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.last_updated
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub(crate) fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| &t.id == id)
    }

    pub fn require(&self, id: &TaskId) -> Result<&Task> {
        self.get(id).ok_or_else(|| Error::task_not_found(id))
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.get(id).is_some()
    }

    /// Whether `id` names an active or archived task.
    pub fn contains_any(&self, id: &TaskId) -> bool {
        self.contains(id) || self.archived.iter().any(|t| &t.id == id)
    }

    /// Whether `id` may already have been handed out: present in the store or
    /// at or below the sequence counter.
    pub fn is_issued(&self, id: &TaskId) -> bool {
        self.contains_any(id) || id.number().is_some_and(|n| n <= self.meta.sequence)
    }

    /// Case-insensitive titles of the live tasks, mapped to their owners.
    pub fn title_index(&self) -> HashMap<String, TaskId> {
        let mut index = HashMap::new();
        for task in &self.tasks {
            index.entry(task.title_key()).or_insert_with(|| task.id.clone());
        }
        index
    }

    pub fn graph(&self) -> DependencyGraph<'_> {
        DependencyGraph::build(&self.tasks)
    }

    /// Issue the next unused ID and advance the counter.
    ///
    /// # Errors
    /// `Validation` when the ID space is exhausted; the counter is unchanged.
    pub fn mint_id(&mut self) -> Result<TaskId> {
        let n = next_free_number(self.meta.sequence, |id| self.contains_any(id))?;
        self.meta.sequence = n;
        Ok(TaskId::from_number(n))
    }

    /// Keep the counter at or above a canonical ID that enters the store.
    pub(crate) fn reserve(&mut self, id: &TaskId) {
        if let Some(n) = id.number() {
            self.meta.sequence = self.meta.sequence.max(n);
        }
    }

    /// Recompute the checksum and refresh `lastUpdated`.
    pub(crate) fn commit(&mut self) {
        self.meta.checksum = compute_checksum(&self.tasks);
        self.last_updated = Some(Utc::now());
    }

    /// Surface a checksum that does not match the task sequence.
    pub fn verify_checksum(&self) -> Result<()> {
        let actual = compute_checksum(&self.tasks);
        if actual != self.meta.checksum {
            return Err(Error::Integrity {
                expected: self.meta.checksum.clone(),
                actual,
            });
        }
        Ok(())
    }

    // ========== Authoring ==========

    /// Create a task with a freshly minted ID.
    ///
    /// # Errors
    /// - `Validation` for an empty title
    /// - `NotFound` for an unknown parent or dependency
    /// - `Dependency` for a dependency in another epic's tree
    pub fn add_task(&mut self, new: NewTask) -> Result<TaskId> {
        if new.title.trim().is_empty() {
            return Err(Error::Validation("task title must not be empty".to_string()));
        }
        if let Some(parent) = &new.parent_id {
            self.require(parent)?;
        }
        for dep in &new.depends {
            self.require(dep)?;
        }
        if let Some(dep) = new
            .depends
            .iter()
            .find(|dep| self.crosses_epic(new.parent_id.as_ref(), dep))
        {
            return Err(Error::Dependency(format!(
                "dependency {} belongs to a different epic",
                dep
            )));
        }

        let id = self.mint_id()?;
        let mut task = Task::new(id.clone(), new.title.trim());
        task.description = new.description;
        task.task_type = new.task_type;
        task.parent_id = new.parent_id;
        task.priority = new.priority;
        task.phase = new.phase;
        for dep in new.depends {
            task.add_dependency(dep);
        }
        for label in &new.labels {
            task.add_label(label);
        }
        task.touch();

        clog_debug!("TaskStore::add_task id={} title={:?}", id, task.title);
        self.tasks.push(task);
        self.commit();
        Ok(id)
    }

    /// Root of the tree containing `id`, when that root is an epic.
    fn epic_root(&self, id: &TaskId) -> Option<TaskId> {
        self.graph()
            .root(id)
            .filter(|root| root.is_epic())
            .map(|root| root.id.clone())
    }

    /// An edge from a task placed under `parent` to `dep` would leave the
    /// task's epic tree.
    fn crosses_epic(&self, parent: Option<&TaskId>, dep: &TaskId) -> bool {
        let own = parent.and_then(|p| self.epic_root(p));
        matches!((own, self.epic_root(dep)), (Some(a), Some(b)) if a != b)
    }

    /// Add a dependency edge `task -> dep`.
    ///
    /// Returns `false` if the edge already exists.
    ///
    /// # Errors
    /// - `NotFound` for unknown IDs
    /// - `Dependency` for a reflexive edge or an edge across epic trees
    /// - `Cycle` if the edge would close a cycle; the store is untouched
    pub fn add_dependency(&mut self, task: &TaskId, dep: &TaskId) -> Result<bool> {
        if task == dep {
            return Err(Error::Dependency(format!("{} cannot depend on itself", task)));
        }
        self.require(dep)?;
        if self.require(task)?.depends_on(dep) {
            return Ok(false);
        }
        if let (Some(a), Some(b)) = (self.epic_root(task), self.epic_root(dep)) {
            if a != b {
                return Err(Error::Dependency(format!(
                    "{} (epic {}) cannot depend on {} (epic {})",
                    task, a, dep, b
                )));
            }
        }

        let mut candidate = self.tasks.clone();
        if let Some(t) = candidate.iter_mut().find(|t| &t.id == task) {
            t.add_dependency(dep.clone());
        }
        if let Some(path) = DependencyGraph::build(&candidate).find_cycle() {
            return Err(Error::Cycle { path });
        }

        if let Some(t) = self.get_mut(task) {
            t.add_dependency(dep.clone());
            t.touch();
        }
        self.commit();
        Ok(true)
    }

    /// Remove a dependency edge. Returns `false` if it was not present.
    pub fn remove_dependency(&mut self, task: &TaskId, dep: &TaskId) -> Result<bool> {
        let t = self
            .get_mut(task)
            .ok_or_else(|| Error::task_not_found(task))?;
        let before = t.depends.len();
        t.depends.retain(|d| d != dep);
        if t.depends.len() == before {
            return Ok(false);
        }
        t.touch();
        self.commit();
        Ok(true)
    }

    /// Move `task` under `new_parent`, or make it a root with `None`.
    ///
    /// # Errors
    /// - `Cycle` if `new_parent` is `task` itself or one of its descendants
    /// - `Dependency` if the move would leave a dependency of the moved
    ///   subtree, or on it, pointing into a different epic
    pub fn reparent(&mut self, task: &TaskId, new_parent: Option<&TaskId>) -> Result<()> {
        self.require(task)?;
        if let Some(parent) = new_parent {
            self.require(parent)?;
            let graph = self.graph();
            let closes_loop =
                parent == task || graph.ancestors(parent).iter().any(|a| &a.id == task);
            if closes_loop {
                return Err(Error::Cycle {
                    path: vec![task.clone(), parent.clone(), task.clone()],
                });
            }
        }

        let mut candidate = self.tasks.clone();
        if let Some(t) = candidate.iter_mut().find(|t| &t.id == task) {
            t.parent_id = new_parent.cloned();
        }
        let existing: HashSet<(TaskId, TaskId)> = cross_epic_edges(&self.tasks).into_iter().collect();
        if let Some((from, to)) = cross_epic_edges(&candidate)
            .into_iter()
            .find(|edge| !existing.contains(edge))
        {
            return Err(Error::Dependency(format!(
                "moving {} would leave {} depending on {} in a different epic",
                task, from, to
            )));
        }

        if let Some(t) = self.get_mut(task) {
            t.parent_id = new_parent.cloned();
            t.touch();
        }
        clog_debug!("TaskStore::reparent {} -> {:?}", task, new_parent);
        self.commit();
        Ok(())
    }

    /// Detach `task` from its parent; subtasks become plain tasks.
    pub fn promote(&mut self, task: &TaskId) -> Result<()> {
        self.reparent(task, None)?;
        if let Some(t) = self.get_mut(task) {
            if t.task_type == TaskType::Subtask {
                t.task_type = TaskType::Task;
                self.commit();
            }
        }
        Ok(())
    }

    pub fn set_status(&mut self, task: &TaskId, status: TaskStatus) -> Result<()> {
        let t = self
            .get_mut(task)
            .ok_or_else(|| Error::task_not_found(task))?;
        t.set_status(status);
        self.commit();
        Ok(())
    }

    pub fn append_note(&mut self, task: &TaskId, note: impl Into<String>) -> Result<()> {
        let t = self
            .get_mut(task)
            .ok_or_else(|| Error::task_not_found(task))?;
        t.append_note(note);
        t.touch();
        self.commit();
        Ok(())
    }

    /// Move a finished task to the archive.
    ///
    /// # Errors
    /// `Validation` if the task is unfinished, still has children, or is
    /// still a dependency of a live task.
    pub fn archive(&mut self, task: &TaskId) -> Result<()> {
        let t = self.require(task)?;
        if !t.is_finished() {
            return Err(Error::Validation(format!(
                "{} is {} and cannot be archived",
                task, t.status
            )));
        }
        let graph = self.graph();
        if !graph.children(task).is_empty() {
            return Err(Error::Validation(format!("{} still has children", task)));
        }
        let dependents: Vec<String> = graph
            .dependents(task)
            .iter()
            .map(|d| d.id.to_string())
            .collect();
        if !dependents.is_empty() {
            return Err(Error::Validation(format!(
                "{} is still required by {}",
                task,
                dependents.join(", ")
            )));
        }

        if let Some(pos) = self.tasks.iter().position(|t| &t.id == task) {
            let archived = self.tasks.remove(pos);
            self.archived.push(archived);
        }
        clog!("Archived task {}", task);
        self.commit();
        Ok(())
    }

    /// Append already-validated tasks (import commit path).
    pub(crate) fn append_tasks(&mut self, tasks: Vec<Task>) {
        for task in &tasks {
            self.reserve(&task.id);
        }
        self.tasks.extend(tasks);
        self.commit();
    }

    /// Scan for broken invariants without repairing anything.
    pub fn validate_integrity(&self) -> Vec<IntegrityIssue> {
        let mut issues = Vec::new();

        let computed = compute_checksum(&self.tasks);
        if computed != self.meta.checksum {
            issues.push(IntegrityIssue::ChecksumMismatch {
                stored: self.meta.checksum.clone(),
                computed,
            });
        }

        let mut seen = HashSet::new();
        let mut highest = 0;
        for task in self.tasks.iter().chain(self.archived.iter()) {
            if !seen.insert(&task.id) {
                issues.push(IntegrityIssue::DuplicateId {
                    id: task.id.clone(),
                });
            }
            highest = highest.max(task.id.number().unwrap_or(0));
        }
        if self.meta.sequence < highest {
            issues.push(IntegrityIssue::SequenceBehind {
                sequence: self.meta.sequence,
                highest,
            });
        }

        for task in &self.tasks {
            if let Some(parent) = &task.parent_id {
                if !self.contains(parent) {
                    issues.push(IntegrityIssue::DanglingParent {
                        task: task.id.clone(),
                        parent: parent.clone(),
                    });
                }
            }
            for dep in &task.depends {
                if dep == &task.id {
                    issues.push(IntegrityIssue::SelfDependency {
                        task: task.id.clone(),
                    });
                } else if !self.contains(dep) {
                    issues.push(IntegrityIssue::DanglingDependency {
                        task: task.id.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        for (task, dependency) in cross_epic_edges(&self.tasks) {
            issues.push(IntegrityIssue::CrossEpicDependency { task, dependency });
        }

        let without_self_edges: Vec<Task> = self
            .tasks
            .iter()
            .cloned()
            .map(|mut t| {
                let id = t.id.clone();
                t.depends.retain(|d| d != &id);
                t
            })
            .collect();
        if let Some(path) = DependencyGraph::build(&without_self_edges).find_cycle() {
            issues.push(IntegrityIssue::Cycle { path });
        }

        issues
    }
}
