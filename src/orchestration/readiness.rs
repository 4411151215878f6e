//! Readiness analysis within an epic's scope.
//!
//! An epic's scope is every transitive child of the epic in the parent
//! forest. A task in scope is ready when its status is pending or blocked and
//! every dependency that exists in the store is done. A dependency on a
//! cancelled task never resolves on its own; the dependent stays not-ready
//! until an operator intervenes.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::core::graph::DependencyGraph;
use crate::core::store::TaskStore;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::clog_debug;

/// How many top blockers an epic summary lists.
pub const TOP_BLOCKERS: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub blocked: usize,
    pub active: usize,
    pub done: usize,
    pub cancelled: usize,
}

impl StatusCounts {
    fn add(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Pending => self.pending += 1,
            TaskStatus::Blocked => self.blocked += 1,
            TaskStatus::Active => self.active += 1,
            TaskStatus::Done => self.done += 1,
            TaskStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.blocked + self.active + self.done + self.cancelled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockerSummary {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub dependents: usize,
}

/// Aggregate view of an epic for an orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicContext {
    pub epic_id: TaskId,
    pub title: String,
    pub counts: StatusCounts,
    pub ready: Vec<TaskId>,
    pub next_task: Option<TaskId>,
    /// Length in tasks of the longest chain of unfinished dependencies.
    pub critical_path_length: usize,
    pub top_blockers: Vec<BlockerSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub number: usize,
    pub tasks: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTask {
    pub id: TaskId,
    pub reasons: Vec<String>,
}

/// Execution plan for the unfinished part of an epic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpicAnalysis {
    pub epic_id: TaskId,
    pub total: usize,
    pub finished: usize,
    /// Wave 1 has no unfinished in-scope dependency; wave n depends on
    /// something in wave n - 1.
    pub waves: Vec<Wave>,
    pub critical_path: Vec<TaskId>,
    pub ready: Vec<TaskId>,
    pub waiting: Vec<BlockedTask>,
}

/// Read-only readiness queries over one store snapshot.
pub struct ReadinessAnalyzer<'a> {
    graph: DependencyGraph<'a>,
}

impl<'a> ReadinessAnalyzer<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self {
            graph: store.graph(),
        }
    }

    pub fn graph(&self) -> &DependencyGraph<'a> {
        &self.graph
    }

    /// Transitive children of `epic`, in insertion order.
    ///
    /// # Errors
    /// `NotFound` if `epic` is not in the store.
    pub fn scope(&self, epic: &TaskId) -> Result<Vec<&'a Task>> {
        if !self.graph.contains(epic) {
            return Err(Error::task_not_found(epic));
        }
        Ok(self.graph.descendants(epic))
    }

    /// Why `task` cannot be handed out now; empty means ready.
    pub fn blockers(&self, task: &Task) -> Vec<String> {
        let mut reasons = Vec::new();
        if !task.can_start() {
            reasons.push(format!("status is {}", task.status));
        }
        for dep in self.graph.dependencies(&task.id) {
            match dep.status {
                TaskStatus::Done => {}
                TaskStatus::Cancelled => {
                    reasons.push(format!("dependency {} was cancelled", dep.id))
                }
                status => reasons.push(format!("dependency {} is {}", dep.id, status)),
            }
        }
        reasons
    }

    pub fn is_ready(&self, task: &Task) -> bool {
        self.blockers(task).is_empty()
    }

    /// Every ready task in the epic's scope, in insertion order.
    pub fn ready_tasks(&self, epic: &TaskId) -> Result<Vec<&'a Task>> {
        let ready: Vec<&'a Task> = self
            .scope(epic)?
            .into_iter()
            .filter(|t| self.is_ready(t))
            .collect();
        clog_debug!("ready_tasks epic={} ready={}", epic, ready.len());
        Ok(ready)
    }

    /// Best next task: highest priority, then earliest `createdAt`, then
    /// smallest ID. `None` when nothing is ready.
    pub fn next_task(&self, epic: &TaskId) -> Result<Option<&'a Task>> {
        Ok(self
            .ready_tasks(epic)?
            .into_iter()
            .min_by_key(|t| {
                (
                    Reverse(t.priority.map(|p| p.rank()).unwrap_or(0)),
                    t.created_at,
                    t.id.clone(),
                )
            }))
    }

    /// Greedy maximal batch, in input order, with no dependency reachability
    /// between any two members.
    pub fn parallel_safe(&self, ready: &[&'a Task]) -> Vec<&'a Task> {
        let mut batch: Vec<&'a Task> = Vec::new();
        for &candidate in ready {
            if batch
                .iter()
                .all(|member| self.graph.independent(&member.id, &candidate.id))
            {
                batch.push(candidate);
            }
        }
        batch
    }

    pub fn epic_context(&self, epic: &TaskId) -> Result<EpicContext> {
        let epic_task = self
            .graph
            .get(epic)
            .ok_or_else(|| Error::task_not_found(epic))?;
        let scope = self.scope(epic)?;

        let mut counts = StatusCounts::default();
        for task in &scope {
            counts.add(task.status);
        }

        let mut blockers: Vec<BlockerSummary> = scope
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .map(|t| BlockerSummary {
                id: t.id.clone(),
                title: t.title.clone(),
                status: t.status,
                dependents: self.graph.dependent_count(&t.id),
            })
            .filter(|b| b.dependents > 0)
            .collect();
        // Stable: ties keep insertion order.
        blockers.sort_by_key(|b| Reverse(b.dependents));
        blockers.truncate(TOP_BLOCKERS);

        Ok(EpicContext {
            epic_id: epic.clone(),
            title: epic_task.title.clone(),
            counts,
            ready: ids(&self.ready_tasks(epic)?),
            next_task: self.next_task(epic)?.map(|t| t.id.clone()),
            critical_path_length: self.critical_path(&scope)?.len(),
            top_blockers: blockers,
        })
    }

    /// Waves, critical path and ready/waiting split for an epic.
    pub fn analyze_epic(&self, epic: &TaskId) -> Result<EpicAnalysis> {
        let scope = self.scope(epic)?;
        let unfinished: Vec<&'a Task> = scope.iter().copied().filter(|t| !t.is_finished()).collect();
        let order = self.graph.topological_order(&ids(&unfinished))?;

        let mut wave_of: HashMap<TaskId, usize> = HashMap::new();
        for id in &order {
            let wave = self
                .graph
                .dependencies(id)
                .iter()
                .filter_map(|d| wave_of.get(&d.id))
                .max()
                .map_or(1, |w| w + 1);
            wave_of.insert(id.clone(), wave);
        }

        let mut waves: Vec<Wave> = Vec::new();
        for task in &unfinished {
            let number = wave_of.get(&task.id).copied().unwrap_or(1);
            while waves.len() < number {
                waves.push(Wave {
                    number: waves.len() + 1,
                    tasks: Vec::new(),
                });
            }
            waves[number - 1].tasks.push(task.id.clone());
        }

        let mut ready = Vec::new();
        let mut waiting = Vec::new();
        for task in &unfinished {
            let reasons = self.blockers(task);
            if reasons.is_empty() {
                ready.push(task.id.clone());
            } else {
                waiting.push(BlockedTask {
                    id: task.id.clone(),
                    reasons,
                });
            }
        }

        Ok(EpicAnalysis {
            epic_id: epic.clone(),
            total: scope.len(),
            finished: scope.len() - unfinished.len(),
            waves,
            critical_path: self.critical_path(&scope)?,
            ready,
            waiting,
        })
    }

    /// Longest chain of unfinished tasks linked by dependency edges, listed
    /// from the deepest dependency to the last dependent.
    fn critical_path(&self, scope: &[&'a Task]) -> Result<Vec<TaskId>> {
        let unfinished: Vec<TaskId> = scope
            .iter()
            .filter(|t| !t.is_finished())
            .map(|t| t.id.clone())
            .collect();
        let order = self.graph.topological_order(&unfinished)?;

        let mut length: HashMap<&TaskId, usize> = HashMap::new();
        let mut previous: HashMap<&TaskId, TaskId> = HashMap::new();
        let mut best: Option<(&TaskId, usize)> = None;
        for id in &order {
            let mut own = 1;
            for dep in self.graph.dependencies(id) {
                if let Some(&len) = length.get(&dep.id) {
                    if len + 1 > own {
                        own = len + 1;
                        previous.insert(id, dep.id.clone());
                    }
                }
            }
            length.insert(id, own);
            if best.map_or(true, |(_, len)| own > len) {
                best = Some((id, own));
            }
        }

        let mut path = Vec::new();
        let mut cursor = best.map(|(id, _)| id.clone());
        while let Some(id) = cursor {
            cursor = previous.get(&id).cloned();
            path.push(id);
        }
        path.reverse();
        Ok(path)
    }
}

fn ids(tasks: &[&Task]) -> Vec<TaskId> {
    tasks.iter().map(|t| t.id.clone()).collect()
}
