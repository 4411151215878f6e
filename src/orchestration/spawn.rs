//! Spawn coordination: claiming a task for a worker agent and judging the
//! worker's completion report.
//!
//! Status transitions driven here:
//!
//! ```text
//! pending/blocked --prepare_spawn--> active --validate_spawn_output--> done
//!                                           \-----(violations)-------> blocked
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::store::TaskStore;
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::orchestration::protocol::{CompletionReport, ValidatorRegistry, Violation};
use crate::orchestration::readiness::ReadinessAnalyzer;
use crate::storage::TaskRepository;
use crate::{clog, clog_debug, clog_warn};

/// Default number of read-compute-write attempts for [`SpawnCoordinator::claim`].
pub const DEFAULT_CLAIM_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBrief {
    pub id: TaskId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
}

impl From<&Task> for TaskBrief {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
        }
    }
}

/// A resolved dependency with the notes its worker left behind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyBrief {
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    pub notes: Vec<String>,
}

/// Everything a worker agent needs to start on a task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnContext {
    pub task: TaskBrief,
    /// Nearest enclosing epic, if any.
    pub epic_id: Option<TaskId>,
    /// Nearest parent first.
    pub ancestors: Vec<TaskBrief>,
    pub dependencies: Vec<DependencyBrief>,
    pub phase: Option<String>,
    pub labels: Vec<String>,
    pub prepared_at: DateTime<Utc>,
}

impl SpawnContext {
    /// Markdown brief handed to the worker agent.
    pub fn render_brief(&self) -> String {
        let mut out = format!("# Task {}: {}\n\n", self.task.id, self.task.title);
        if let Some(description) = &self.task.description {
            out.push_str(description);
            out.push_str("\n\n");
        }

        if !self.ancestors.is_empty() {
            out.push_str("## Context\n\n");
            for ancestor in self.ancestors.iter().rev() {
                out.push_str(&format!("- {} {}\n", ancestor.id, ancestor.title));
            }
            out.push('\n');
        }

        if !self.dependencies.is_empty() {
            out.push_str("## Completed dependencies\n\n");
            for dep in &self.dependencies {
                out.push_str(&format!("- {} {}\n", dep.id, dep.title));
                for note in &dep.notes {
                    out.push_str(&format!("  - {}\n", note));
                }
            }
            out.push('\n');
        }

        if self.phase.is_some() || !self.labels.is_empty() {
            out.push_str("## Classification\n\n");
            if let Some(phase) = &self.phase {
                out.push_str(&format!("- phase: {}\n", phase));
            }
            if !self.labels.is_empty() {
                out.push_str(&format!("- labels: {}\n", self.labels.join(", ")));
            }
            out.push('\n');
        }

        out.push_str("## When finished\n\n");
        out.push_str(&format!(
            "Return a completion report with `taskId` \"{}\", `status` \"complete\", \
             a non-empty `summary`, and the protocols you followed.\n",
            self.task.id
        ));
        out
    }
}

/// Result of judging a completion report. Violations are always returned,
/// never dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnVerdict {
    pub task_id: TaskId,
    pub valid: bool,
    pub status: TaskStatus,
    pub violations: Vec<Violation>,
}

/// Drives the spawn state machine against a store value.
#[derive(Debug)]
pub struct SpawnCoordinator {
    validators: ValidatorRegistry,
    max_claim_attempts: u32,
}

impl Default for SpawnCoordinator {
    fn default() -> Self {
        Self::new(ValidatorRegistry::new())
    }
}

impl SpawnCoordinator {
    pub fn new(validators: ValidatorRegistry) -> Self {
        Self {
            validators,
            max_claim_attempts: DEFAULT_CLAIM_ATTEMPTS,
        }
    }

    pub fn with_max_claim_attempts(mut self, attempts: u32) -> Self {
        self.max_claim_attempts = attempts.max(1);
        self
    }

    pub fn validators(&self) -> &ValidatorRegistry {
        &self.validators
    }

    /// Build the worker context for `id` and move it to `active`.
    ///
    /// # Errors
    /// - `NotFound` for an unknown task
    /// - `NotReady` if the status is not pending/blocked or a dependency is
    ///   not done; the store is left unchanged
    pub fn prepare_spawn(&self, store: &mut TaskStore, id: &TaskId) -> Result<SpawnContext> {
        let context = {
            let analyzer = ReadinessAnalyzer::new(store);
            let graph = analyzer.graph();
            let task = graph.get(id).ok_or_else(|| Error::task_not_found(id))?;

            let reasons = analyzer.blockers(task);
            if !reasons.is_empty() {
                clog_debug!("prepare_spawn refused {}: {:?}", id, reasons);
                return Err(Error::NotReady {
                    id: id.clone(),
                    reasons,
                });
            }

            let ancestors = graph.ancestors(id);
            SpawnContext {
                task: TaskBrief::from(task),
                epic_id: ancestors.iter().find(|a| a.is_epic()).map(|a| a.id.clone()),
                ancestors: ancestors.iter().map(|a| TaskBrief::from(*a)).collect(),
                dependencies: graph
                    .dependencies(id)
                    .into_iter()
                    .map(|d| DependencyBrief {
                        id: d.id.clone(),
                        title: d.title.clone(),
                        status: d.status,
                        notes: d.notes.clone(),
                    })
                    .collect(),
                phase: task.phase.clone(),
                labels: task.labels.clone(),
                prepared_at: Utc::now(),
            }
        };

        store.set_status(id, TaskStatus::Active)?;
        clog!("Task {} is now active", id);
        Ok(SpawnContext {
            task: TaskBrief {
                status: TaskStatus::Active,
                ..context.task
            },
            ..context
        })
    }

    /// Judge a worker's report: `done` when every check passes, otherwise
    /// back to `blocked` with one note per violation.
    ///
    /// # Errors
    /// - `NotFound` for an unknown task
    /// - `InvalidTransition` if the task is not `active`
    pub fn validate_spawn_output(
        &self,
        store: &mut TaskStore,
        id: &TaskId,
        report: &CompletionReport,
    ) -> Result<SpawnVerdict> {
        let current = store.require(id)?.status;
        if current != TaskStatus::Active {
            return Err(Error::InvalidTransition {
                id: id.clone(),
                from: current,
                to: TaskStatus::Done,
            });
        }

        let violations = self.validators.validate(id, report);
        let status = if violations.is_empty() {
            TaskStatus::Done
        } else {
            TaskStatus::Blocked
        };

        let task = store.get_mut(id).ok_or_else(|| Error::task_not_found(id))?;
        if violations.is_empty() {
            task.append_note(format!("[completed] {}", report.summary.trim()));
            for finding in &report.key_findings {
                task.append_note(format!("[finding] {}", finding));
            }
        } else {
            for violation in &violations {
                task.append_note(format!("[validation] {}", violation));
            }
        }
        task.set_status(status);
        store.commit();

        if violations.is_empty() {
            clog!("Task {} completed", id);
        } else {
            clog_warn!("Task {} failed validation: {} violation(s)", id, violations.len());
        }
        Ok(SpawnVerdict {
            task_id: id.clone(),
            valid: violations.is_empty(),
            status,
            violations,
        })
    }

    /// Claim `id` against persisted state with optimistic compare-and-write.
    ///
    /// Each attempt reloads the document, prepares the spawn on the fresh
    /// snapshot, and writes only if nobody else wrote in between. A reload
    /// that shows the task already active fails with `NotReady` instead of
    /// overwriting the other claim.
    pub fn claim<R: TaskRepository>(&self, repo: &R, id: &TaskId) -> Result<SpawnContext> {
        let attempts = self.max_claim_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            let mut store = repo.load()?;
            let expected = store.checksum().to_string();
            let context = self.prepare_spawn(&mut store, id)?;
            match repo.compare_and_save(&store, &expected) {
                Ok(()) => return Ok(context),
                Err(e @ Error::StaleSnapshot { .. }) => {
                    clog_warn!("claim {} attempt {}/{} lost a race: {}", id, attempt, attempts, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| Error::StaleSnapshot {
            expected: String::new(),
            actual: String::new(),
        }))
    }

    /// Load, judge the report, and persist the outcome.
    pub fn record_outcome<R: TaskRepository>(
        &self,
        repo: &R,
        id: &TaskId,
        report: &CompletionReport,
    ) -> Result<SpawnVerdict> {
        let mut store = repo.load()?;
        let expected = store.checksum().to_string();
        let verdict = self.validate_spawn_output(&mut store, id, report)?;
        repo.compare_and_save(&store, &expected)?;
        Ok(verdict)
    }
}
