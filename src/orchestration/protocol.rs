//! Completion reports and the protocol validators that judge them.
//!
//! Protocol-specific rules (consensus, contribution, testing) live outside
//! this crate. They plug in through [`ProtocolValidator`] and are only ever
//! seen as pass/fail plus a list of violations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    Consensus,
    Contribution,
    Testing,
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolKind::Consensus => write!(f, "consensus"),
            ProtocolKind::Contribution => write!(f, "contribution"),
            ProtocolKind::Testing => write!(f, "testing"),
        }
    }
}

/// Outcome a worker claims for its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
    Partial,
    Blocked,
}

/// Structured report a worker agent returns when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub task_id: TaskId,
    pub status: ReportStatus,
    pub summary: String,
    #[serde(default)]
    pub key_findings: Vec<String>,
    #[serde(default)]
    pub files_changed: Vec<String>,
    /// Protocols the work claims to follow; each must pass its validator.
    #[serde(default)]
    pub protocols: Vec<ProtocolKind>,
    /// Protocol-specific payload, opaque here.
    #[serde(default)]
    pub details: serde_json::Value,
}

impl CompletionReport {
    pub fn complete(task_id: impl Into<TaskId>, summary: &str) -> Self {
        Self {
            task_id: task_id.into(),
            status: ReportStatus::Complete,
            summary: summary.to_string(),
            key_findings: Vec::new(),
            files_changed: Vec::new(),
            protocols: Vec::new(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_protocol(mut self, kind: ProtocolKind) -> Self {
        if !self.protocols.contains(&kind) {
            self.protocols.push(kind);
        }
        self
    }
}

/// `{valid, violations[]}` returned by a validator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVerdict {
    pub valid: bool,
    pub violations: Vec<String>,
}

impl ProtocolVerdict {
    pub fn pass() -> Self {
        Self {
            valid: true,
            violations: Vec::new(),
        }
    }

    pub fn fail<I, S>(violations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            valid: false,
            violations: violations.into_iter().map(Into::into).collect(),
        }
    }
}

/// A rule check for one protocol kind.
pub trait ProtocolValidator: Send + Sync {
    fn validate(&self, task_id: &TaskId, report: &CompletionReport) -> ProtocolVerdict;
}

impl<F> ProtocolValidator for F
where
    F: Fn(&TaskId, &CompletionReport) -> ProtocolVerdict + Send + Sync,
{
    fn validate(&self, task_id: &TaskId, report: &CompletionReport) -> ProtocolVerdict {
        self(task_id, report)
    }
}

/// A violation attributed to the check that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// `report` for the built-in shape check, else the protocol name.
    pub source: String,
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.message)
    }
}

/// Validators by protocol kind.
///
/// The report's own shape is always checked. Each protocol the report
/// declares must have a registered validator; a declared protocol nobody can
/// check counts as a violation rather than a pass.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<ProtocolKind, Box<dyn ProtocolValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: ProtocolKind, validator: impl ProtocolValidator + 'static) {
        self.validators.insert(kind, Box::new(validator));
    }

    pub fn with(mut self, kind: ProtocolKind, validator: impl ProtocolValidator + 'static) -> Self {
        self.register(kind, validator);
        self
    }

    pub fn has(&self, kind: ProtocolKind) -> bool {
        self.validators.contains_key(&kind)
    }

    /// Run every applicable check. An empty result means the report passed.
    pub fn validate(&self, task_id: &TaskId, report: &CompletionReport) -> Vec<Violation> {
        let mut violations = check_report_shape(task_id, report);

        for kind in &report.protocols {
            let source = kind.to_string();
            match self.validators.get(kind) {
                Some(validator) => {
                    let verdict = validator.validate(task_id, report);
                    if !verdict.valid && verdict.violations.is_empty() {
                        violations.push(Violation {
                            source,
                            message: "validator rejected the report".to_string(),
                        });
                    } else {
                        violations.extend(verdict.violations.into_iter().map(|message| {
                            Violation {
                                source: source.clone(),
                                message,
                            }
                        }));
                    }
                }
                None => violations.push(Violation {
                    source,
                    message: "no validator registered".to_string(),
                }),
            }
        }

        violations
    }
}

impl std::fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<String> = self.validators.keys().map(|k| k.to_string()).collect();
        kinds.sort();
        f.debug_struct("ValidatorRegistry")
            .field("protocols", &kinds)
            .finish()
    }
}

fn check_report_shape(task_id: &TaskId, report: &CompletionReport) -> Vec<Violation> {
    let mut violations = Vec::new();
    let mut push = |message: String| {
        violations.push(Violation {
            source: "report".to_string(),
            message,
        })
    };

    if &report.task_id != task_id {
        push(format!(
            "report is for {} but was submitted for {}",
            report.task_id, task_id
        ));
    }
    match report.status {
        ReportStatus::Complete => {}
        ReportStatus::Partial => push("work reported as partial".to_string()),
        ReportStatus::Blocked => push("worker reported itself blocked".to_string()),
    }
    if report.summary.trim().is_empty() {
        push("summary is empty".to_string());
    }
    violations
}
