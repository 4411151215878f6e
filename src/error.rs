use thiserror::Error;

use crate::core::task::{TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Title conflict: {}", titles.join(", "))]
    Conflict { titles: Vec<String> },

    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Dependency cycle detected: {}", path.iter().map(|id| id.as_str()).collect::<Vec<_>>().join(" -> "))]
    Cycle { path: Vec<TaskId> },

    #[error("Checksum mismatch (expected {expected}, found {actual})")]
    Integrity { expected: String, actual: String },

    #[error("Task {id} is not ready: {}", reasons.join("; "))]
    NotReady { id: TaskId, reasons: Vec<String> },

    #[error("Invalid transition for {id} from {from} to {to}")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Stale snapshot (loaded {expected}, store now {actual})")]
    StaleSnapshot { expected: String, actual: String },
}

/// Coarse classification of [`Error`], matching the error taxonomy callers
/// branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Dependency,
    Integrity,
    NotReady,
    Stale,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Json(_) | Error::TomlParse(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Dependency(_) | Error::Cycle { .. } => ErrorKind::Dependency,
            Error::Integrity { .. } => ErrorKind::Integrity,
            Error::NotReady { .. } | Error::InvalidTransition { .. } => ErrorKind::NotReady,
            Error::StaleSnapshot { .. } => ErrorKind::Stale,
            Error::Io(_) | Error::TomlSerialize(_) | Error::NoHomeDir | Error::TaskJoin(_) => {
                ErrorKind::Io
            }
        }
    }

    /// Process exit code used by the command layer.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Validation => 2,
            ErrorKind::NotFound => 4,
            ErrorKind::Conflict => 5,
            ErrorKind::Dependency => 6,
            ErrorKind::Integrity => 7,
            ErrorKind::NotReady => 8,
            ErrorKind::Stale => 9,
            ErrorKind::Io => 1,
        }
    }

    pub(crate) fn task_not_found(id: &TaskId) -> Self {
        Error::NotFound(format!("task {}", id))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
