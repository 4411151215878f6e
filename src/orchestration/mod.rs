//! Orchestration layer: deciding which tasks can be handed to worker agents
//! and driving their status as agents pick them up and report back.
//!
//! Everything here operates on a loaded [`TaskStore`](crate::core::TaskStore)
//! value; persistence stays with the caller or a
//! [`TaskRepository`](crate::storage::TaskRepository).

pub mod protocol;
pub mod readiness;
pub mod spawn;

pub use protocol::{
    CompletionReport, ProtocolKind, ProtocolValidator, ProtocolVerdict, ReportStatus,
    ValidatorRegistry, Violation,
};
pub use readiness::{EpicAnalysis, EpicContext, ReadinessAnalyzer, TOP_BLOCKERS};
pub use spawn::{SpawnContext, SpawnCoordinator, SpawnVerdict, DEFAULT_CLAIM_ATTEMPTS};
