//! Core domain models: tasks, the task document, and the graph view over it.

pub mod graph;
pub mod store;
pub mod task;

pub use graph::DependencyGraph;
pub use store::{compute_checksum, IntegrityIssue, NewTask, TaskStore};
pub use task::{Priority, Task, TaskId, TaskStatus, TaskType};
