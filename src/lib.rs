//! Task dependency graph and orchestration engine.
//!
//! Tasks live in a single [`TaskStore`](core::TaskStore) document: a parent
//! forest of epics and tasks with a dependency DAG laid over it. The
//! [`orchestration`] layer decides what worker agents can pick up next and
//! drives task status as they report back; [`import`] merges task packages
//! exported from other stores.

pub mod config;
pub mod core;
pub mod error;
pub mod import;
pub mod log;
pub mod orchestration;
pub mod storage;
pub mod util;

pub use error::{Error, ErrorKind, Result};
