//! On-disk shape of an exported task package.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::core::store::TaskStore;
use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::{clog, clog_debug};

pub const PACKAGE_FORMAT: &str = "cairn-export";
pub const PACKAGE_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSource {
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageMeta {
    pub format: String,
    #[serde(default)]
    pub version: String,
    pub exported_at: Option<DateTime<Utc>>,
    pub source: PackageSource,
}

/// Tasks exported from one store for merging into another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportPackage {
    #[serde(rename = "_meta")]
    pub meta: PackageMeta,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl ImportPackage {
    pub fn new(project: &str, tasks: Vec<Task>) -> Self {
        Self {
            meta: PackageMeta {
                format: PACKAGE_FORMAT.to_string(),
                version: PACKAGE_VERSION.to_string(),
                exported_at: Some(Utc::now()),
                source: PackageSource {
                    project: project.to_string(),
                    checksum: None,
                },
            },
            tasks,
        }
    }

    pub fn project(&self) -> &str {
        &self.meta.source.project
    }

    /// Parse and structurally validate package JSON.
    ///
    /// Malformed JSON is a `Validation` error like any other structural
    /// problem.
    pub fn parse(contents: &str) -> Result<Self> {
        let package: Self = serde_json::from_str(contents)
            .map_err(|e| Error::Validation(format!("invalid package JSON: {}", e)))?;
        package.validate()?;
        Ok(package)
    }

    pub fn read(path: &Path) -> Result<Self> {
        clog_debug!("ImportPackage::read path={}", path.display());
        if !path.exists() {
            return Err(Error::NotFound(format!("package {}", path.display())));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        clog!("Exported {} tasks to {}", self.tasks.len(), path.display());
        Ok(())
    }

    /// Check the format marker and that the task list is usable.
    pub fn validate(&self) -> Result<()> {
        if self.meta.format != PACKAGE_FORMAT {
            return Err(Error::Validation(format!(
                "unrecognized package format {:?}",
                self.meta.format
            )));
        }
        if self.tasks.is_empty() {
            return Err(Error::Validation("package contains no tasks".to_string()));
        }

        let mut seen = HashSet::new();
        for task in &self.tasks {
            if task.id.as_str().trim().is_empty() {
                return Err(Error::Validation("package task without an id".to_string()));
            }
            if task.title.trim().is_empty() {
                return Err(Error::Validation(format!("{} has an empty title", task.id)));
            }
            if !seen.insert(&task.id) {
                return Err(Error::Validation(format!(
                    "{} appears more than once in the package",
                    task.id
                )));
            }
        }
        Ok(())
    }
}

/// Package `roots` and all their descendants, in store order. No roots
/// exports the whole store.
pub fn export_package(store: &TaskStore, roots: &[TaskId], project: &str) -> Result<ImportPackage> {
    let tasks: Vec<Task> = if roots.is_empty() {
        store.tasks().to_vec()
    } else {
        let graph = store.graph();
        let mut selected = HashSet::new();
        for root in roots {
            store.require(root)?;
            selected.insert(root.clone());
            selected.extend(graph.descendants(root).into_iter().map(|t| t.id.clone()));
        }
        store
            .tasks()
            .iter()
            .filter(|t| selected.contains(&t.id))
            .cloned()
            .collect()
    };

    if tasks.is_empty() {
        return Err(Error::Validation("nothing to export".to_string()));
    }
    let mut package = ImportPackage::new(project, tasks);
    package.meta.source.checksum = Some(store.checksum().to_string());
    Ok(package)
}
