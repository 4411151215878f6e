use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::task::TaskId;
use crate::error::{Error, Result};

/// Source ID to destination ID, with its exact inverse.
///
/// Covers every ID in an imported package, including IDs that pass through
/// unchanged. Inserting a mapping that would make the table non-invertible
/// fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemapTable {
    forward: BTreeMap<TaskId, TaskId>,
    #[serde(skip)]
    reverse: BTreeMap<TaskId, TaskId>,
}

impl RemapTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source: TaskId, destination: TaskId) -> Result<()> {
        if let Some(existing) = self.forward.get(&source) {
            return Err(Error::Validation(format!(
                "{} is already mapped to {}",
                source, existing
            )));
        }
        if let Some(owner) = self.reverse.get(&destination) {
            return Err(Error::Validation(format!(
                "{} is already the target of {}",
                destination, owner
            )));
        }
        self.forward.insert(source.clone(), destination.clone());
        self.reverse.insert(destination, source);
        Ok(())
    }

    pub fn get(&self, source: &TaskId) -> Option<&TaskId> {
        self.forward.get(source)
    }

    pub fn original_of(&self, destination: &TaskId) -> Option<&TaskId> {
        self.reverse.get(destination)
    }

    pub fn contains(&self, source: &TaskId) -> bool {
        self.forward.contains_key(source)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Mappings ordered by source ID.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskId, &TaskId)> {
        self.forward.iter()
    }

    /// Number of IDs that had to be reassigned.
    pub fn remapped_count(&self) -> usize {
        self.forward.iter().filter(|(s, d)| s != d).count()
    }

    pub fn is_bijective(&self) -> bool {
        self.forward.len() == self.reverse.len()
            && self
                .forward
                .iter()
                .all(|(s, d)| self.reverse.get(d) == Some(s))
    }
}
