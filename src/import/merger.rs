//! Merging an exported task package into an existing store.
//!
//! The merge runs as a fixed pipeline: validate, remap IDs, detect title
//! conflicts, order the package topologically, transform each task, commit.
//! Every step before the commit works on copies, so a failure anywhere
//! leaves the destination untouched.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::options::{ConflictStrategy, ImportOptions, MissingDepStrategy};
use super::package::ImportPackage;
use super::remap::RemapTable;
use crate::core::graph::DependencyGraph;
use crate::core::store::{next_free_number, TaskStore, MAX_SEQUENCE};
use crate::core::task::{Task, TaskId, TaskStatus};
use crate::error::{Error, Result};
use crate::storage::TaskRepository;
use crate::{clog, clog_debug};

const PLACEHOLDER_LABEL: &str = "placeholder";

/// Smallest " (n)" suffix, n >= 2, that makes `title` unique against the
/// lowercased titles in `existing`. Returns `title` unchanged if it is
/// already unique.
pub fn resolve_duplicate_title(title: &str, existing: &HashSet<String>) -> String {
    if !existing.contains(&title.to_lowercase()) {
        return title.to_string();
    }
    let mut n = 2u64;
    loop {
        let candidate = format!("{} ({})", title, n);
        if !existing.contains(&candidate.to_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportedTask {
    pub original_id: TaskId,
    pub id: TaskId,
    pub title: String,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub depends: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTask {
    pub original_id: TaskId,
    pub title: String,
    /// Task that already owns the title; references to the skipped task
    /// point here.
    pub existing_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenamedTask {
    pub id: TaskId,
    pub original_title: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrippedEdge {
    pub task: TaskId,
    pub dependency: TaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceholderTask {
    pub id: TaskId,
    pub missing_id: TaskId,
}

/// What a merge did, or would do on a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub dry_run: bool,
    pub source_project: String,
    pub remap: RemapTable,
    pub imported: Vec<ImportedTask>,
    pub skipped: Vec<SkippedTask>,
    pub renamed: Vec<RenamedTask>,
    pub stripped: Vec<StrippedEdge>,
    pub placeholders: Vec<PlaceholderTask>,
    /// Store checksum after the commit; absent on a dry run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl ImportResult {
    fn new(package: &ImportPackage, dry_run: bool, remap: RemapTable) -> Self {
        Self {
            dry_run,
            source_project: package.project().to_string(),
            remap,
            imported: Vec::new(),
            skipped: Vec::new(),
            renamed: Vec::new(),
            stripped: Vec::new(),
            placeholders: Vec::new(),
            checksum: None,
        }
    }
}

/// Issues destination IDs without touching the store's counter.
struct IdAllocator<'s> {
    store: &'s TaskStore,
    next: u64,
    reserved: HashSet<TaskId>,
}

impl<'s> IdAllocator<'s> {
    fn new(store: &'s TaskStore, reserved: HashSet<TaskId>) -> Self {
        Self {
            store,
            next: store.sequence(),
            reserved,
        }
    }

    fn mint(&mut self) -> Result<TaskId> {
        let n = next_free_number(self.next, |id| {
            self.store.contains_any(id) || self.reserved.contains(id)
        })?;
        self.next = n;
        let id = TaskId::from_number(n);
        self.reserved.insert(id.clone());
        Ok(id)
    }
}

/// Titles seen so far, existing and imported, by lowercase key.
struct TitleRegistry {
    keys: HashSet<String>,
    owners: HashMap<String, TaskId>,
}

impl TitleRegistry {
    fn from_store(store: &TaskStore) -> Self {
        let owners = store.title_index();
        Self {
            keys: owners.keys().cloned().collect(),
            owners,
        }
    }

    fn owner(&self, title: &str) -> Option<&TaskId> {
        self.owners.get(&title.to_lowercase())
    }

    fn record(&mut self, title: &str, id: &TaskId) {
        let key = title.to_lowercase();
        self.keys.insert(key.clone());
        self.owners.entry(key).or_insert_with(|| id.clone());
    }
}

pub struct ImportMerger<'o> {
    options: &'o ImportOptions,
}

impl<'o> ImportMerger<'o> {
    pub fn new(options: &'o ImportOptions) -> Self {
        Self { options }
    }

    pub fn merge(&self, store: &mut TaskStore, package: &ImportPackage) -> Result<ImportResult> {
        self.merge_at(store, package, Utc::now())
    }

    /// Merge `package` into `store`, stamping provenance with `now`.
    ///
    /// On a dry run the store is not touched. Otherwise the whole batch is
    /// appended in one step after every check has passed.
    pub fn merge_at(
        &self,
        store: &mut TaskStore,
        package: &ImportPackage,
        now: DateTime<Utc>,
    ) -> Result<ImportResult> {
        let (tasks, mut result) = self.plan(store, package, now)?;
        if self.options.dry_run {
            clog_debug!(
                "Import dry run from {}: {} tasks would be imported",
                result.source_project,
                tasks.len()
            );
            return Ok(result);
        }

        let count = tasks.len();
        store.append_tasks(tasks);
        result.checksum = Some(store.checksum().to_string());
        clog!(
            "Imported {} tasks from {} ({} remapped, {} skipped)",
            count,
            result.source_project,
            result.remap.remapped_count(),
            result.skipped.len()
        );
        Ok(result)
    }

    /// What [`merge_at`](Self::merge_at) would do, without mutation.
    pub fn preview(
        &self,
        store: &TaskStore,
        package: &ImportPackage,
        now: DateTime<Utc>,
    ) -> Result<ImportResult> {
        let (_, mut result) = self.plan(store, package, now)?;
        result.dry_run = true;
        Ok(result)
    }

    fn plan(
        &self,
        store: &TaskStore,
        package: &ImportPackage,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Task>, ImportResult)> {
        let options = self.options;
        package.validate()?;
        options.validate(store)?;

        let (remap, mut ids) = build_remap(store, package)?;

        if !options.force && options.on_conflict == ConflictStrategy::Fail {
            let titles = detect_conflicts(store, package);
            if !titles.is_empty() {
                return Err(Error::Conflict { titles });
            }
        }

        let order = DependencyGraph::build(&package.tasks).topological_order_all()?;
        let by_id: HashMap<&TaskId, &Task> = package.tasks.iter().map(|t| (&t.id, t)).collect();

        let mut result = ImportResult::new(package, options.dry_run, remap);
        let mut titles = TitleRegistry::from_store(store);
        let mut redirects: HashMap<TaskId, TaskId> = HashMap::new();
        let mut placeholder_for: HashMap<TaskId, TaskId> = HashMap::new();
        let mut out: Vec<Task> = Vec::with_capacity(package.tasks.len());
        let date = now.format("%Y-%m-%d");

        for source_id in &order {
            let source = by_id
                .get(source_id)
                .copied()
                .ok_or_else(|| Error::task_not_found(source_id))?;

            let mut title = source.title.clone();
            if !options.force {
                if let Some(owner) = titles.owner(&source.title) {
                    match options.on_conflict {
                        ConflictStrategy::Skip => {
                            clog_debug!("Skipping {} ({:?}), owned by {}", source.id, title, owner);
                            result.skipped.push(SkippedTask {
                                original_id: source.id.clone(),
                                title,
                                existing_id: owner.clone(),
                            });
                            redirects.insert(source.id.clone(), owner.clone());
                            continue;
                        }
                        ConflictStrategy::Rename => {
                            title = resolve_duplicate_title(&source.title, &titles.keys);
                        }
                        ConflictStrategy::Duplicate | ConflictStrategy::Fail => {}
                    }
                }
            }

            let id = result
                .remap
                .get(&source.id)
                .cloned()
                .ok_or_else(|| Error::task_not_found(&source.id))?;
            if title != source.title {
                result.renamed.push(RenamedTask {
                    id: id.clone(),
                    original_title: source.title.clone(),
                    title: title.clone(),
                });
            }

            let mut task = source.clone();
            task.id = id.clone();
            task.title = title;

            let parent_in_package = source
                .parent_id
                .as_ref()
                .is_some_and(|p| result.remap.contains(p));
            task.parent_id = match &source.parent_id {
                Some(p) if parent_in_package => resolve(p, &result.remap, &redirects),
                Some(p) if store.contains(p) => Some(p.clone()),
                Some(p) => {
                    clog_debug!("Dropping parent {} of {}: not in destination", p, source.id);
                    None
                }
                None => None,
            };
            if !parent_in_package {
                if let Some(forced) = &options.parent_id {
                    task.parent_id = Some(forced.clone());
                }
            }

            task.depends = Vec::new();
            for dep in &source.depends {
                let resolved = if result.remap.contains(dep) {
                    resolve(dep, &result.remap, &redirects)
                } else if store.contains(dep) {
                    Some(dep.clone())
                } else {
                    None
                };
                if let Some(target) = resolved {
                    task.add_dependency(target);
                    continue;
                }

                match options.on_missing_dep {
                    MissingDepStrategy::Strip => {
                        clog_debug!("Stripping missing dependency {} from {}", dep, source.id);
                        result.stripped.push(StrippedEdge {
                            task: id.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    MissingDepStrategy::Fail => {
                        return Err(Error::Dependency(format!(
                            "{} depends on {}, which is in neither the package nor the store",
                            source.id, dep
                        )));
                    }
                    MissingDepStrategy::Placeholder => {
                        let target = match placeholder_for.get(dep) {
                            Some(existing) => existing.clone(),
                            None => {
                                let title = resolve_duplicate_title(
                                    &format!("Placeholder for {}", dep),
                                    &titles.keys,
                                );
                                let placeholder = placeholder_task(
                                    ids.mint()?,
                                    &title,
                                    dep,
                                    task.parent_id.clone(),
                                    package.project(),
                                    now,
                                );
                                result.placeholders.push(PlaceholderTask {
                                    id: placeholder.id.clone(),
                                    missing_id: dep.clone(),
                                });
                                titles.record(&placeholder.title, &placeholder.id);
                                placeholder_for.insert(dep.clone(), placeholder.id.clone());
                                let placeholder_id = placeholder.id.clone();
                                out.push(placeholder);
                                placeholder_id
                            }
                        };
                        task.add_dependency(target);
                    }
                }
            }

            if let Some(phase) = &options.phase_override {
                task.phase = Some(phase.clone());
            }
            if let Some(label) = &options.add_label {
                task.add_label(label.trim());
            }
            if let Some(status) = options.reset_status {
                task.status = status;
            }
            task.append_note(format!(
                "[Imported from {} as {} on {}]",
                package.project(),
                source.id,
                date
            ));
            task.updated_at = Some(now);

            titles.record(&task.title, &id);
            result.imported.push(ImportedTask {
                original_id: source.id.clone(),
                id,
                title: task.title.clone(),
                status: task.status,
                parent_id: task.parent_id.clone(),
                depends: task.depends.clone(),
            });
            out.push(task);
        }

        Ok((out, result))
    }
}

/// Assign a destination ID to every package ID.
///
/// A source ID is kept unless it is non-canonical, above [`MAX_SEQUENCE`], or
/// already issued in the destination (live, archived, or at or below the
/// counter). Fresh IDs skip every ID the package keeps.
fn build_remap<'s>(
    store: &'s TaskStore,
    package: &ImportPackage,
) -> Result<(RemapTable, IdAllocator<'s>)> {
    let collides =
        |id: &TaskId| id.number().map_or(true, |n| n > MAX_SEQUENCE) || store.is_issued(id);
    let kept: HashSet<TaskId> = package
        .tasks
        .iter()
        .filter(|t| !collides(&t.id))
        .map(|t| t.id.clone())
        .collect();

    let mut ids = IdAllocator::new(store, kept);
    let mut remap = RemapTable::new();
    for task in &package.tasks {
        let destination = if collides(&task.id) {
            ids.mint()?
        } else {
            task.id.clone()
        };
        remap.insert(task.id.clone(), destination)?;
    }
    clog_debug!(
        "Remap built: {} ids, {} reassigned",
        remap.len(),
        remap.remapped_count()
    );
    Ok((remap, ids))
}

/// Titles that clash with the store or repeat within the package.
fn detect_conflicts(store: &TaskStore, package: &ImportPackage) -> Vec<String> {
    let existing = store.title_index();
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    let mut titles = Vec::new();
    for task in &package.tasks {
        let key = task.title_key();
        let clash = existing.contains_key(&key) || !seen.insert(key.clone());
        if clash && reported.insert(key) {
            titles.push(task.title.clone());
        }
    }
    titles
}

fn resolve(
    id: &TaskId,
    remap: &RemapTable,
    redirects: &HashMap<TaskId, TaskId>,
) -> Option<TaskId> {
    redirects.get(id).or_else(|| remap.get(id)).cloned()
}

fn placeholder_task(
    id: TaskId,
    title: &str,
    missing: &TaskId,
    parent: Option<TaskId>,
    project: &str,
    now: DateTime<Utc>,
) -> Task {
    let mut task = Task::new(id, title)
        .with_status(TaskStatus::Blocked)
        .with_created_at(now);
    task.parent_id = parent;
    task.add_label(PLACEHOLDER_LABEL);
    task.append_note(format!(
        "[Placeholder for missing dependency {} from {}]",
        missing, project
    ));
    task.updated_at = Some(now);
    task
}

/// Read a package from `path`, merge it into the repository's store, and
/// persist unless this is a dry run.
pub fn import_package<R: TaskRepository>(
    repo: &R,
    path: &Path,
    options: &ImportOptions,
) -> Result<ImportResult> {
    let package = ImportPackage::read(path)?;
    let mut store = repo.load()?;
    let expected = store.checksum().to_string();

    let result = ImportMerger::new(options).merge(&mut store, &package)?;
    if !options.dry_run {
        repo.compare_and_save(&store, &expected)?;
    }
    Ok(result)
}
