//! Import-merge scenarios against a task document on disk.

use cairn::core::{NewTask, Task, TaskId, TaskStatus, TaskStore};
use cairn::import::{
    export_package, import_package, ConflictStrategy, ImportMerger, ImportOptions,
    ImportPackage, MissingDepStrategy,
};
use cairn::{Error, ErrorKind};

use crate::fixtures::{login_destination, login_package, TestStore};

/// Test: Rename scenario
/// Given a destination with "Fix login bug" and a package reusing T1/T2
/// When imported with on_conflict=rename
/// Then the package gets fresh IDs, the clash is renamed and edges follow
#[test]
fn test_rename_scenario_on_disk() {
    let test_store = TestStore::with(&login_destination());
    let package = test_store.write_package("auth.json", &login_package());
    let options = ImportOptions::default().on_conflict(ConflictStrategy::Rename);

    let result = import_package(&test_store.file, &package, &options).unwrap();
    assert_eq!(result.remap.get(&"T1".into()), Some(&TaskId::from("T50")));
    assert_eq!(result.remap.get(&"T2".into()), Some(&TaskId::from("T51")));

    let store = test_store.load();
    assert_eq!(store.get(&"T50".into()).unwrap().title, "Fix login bug (2)");
    assert_eq!(
        store.get(&"T51".into()).unwrap().depends,
        vec![TaskId::from("T50")]
    );
    assert_eq!(result.checksum.as_deref(), Some(store.checksum()));
    // The original keeps its title and status
    let original = store.get(&"T1".into()).unwrap();
    assert_eq!(original.title, "Fix login bug");
    assert_eq!(original.status, TaskStatus::Done);
}

/// Test: Missing dependency, strip
/// Given a task depending on an ID found nowhere
/// When imported with on_missing_dep=strip
/// Then the edge is dropped and the merge succeeds
#[test]
fn test_missing_dependency_strip_on_disk() {
    let test_store = TestStore::with(&TaskStore::new());
    let package = ImportPackage::new(
        "legacy",
        vec![Task::new("T1", "Migrate users").with_depends(["T900"])],
    );
    let path = test_store.write_package("legacy.json", &package);

    let result = import_package(&test_store.file, &path, &ImportOptions::default()).unwrap();
    assert_eq!(result.stripped.len(), 1);

    let store = test_store.load();
    assert!(store.get(&"T1".into()).unwrap().depends.is_empty());
}

/// Test: Missing dependency, fail
/// When imported with on_missing_dep=fail
/// Then a dependency error is raised and the file is byte-identical
#[test]
fn test_missing_dependency_fail_is_byte_identical() {
    let test_store = TestStore::with(&login_destination());
    let before = test_store.raw();
    let package = ImportPackage::new(
        "legacy",
        vec![
            Task::new("T1", "Migrate users"),
            Task::new("T2", "Drop old table").with_depends(["T1", "T900"]),
        ],
    );
    let path = test_store.write_package("legacy.json", &package);
    let options = ImportOptions::default().on_missing_dep(MissingDepStrategy::Fail);

    let err = import_package(&test_store.file, &path, &options).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Dependency);
    assert_eq!(test_store.raw(), before);
}

/// Test: Title conflict under the default strategy
/// Then the merge aborts before any transformation
#[test]
fn test_default_strategy_conflict_is_byte_identical() {
    let test_store = TestStore::with(&login_destination());
    let before = test_store.raw();
    let path = test_store.write_package("auth.json", &login_package());

    let err = import_package(&test_store.file, &path, &ImportOptions::default()).unwrap_err();
    assert!(matches!(err, Error::Conflict { .. }));
    assert_eq!(test_store.raw(), before);
}

/// Test: Dry run
/// Then the preview is complete and nothing is written
#[test]
fn test_dry_run_writes_nothing() {
    let test_store = TestStore::with(&login_destination());
    let before = test_store.raw();
    let path = test_store.write_package("auth.json", &login_package());
    let options = ImportOptions::default()
        .on_conflict(ConflictStrategy::Rename)
        .dry_run();

    let result = import_package(&test_store.file, &path, &options).unwrap();
    assert!(result.dry_run);
    assert_eq!(result.imported.len(), 2);
    assert_eq!(result.renamed[0].title, "Fix login bug (2)");
    assert_eq!(test_store.raw(), before);
}

/// Test: Malformed package
/// Then a validation error is raised before the store is touched
#[test]
fn test_malformed_package_is_validation_error() {
    let test_store = TestStore::with(&login_destination());
    let before = test_store.raw();
    let path = test_store.temp_dir.path().join("broken.json");
    std::fs::write(&path, "{\"_meta\": {\"format\": \"cairn-export\"").unwrap();

    let err = import_package(&test_store.file, &path, &ImportOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(test_store.raw(), before);

    let missing = test_store.temp_dir.path().join("absent.json");
    let err = import_package(&test_store.file, &missing, &ImportOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

/// Test: Round trip
/// Given an epic exported from one store
/// When it is imported into a store whose IDs overlap
/// Then inverting the remap reproduces the source structure
#[test]
fn test_export_import_round_trip() {
    let mut source = TaskStore::new();
    let epic = source.add_task(NewTask::epic("Search")).unwrap();
    let index = source
        .add_task(NewTask::new("Build index").parent(epic.clone()))
        .unwrap();
    let query = source
        .add_task(NewTask::new("Query API").parent(epic.clone()).depends([index.clone()]))
        .unwrap();
    source
        .add_task(NewTask::new("Ranking").parent(epic.clone()).depends([index, query]))
        .unwrap();
    let package = export_package(&source, &[epic], "search").unwrap();

    let mut destination = TaskStore::new();
    destination.add_task(NewTask::new("Unrelated")).unwrap();
    destination.add_task(NewTask::new("Also unrelated")).unwrap();

    let options = ImportOptions::default();
    let result = ImportMerger::new(&options)
        .merge(&mut destination, &package)
        .unwrap();
    assert_eq!(result.remap.len(), 4);
    assert!(result.stripped.is_empty());

    for original in source.tasks() {
        let id = result.remap.get(&original.id).unwrap();
        let imported = destination.get(id).unwrap();
        assert_eq!(result.remap.original_of(id), Some(&original.id));

        assert_eq!(imported.title, original.title);
        assert_eq!(imported.task_type, original.task_type);
        assert_eq!(imported.status, original.status);
        let parent = imported
            .parent_id
            .as_ref()
            .map(|p| result.remap.original_of(p).unwrap().clone());
        assert_eq!(parent, original.parent_id);
        let depends: Vec<TaskId> = imported
            .depends
            .iter()
            .map(|d| result.remap.original_of(d).unwrap().clone())
            .collect();
        assert_eq!(depends, original.depends);
        assert_eq!(imported.notes.len(), original.notes.len() + 1);
    }
    assert!(destination.validate_integrity().is_empty());
}

/// Test: Forced parent must exist
/// Then an unknown parent is reported before anything runs
#[test]
fn test_unknown_forced_parent_is_not_found() {
    let test_store = TestStore::with(&login_destination());
    let path = test_store.write_package("auth.json", &login_package());
    let options = ImportOptions::default()
        .on_conflict(ConflictStrategy::Rename)
        .parent("T404");

    let err = import_package(&test_store.file, &path, &options).unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

/// Test: Imported tasks are orchestrated like native ones
/// Given a package attached under an existing epic
/// Then its tasks show up in that epic's ready set
#[test]
fn test_imported_tasks_join_epic_scope() {
    let test_store = TestStore::with(&login_destination());
    let path = test_store.write_package("auth.json", &login_package());
    let options = ImportOptions {
        parent_id: Some("T49".into()),
        on_conflict: ConflictStrategy::Skip,
        ..ImportOptions::default()
    };
    import_package(&test_store.file, &path, &options).unwrap();

    let store = test_store.load();
    let analyzer = cairn::orchestration::ReadinessAnalyzer::new(&store);
    let ready: Vec<String> = analyzer
        .ready_tasks(&"T49".into())
        .unwrap()
        .iter()
        .map(|t| t.id.to_string())
        .collect();
    // The skipped duplicate resolved to the done T1, so T51 is ready.
    assert_eq!(ready, vec!["T51"]);
}
