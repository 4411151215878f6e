//! Readiness and spawn lifecycle tests over a task document on disk.

use cairn::core::{TaskId, TaskStatus};
use cairn::orchestration::{
    CompletionReport, ProtocolKind, ProtocolVerdict, ReadinessAnalyzer, SpawnCoordinator,
    ValidatorRegistry,
};
use cairn::storage::TaskRepository;
use cairn::Error;

use crate::fixtures::{diamond_epic, TestStore};

fn ids(tasks: &[&cairn::core::Task]) -> Vec<String> {
    tasks.iter().map(|t| t.id.to_string()).collect()
}

/// Test: Diamond readiness
/// Given an epic whose shared dependency is done
/// When the ready set is computed
/// Then both branches are ready and safe to run together
#[test]
fn test_diamond_branches_ready_in_parallel() {
    let store = diamond_epic();
    let analyzer = ReadinessAnalyzer::new(&store);
    let epic = TaskId::from("T1");

    let ready = analyzer.ready_tasks(&epic).unwrap();
    assert_eq!(ids(&ready), vec!["T3", "T4"]);
    assert_eq!(ids(&analyzer.parallel_safe(&ready)), vec!["T3", "T4"]);
    assert_eq!(
        analyzer.next_task(&epic).unwrap().map(|t| t.id.to_string()),
        Some("T3".to_string())
    );
}

/// Test: Readiness is exact
/// Given a ready task
/// When one of its dependencies leaves `done`
/// Then it drops out of the ready set on recomputation
#[test]
fn test_reopening_dependency_removes_dependents() {
    let mut store = diamond_epic();
    store.set_status(&"T2".into(), TaskStatus::Pending).unwrap();

    let analyzer = ReadinessAnalyzer::new(&store);
    let ready = analyzer.ready_tasks(&"T1".into()).unwrap();
    assert_eq!(ids(&ready), vec!["T2"]);
}

/// Test: Cancelled dependency
/// Given a dependency that was cancelled
/// Then the dependent is never ready and says why
#[test]
fn test_cancelled_dependency_blocks_dependent() {
    let mut store = diamond_epic();
    store.set_status(&"T3".into(), TaskStatus::Done).unwrap();
    store.set_status(&"T4".into(), TaskStatus::Cancelled).unwrap();

    let analyzer = ReadinessAnalyzer::new(&store);
    assert!(analyzer.ready_tasks(&"T1".into()).unwrap().is_empty());

    let t5 = store.get(&"T5".into()).unwrap();
    assert_eq!(analyzer.blockers(t5), vec!["dependency T4 was cancelled"]);
}

/// Test: Epic analysis
/// Then unfinished tasks are grouped into dependency waves and the critical
/// path spans the longest unfinished chain
#[test]
fn test_analyze_epic_waves_and_critical_path() {
    let store = diamond_epic();
    let analysis = ReadinessAnalyzer::new(&store)
        .analyze_epic(&"T1".into())
        .unwrap();

    assert_eq!(analysis.total, 5);
    assert_eq!(analysis.finished, 1);
    let waves: Vec<Vec<String>> = analysis
        .waves
        .iter()
        .map(|w| w.tasks.iter().map(|id| id.to_string()).collect())
        .collect();
    assert_eq!(waves, vec![vec!["T3", "T4"], vec!["T5"], vec!["T6"]]);
    assert_eq!(analysis.critical_path.len(), 3);
    assert_eq!(analysis.critical_path.last(), Some(&TaskId::from("T6")));

    let context = ReadinessAnalyzer::new(&store)
        .epic_context(&"T1".into())
        .unwrap();
    assert_eq!(context.critical_path_length, 3);
    assert_eq!(context.counts.done, 1);
    assert_eq!(context.counts.pending, 4);
}

/// Test: Full lifecycle on disk
/// Given the diamond epic persisted to a file
/// When both branches are claimed and completed
/// Then the join task becomes ready and the document stays consistent
#[test]
fn test_spawn_lifecycle_persists() {
    let test_store = TestStore::with(&diamond_epic());
    let coordinator = SpawnCoordinator::default();

    for id in ["T3", "T4"] {
        let context = coordinator.claim(&test_store.file, &id.into()).unwrap();
        assert_eq!(context.epic_id, Some(TaskId::from("T1")));
        assert_eq!(test_store.status_of(id), TaskStatus::Active);

        let report = CompletionReport::complete(id, "implemented");
        let verdict = coordinator
            .record_outcome(&test_store.file, &id.into(), &report)
            .unwrap();
        assert!(verdict.valid);
        assert_eq!(test_store.status_of(id), TaskStatus::Done);
    }

    let store = test_store.load();
    let ready = ReadinessAnalyzer::new(&store)
        .ready_tasks(&"T1".into())
        .unwrap();
    assert_eq!(ids(&ready), vec!["T5"]);
    assert!(store.validate_integrity().is_empty());
}

/// Test: Not-ready claim
/// Given a task with an unfinished dependency
/// When it is claimed
/// Then the claim fails and the document is byte-identical
#[test]
fn test_claim_not_ready_leaves_file_untouched() {
    let test_store = TestStore::with(&diamond_epic());
    let before = test_store.raw();

    let result = SpawnCoordinator::default().claim(&test_store.file, &"T5".into());
    match result {
        Err(Error::NotReady { reasons, .. }) => {
            assert_eq!(
                reasons,
                vec!["dependency T3 is pending", "dependency T4 is pending"]
            );
        }
        other => panic!("expected NotReady, got {:?}", other),
    }
    assert_eq!(test_store.raw(), before);
    assert_eq!(test_store.status_of("T5"), TaskStatus::Pending);
}

/// Test: Racing claims
/// Given two callers that loaded the same snapshot
/// When the first one writes
/// Then the second one's write is refused instead of overwriting
#[test]
fn test_stale_snapshot_refused() {
    let test_store = TestStore::with(&diamond_epic());
    let coordinator = SpawnCoordinator::default();

    let mut first = test_store.load();
    let mut second = first.clone();
    let snapshot = first.checksum().to_string();

    coordinator.prepare_spawn(&mut first, &"T3".into()).unwrap();
    test_store.file.compare_and_save(&first, &snapshot).unwrap();

    coordinator.prepare_spawn(&mut second, &"T4".into()).unwrap();
    let result = test_store.file.compare_and_save(&second, &snapshot);
    assert!(matches!(result, Err(Error::StaleSnapshot { .. })));

    // A fresh claim reloads and succeeds.
    coordinator.claim(&test_store.file, &"T4".into()).unwrap();
    assert_eq!(test_store.status_of("T3"), TaskStatus::Active);
    assert_eq!(test_store.status_of("T4"), TaskStatus::Active);

    // Claiming an already active task fails after reload.
    assert!(matches!(
        coordinator.claim(&test_store.file, &"T3".into()),
        Err(Error::NotReady { .. })
    ));
}

/// Test: Failed validation
/// Given a testing validator that rejects the report
/// Then the task returns to blocked with the violation recorded on disk
#[test]
fn test_failed_validation_blocks_task() {
    let test_store = TestStore::with(&diamond_epic());
    let validators = ValidatorRegistry::new().with(
        ProtocolKind::Testing,
        |_: &TaskId, report: &CompletionReport| {
            if report.files_changed.is_empty() {
                ProtocolVerdict::fail(["no files changed"])
            } else {
                ProtocolVerdict::pass()
            }
        },
    );
    let coordinator = SpawnCoordinator::new(validators);
    coordinator.claim(&test_store.file, &"T3".into()).unwrap();

    let report = CompletionReport::complete("T3", "done").with_protocol(ProtocolKind::Testing);
    let verdict = coordinator
        .record_outcome(&test_store.file, &"T3".into(), &report)
        .unwrap();
    assert!(!verdict.valid);
    assert_eq!(verdict.violations.len(), 1);

    let store = test_store.load();
    let task = store.get(&"T3".into()).unwrap();
    assert_eq!(task.status, TaskStatus::Blocked);
    assert_eq!(
        task.notes.last().map(String::as_str),
        Some("[validation] [testing] no files changed")
    );
}

/// Test: Tampered document
/// Given a document edited outside cairn
/// Then loading surfaces an integrity error and leaves the file alone
#[test]
fn test_tampered_document_is_surfaced() {
    let test_store = TestStore::with(&diamond_epic());
    let tampered = test_store.raw().replace("Receipt", "Invoice");
    std::fs::write(test_store.path(), &tampered).unwrap();

    assert!(matches!(
        test_store.file.load(),
        Err(Error::Integrity { .. })
    ));
    assert!(matches!(
        SpawnCoordinator::default().claim(&test_store.file, &"T3".into()),
        Err(Error::Integrity { .. })
    ));
    assert_eq!(test_store.raw(), tampered);
}

#[tokio::test]
async fn test_async_load_matches_sync() {
    let test_store = TestStore::with(&diamond_epic());
    let loaded = test_store.file.load_async().await.unwrap();
    assert_eq!(loaded, test_store.load());
}
