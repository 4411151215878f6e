//! Properties over generated graphs and packages.

use std::collections::{HashMap, HashSet};

use cairn::core::{DependencyGraph, Task, TaskId, TaskStatus, TaskStore};
use cairn::import::{resolve_duplicate_title, ImportMerger, ImportOptions, ImportPackage};
use cairn::orchestration::ReadinessAnalyzer;
use cairn::Error;
use proptest::prelude::*;

/// Tasks `T1..=Tn` whose edges all follow `rank`, so the graph is acyclic
/// whatever the insertion order.
fn ranked_tasks(rank: &[usize], edges: &[(usize, usize)], parents: &[(usize, usize)]) -> Vec<Task> {
    let n = rank.len();
    let mut tasks: Vec<Task> = (0..n)
        .map(|i| Task::new(TaskId::from_number(i as u64 + 1), &format!("Task {}", i)))
        .collect();
    for &(a, b) in edges {
        let (a, b) = (a % n, b % n);
        if rank[a] > rank[b] {
            let dep = tasks[b].id.clone();
            tasks[a].add_dependency(dep);
        }
    }
    for &(child, parent) in parents {
        let (child, parent) = (child % n, parent % n);
        if rank[child] > rank[parent] && tasks[child].parent_id.is_none() {
            tasks[child].parent_id = Some(tasks[parent].id.clone());
        }
    }
    tasks
}

fn status_strategy() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

proptest! {
    #[test]
    fn prop_topological_order_respects_edges(
        rank in Just((0..12usize).collect::<Vec<_>>()).prop_shuffle(),
        edges in prop::collection::vec((0..12usize, 0..12usize), 0..40),
        parents in prop::collection::vec((0..12usize, 0..12usize), 0..12),
    ) {
        let tasks = ranked_tasks(&rank, &edges, &parents);
        let graph = DependencyGraph::build(&tasks);
        let order = graph.topological_order_all().unwrap();
        prop_assert_eq!(order.len(), tasks.len());

        let position: HashMap<&TaskId, usize> =
            order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        for task in &tasks {
            if let Some(parent) = &task.parent_id {
                prop_assert!(position[parent] < position[&task.id]);
            }
            for dep in &task.depends {
                prop_assert!(position[dep] < position[&task.id]);
            }
        }

        // Deterministic for identical input
        prop_assert_eq!(graph.topological_order_all().unwrap(), order);
    }

    #[test]
    fn prop_topological_order_fails_on_cycle(
        rank in Just((0..10usize).collect::<Vec<_>>()).prop_shuffle(),
        edges in prop::collection::vec((0..10usize, 0..10usize), 0..30),
        ring in 2..6usize,
    ) {
        let mut tasks = ranked_tasks(&rank, &edges, &[]);
        for i in 0..ring {
            let next = tasks[(i + 1) % ring].id.clone();
            tasks[i].add_dependency(next);
        }
        let graph = DependencyGraph::build(&tasks);
        let is_cycle = matches!(graph.topological_order_all(), Err(Error::Cycle { .. }));
        prop_assert!(is_cycle);
    }

    #[test]
    fn prop_readiness_is_exact(
        rank in Just((0..10usize).collect::<Vec<_>>()).prop_shuffle(),
        edges in prop::collection::vec((0..10usize, 0..10usize), 0..30),
        statuses in prop::collection::vec(status_strategy(), 10),
    ) {
        let mut tasks = vec![Task::epic("T100", "Epic")];
        for (task, status) in ranked_tasks(&rank, &edges, &[]).into_iter().zip(statuses) {
            tasks.push(task.with_parent("T100").with_status(status));
        }
        let store = TaskStore::from_tasks(tasks);
        let analyzer = ReadinessAnalyzer::new(&store);
        let ready: HashSet<TaskId> = analyzer
            .ready_tasks(&"T100".into())
            .unwrap()
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        for task in store.tasks().iter().filter(|t| !t.is_epic()) {
            let expected = task.can_start()
                && task
                    .depends
                    .iter()
                    .filter_map(|d| store.get(d))
                    .all(|d| d.status == TaskStatus::Done);
            prop_assert_eq!(ready.contains(&task.id), expected);
        }
    }

    #[test]
    fn prop_resolve_duplicate_title_is_unique_and_stable(
        title in "[A-Za-z ]{1,12}",
        taken in prop::collection::vec(0..6u32, 0..6),
    ) {
        let mut existing: HashSet<String> = HashSet::new();
        existing.insert(title.to_lowercase());
        for n in taken {
            existing.insert(format!("{} ({})", title, n).to_lowercase());
        }

        let resolved = resolve_duplicate_title(&title, &existing);
        prop_assert!(!existing.contains(&resolved.to_lowercase()));
        prop_assert_eq!(resolved, resolve_duplicate_title(&title, &existing));
    }

    #[test]
    fn prop_remap_is_exact_inverse(
        destination_ids in prop::collection::btree_set(1..40u64, 0..10),
        source_ids in prop::collection::btree_set(1..40u64, 1..10),
    ) {
        let store = TaskStore::from_tasks(
            destination_ids
                .iter()
                .map(|&n| Task::new(TaskId::from_number(n), &format!("Existing {}", n)))
                .collect(),
        );
        let package = ImportPackage::new(
            "generated",
            source_ids
                .iter()
                .map(|&n| Task::new(TaskId::from_number(n), &format!("Imported {}", n)))
                .collect(),
        );

        let options = ImportOptions::default();
        let result = ImportMerger::new(&options).preview(&store, &package, chrono::Utc::now()).unwrap();

        prop_assert_eq!(result.remap.len(), package.tasks.len());
        prop_assert!(result.remap.is_bijective());
        for task in &package.tasks {
            let destination = result.remap.get(&task.id).unwrap();
            prop_assert_eq!(result.remap.original_of(destination), Some(&task.id));
            prop_assert!(!store.contains_any(destination));
        }
    }
}
