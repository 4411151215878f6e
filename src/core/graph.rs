//! Read-only graph view over a task collection.
//!
//! The view overlays two structures on the same arena of tasks: the parent
//! forest and the dependency DAG. Both are stored as index-based adjacency
//! built once per load, so queries never walk the task list.

use crate::core::task::{Task, TaskId};
use crate::error::{Error, Result};
use crate::clog_trace;
use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Traversal marker for the depth-first ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Visited,
}

/// Structural view over a slice of tasks.
///
/// Arena indices follow the slice order, which is the tie-break for every
/// ordering this type produces. References to IDs missing from the slice are
/// kept out of the adjacency lists; they never resolve to a node.
pub struct DependencyGraph<'a> {
    tasks: Vec<&'a Task>,
    index: HashMap<&'a TaskId, usize>,
    parent: Vec<Option<usize>>,
    children: Vec<Vec<usize>>,
    depends: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// Edge `a -> b` means `a` depends on `b`.
    dag: DiGraph<usize, ()>,
}

impl<'a> DependencyGraph<'a> {
    /// Build the view in O(V + E).
    ///
    /// If an ID appears twice, the first occurrence wins; duplicate detection
    /// belongs to the store's integrity check.
    pub fn build(tasks: &'a [Task]) -> Self {
        let mut arena = Vec::with_capacity(tasks.len());
        let mut index = HashMap::with_capacity(tasks.len());
        for task in tasks {
            if index.contains_key(&task.id) {
                continue;
            }
            index.insert(&task.id, arena.len());
            arena.push(task);
        }

        let n = arena.len();
        let mut parent = vec![None; n];
        let mut children = vec![Vec::new(); n];
        let mut depends = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        let mut dag = DiGraph::with_capacity(n, n);
        for i in 0..n {
            dag.add_node(i);
        }

        for (i, task) in arena.iter().enumerate() {
            if let Some(p) = task.parent_id.as_ref().and_then(|p| index.get(p)) {
                parent[i] = Some(*p);
                children[*p].push(i);
            }
            let mut seen = HashSet::new();
            for dep in &task.depends {
                if let Some(&d) = index.get(dep) {
                    if seen.insert(d) {
                        depends[i].push(d);
                        dependents[d].push(i);
                        dag.add_edge(NodeIndex::new(i), NodeIndex::new(d), ());
                    }
                }
            }
        }

        Self {
            tasks: arena,
            index,
            parent,
            children,
            depends,
            dependents,
            dag,
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &TaskId) -> Option<&'a Task> {
        self.index.get(id).map(|&i| self.tasks[i])
    }

    /// Insertion position of a task, the tie-break for deterministic output.
    pub fn position(&self, id: &TaskId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &'a Task> + '_ {
        self.tasks.iter().copied()
    }

    fn require(&self, id: &TaskId) -> Result<usize> {
        self.position(id).ok_or_else(|| Error::task_not_found(id))
    }

    fn resolve(&self, indices: &[usize]) -> Vec<&'a Task> {
        indices.iter().map(|&i| self.tasks[i]).collect()
    }

    pub fn parent(&self, id: &TaskId) -> Option<&'a Task> {
        let i = self.position(id)?;
        self.parent[i].map(|p| self.tasks[p])
    }

    /// Direct children in insertion order.
    pub fn children(&self, id: &TaskId) -> Vec<&'a Task> {
        self.position(id)
            .map(|i| self.resolve(&self.children[i]))
            .unwrap_or_default()
    }

    /// Tasks that list `id` in their dependencies.
    pub fn dependents(&self, id: &TaskId) -> Vec<&'a Task> {
        self.position(id)
            .map(|i| self.resolve(&self.dependents[i]))
            .unwrap_or_default()
    }

    /// Dependencies of `id` that exist in this view.
    pub fn dependencies(&self, id: &TaskId) -> Vec<&'a Task> {
        self.position(id)
            .map(|i| self.resolve(&self.depends[i]))
            .unwrap_or_default()
    }

    pub fn dependent_count(&self, id: &TaskId) -> usize {
        self.position(id)
            .map(|i| self.dependents[i].len())
            .unwrap_or(0)
    }

    /// Ancestor chain, nearest parent first.
    ///
    /// Stops at a repeated node so a corrupted forest cannot loop forever.
    pub fn ancestors(&self, id: &TaskId) -> Vec<&'a Task> {
        let mut chain = Vec::new();
        let Some(mut current) = self.position(id) else {
            return chain;
        };
        let mut seen = HashSet::from([current]);
        while let Some(p) = self.parent[current] {
            if !seen.insert(p) {
                break;
            }
            chain.push(self.tasks[p]);
            current = p;
        }
        chain
    }

    /// Topmost ancestor of `id`, or the task itself when it has no parent.
    pub fn root(&self, id: &TaskId) -> Option<&'a Task> {
        self.ancestors(id).last().copied().or_else(|| self.get(id))
    }

    /// Transitive children of `id` in insertion order, excluding `id` itself.
    pub fn descendants(&self, id: &TaskId) -> Vec<&'a Task> {
        let Some(start) = self.position(id) else {
            return Vec::new();
        };
        let mut found = vec![false; self.tasks.len()];
        let mut queue = VecDeque::from([start]);
        while let Some(i) = queue.pop_front() {
            for &c in &self.children[i] {
                if c != start && !found[c] {
                    found[c] = true;
                    queue.push_back(c);
                }
            }
        }
        found
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(i, _)| self.tasks[i])
            .collect()
    }

    /// Whether `to` is reachable from `from` through dependency edges,
    /// i.e. `from` depends on `to` directly or transitively.
    pub fn reaches(&self, from: &TaskId, to: &TaskId) -> bool {
        match (self.position(from), self.position(to)) {
            (Some(a), Some(b)) if a != b => {
                has_path_connecting(&self.dag, NodeIndex::new(a), NodeIndex::new(b), None)
            }
            _ => false,
        }
    }

    /// True when neither task constrains the other through dependencies.
    pub fn independent(&self, a: &TaskId, b: &TaskId) -> bool {
        !self.reaches(a, b) && !self.reaches(b, a)
    }

    /// Order `subset` so that each task's parent and dependencies (when they
    /// are also in `subset`) come before it.
    ///
    /// Depth-first: a node visits its in-subset parent, then its in-subset
    /// dependencies, then appends itself. Roots are taken in insertion order
    /// and dependencies are visited in insertion order, so identical input
    /// yields identical output. Edges leaving the subset are treated as
    /// satisfied.
    ///
    /// # Errors
    /// - `NotFound` if `subset` names an unknown task.
    /// - `Cycle` when a node is re-entered while in progress; no partial
    ///   order is returned.
    pub fn topological_order(&self, subset: &[TaskId]) -> Result<Vec<TaskId>> {
        let mut in_subset = vec![false; self.tasks.len()];
        for id in subset {
            in_subset[self.require(id)?] = true;
        }

        let mut marks = vec![Mark::Unvisited; self.tasks.len()];
        let mut stack = Vec::new();
        let mut order = Vec::with_capacity(subset.len());
        for i in 0..self.tasks.len() {
            if in_subset[i] {
                self.visit(i, &in_subset, &mut marks, &mut stack, &mut order)?;
            }
        }
        Ok(order.into_iter().map(|i| self.tasks[i].id.clone()).collect())
    }

    /// Topological order over the whole view.
    pub fn topological_order_all(&self) -> Result<Vec<TaskId>> {
        let all: Vec<TaskId> = self.tasks.iter().map(|t| t.id.clone()).collect();
        self.topological_order(&all)
    }

    fn visit(
        &self,
        i: usize,
        in_subset: &[bool],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        match marks[i] {
            Mark::Visited => return Ok(()),
            Mark::InProgress => {
                let start = stack.iter().position(|&s| s == i).unwrap_or(0);
                let mut path: Vec<TaskId> =
                    stack[start..].iter().map(|&s| self.tasks[s].id.clone()).collect();
                path.push(self.tasks[i].id.clone());
                return Err(Error::Cycle { path });
            }
            Mark::Unvisited => {}
        }

        marks[i] = Mark::InProgress;
        stack.push(i);

        if let Some(p) = self.parent[i] {
            if in_subset[p] {
                self.visit(p, in_subset, marks, stack, order)?;
            }
        }
        let mut deps: Vec<usize> = self.depends[i]
            .iter()
            .copied()
            .filter(|&d| in_subset[d])
            .collect();
        deps.sort_unstable();
        for d in deps {
            self.visit(d, in_subset, marks, stack, order)?;
        }

        stack.pop();
        marks[i] = Mark::Visited;
        clog_trace!("topological_order: emit {}", self.tasks[i].id);
        order.push(i);
        Ok(())
    }

    /// First cycle found in either the parent forest or the dependency DAG.
    pub fn find_cycle(&self) -> Option<Vec<TaskId>> {
        match self.topological_order_all() {
            Err(Error::Cycle { path }) => Some(path),
            _ => None,
        }
    }
}

impl std::fmt::Debug for DependencyGraph<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyGraph")
            .field("tasks", &self.tasks.len())
            .field("dependencies", &self.dag.edge_count())
            .finish()
    }
}
