//! Generic dependency graph
//!
//! A [`Dag`] accumulates nodes keyed by id, then [`Dag::build`] freezes it:
//! - dependency names are resolved to edges; self references and unknown
//!   targets are dropped and repeated names collapse to a single edge
//! - genuine cycles are rejected or broken according to the [`CyclePolicy`]
//! - stages, entries and the scheduling order become queryable
//!
//! Per-node runtime state (executed flag, status, error) lives next to the
//! frozen edge lists so one built graph can be executed, inspected and
//! rendered from several tasks at once.

mod cycles;
mod status;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

pub use status::NodeStatus;

/// Errors raised while assembling or querying a DAG
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DagError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("empty DAG")]
    EmptyDag,

    #[error("DAG not built")]
    NotBuilt,

    #[error("DAG contains cycle: {0}")]
    CycleDetected(String),

    #[error("node not found: {0}")]
    NodeNotFound(String),
}

/// A node that can be placed into a [`Dag`].
pub trait DagNode: Send + Sync {
    /// Unique identity of the node.
    fn id(&self) -> &str;

    /// Declared dependency ids, verbatim. May contain duplicates, the node's
    /// own id or ids that never get added.
    fn dependencies(&self) -> &[String];

    /// Whether a failure of this node still releases its dependents.
    fn allow_failed(&self) -> bool {
        false
    }

    /// Display text used by the renderers.
    fn label(&self) -> String {
        self.id().to_string()
    }
}

/// What `build()` does with a genuine multi-node cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CyclePolicy {
    /// Fail with [`DagError::CycleDetected`]
    #[default]
    Reject,
    /// Keep the graph, drop the closing edges from the schedule only
    Break,
}

#[derive(Debug, Clone, Default)]
struct NodeRecord {
    status: NodeStatus,
    error: Option<String>,
}

/// Frozen adjacency plus runtime state, created by `build()`.
#[derive(Debug)]
struct BuiltGraph {
    /// Resolved dependencies per node: declared order, deduplicated
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// Scheduling edges: `dependencies` minus broken back edges
    schedule_dependencies: Vec<Vec<usize>>,
    schedule_dependents: Vec<Vec<usize>>,
    stages: Vec<usize>,
    cycles: Vec<Vec<usize>>,
    executed: Vec<AtomicBool>,
    records: RwLock<Vec<NodeRecord>>,
}

/// Dependency graph over nodes of type `T`
#[derive(Debug)]
pub struct Dag<T> {
    nodes: Vec<Arc<T>>,
    index: HashMap<String, usize>,
    cycle_policy: CyclePolicy,
    graph: Option<BuiltGraph>,
}

impl<T: DagNode> Dag<T> {
    /// Create an empty DAG that rejects cycles
    pub fn new() -> Self {
        Self::with_cycle_policy(CyclePolicy::Reject)
    }

    /// Create an empty DAG with the given cycle policy
    pub fn with_cycle_policy(cycle_policy: CyclePolicy) -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            cycle_policy,
            graph: None,
        }
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        self.cycle_policy
    }

    /// Add a node. Adding to a built DAG is accepted but requires another
    /// `build()` before the graph can be queried again.
    pub fn add_node(&mut self, node: T) -> Result<(), DagError> {
        let id = node.id().to_string();
        if self.index.contains_key(&id) {
            return Err(DagError::DuplicateNode(id));
        }
        if self.graph.take().is_some() {
            tracing::debug!(node_id = %id, "node added to built DAG; rebuild required");
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(Arc::new(node));
        Ok(())
    }

    /// Add several nodes, stopping at the first duplicate
    pub fn add_nodes<I>(&mut self, nodes: I) -> Result<(), DagError>
    where
        I: IntoIterator<Item = T>,
    {
        for node in nodes {
            self.add_node(node)?;
        }
        Ok(())
    }

    /// Resolve edges and freeze the graph
    pub fn build(&mut self) -> Result<(), DagError> {
        if self.nodes.is_empty() {
            return Err(DagError::EmptyDag);
        }

        let count = self.nodes.len();
        let mut dependencies = Vec::with_capacity(count);
        let mut dependents = vec![Vec::new(); count];
        for (idx, node) in self.nodes.iter().enumerate() {
            let resolved = self.resolve_dependencies(idx, node.as_ref());
            for &dep in &resolved {
                dependents[dep].push(idx);
            }
            dependencies.push(resolved);
        }

        let scan = cycles::scan_cycles(&dependents);
        if !scan.is_acyclic() && self.cycle_policy == CyclePolicy::Reject {
            let description = scan
                .cycles
                .first()
                .map(|cycle| self.describe_cycle(cycle))
                .unwrap_or_default();
            return Err(DagError::CycleDetected(description));
        }
        for cycle in &scan.cycles {
            tracing::warn!(cycle = %self.describe_cycle(cycle), "breaking dependency cycle");
        }

        let broken: HashSet<(usize, usize)> = scan.back_edges.iter().copied().collect();
        let schedule_dependencies: Vec<Vec<usize>> = dependencies
            .iter()
            .enumerate()
            .map(|(idx, deps)| {
                deps.iter()
                    .copied()
                    .filter(|&dep| !broken.contains(&(dep, idx)))
                    .collect()
            })
            .collect();
        let mut schedule_dependents = vec![Vec::new(); count];
        for (idx, deps) in schedule_dependencies.iter().enumerate() {
            for &dep in deps {
                schedule_dependents[dep].push(idx);
            }
        }

        let order = kahn_order(&schedule_dependencies, &schedule_dependents);
        let mut stages = vec![0usize; count];
        for &idx in &order {
            stages[idx] = schedule_dependencies[idx]
                .iter()
                .map(|&dep| stages[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        self.graph = Some(BuiltGraph {
            dependencies,
            dependents,
            schedule_dependencies,
            schedule_dependents,
            stages,
            cycles: scan.cycles,
            executed: (0..count).map(|_| AtomicBool::new(false)).collect(),
            records: RwLock::new(vec![NodeRecord::default(); count]),
        });
        tracing::debug!(nodes = count, "DAG built");
        Ok(())
    }

    fn resolve_dependencies(&self, idx: usize, node: &T) -> Vec<usize> {
        let mut resolved = Vec::new();
        for dep in node.dependencies() {
            match self.index.get(dep.as_str()) {
                Some(&dep_idx) if dep_idx == idx => {
                    tracing::debug!(node_id = %node.id(), "ignoring self dependency");
                }
                Some(&dep_idx) => {
                    if !resolved.contains(&dep_idx) {
                        resolved.push(dep_idx);
                    }
                }
                None => {
                    tracing::debug!(
                        node_id = %node.id(),
                        dependency = %dep,
                        "ignoring dependency on unknown node"
                    );
                }
            }
        }
        resolved
    }

    fn describe_cycle(&self, cycle: &[usize]) -> String {
        let mut ids: Vec<&str> = cycle.iter().map(|&idx| self.nodes[idx].id()).collect();
        if let Some(&first) = ids.first() {
            ids.push(first);
        }
        ids.join(" -> ")
    }

    pub fn is_built(&self) -> bool {
        self.graph.is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get a node by id
    pub fn node(&self, id: &str) -> Option<&Arc<T>> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    /// All nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<T>> + '_ {
        self.nodes.iter()
    }

    /// Resolved dependencies of `id`, declared order
    pub fn dependencies(&self, id: &str) -> Result<Vec<&Arc<T>>, DagError> {
        let (graph, idx) = self.lookup(id)?;
        Ok(self.collect(&graph.dependencies[idx]))
    }

    /// Nodes that depend on `id`, insertion order
    pub fn dependents(&self, id: &str) -> Result<Vec<&Arc<T>>, DagError> {
        let (graph, idx) = self.lookup(id)?;
        Ok(self.collect(&graph.dependents[idx]))
    }

    /// Resolved `(dependency, dependent)` id pairs, cycle edges included
    pub fn edges(&self) -> Result<Vec<(&str, &str)>, DagError> {
        let graph = self.graph()?;
        let mut edges = Vec::new();
        for (idx, deps) in graph.dependencies.iter().enumerate() {
            for &dep in deps {
                edges.push((self.nodes[dep].id(), self.nodes[idx].id()));
            }
        }
        Ok(edges)
    }

    /// Terminal nodes: nothing is scheduled after them
    pub fn entries(&self) -> Result<Vec<&Arc<T>>, DagError> {
        let graph = self.graph()?;
        Ok(self
            .nodes
            .iter()
            .enumerate()
            .filter(|(idx, _)| graph.schedule_dependents[*idx].is_empty())
            .map(|(_, node)| node)
            .collect())
    }

    /// Depth of `id` in the schedule, 0 for nodes without dependencies
    pub fn stage(&self, id: &str) -> Result<usize, DagError> {
        let (graph, idx) = self.lookup(id)?;
        Ok(graph.stages[idx])
    }

    /// Nodes grouped by stage
    pub fn stages(&self) -> Result<Vec<Vec<&Arc<T>>>, DagError> {
        let graph = self.graph()?;
        let depth = graph.stages.iter().copied().max().unwrap_or(0) + 1;
        let mut grouped: Vec<Vec<&Arc<T>>> = vec![Vec::new(); depth];
        for (idx, node) in self.nodes.iter().enumerate() {
            grouped[graph.stages[idx]].push(node);
        }
        Ok(grouped)
    }

    /// Dependency-respecting order, ties broken by insertion order
    pub fn topological_order(&self) -> Result<Vec<&Arc<T>>, DagError> {
        let graph = self.graph()?;
        let order = kahn_order(&graph.schedule_dependencies, &graph.schedule_dependents);
        Ok(self.collect(&order))
    }

    /// Cycles found at build time, each listed from its earliest node
    pub fn find_cycles(&self) -> Result<Vec<Vec<String>>, DagError> {
        let graph = self.graph()?;
        Ok(graph
            .cycles
            .iter()
            .map(|cycle| {
                cycle
                    .iter()
                    .map(|&idx| self.nodes[idx].id().to_string())
                    .collect()
            })
            .collect())
    }

    /// Claim `id` for execution. Returns `true` only for the first caller
    /// since the last build or reset.
    pub fn try_execute(&self, id: &str) -> bool {
        match self.lookup(id) {
            Ok((graph, idx)) => claim(graph, idx),
            Err(_) => false,
        }
    }

    pub fn is_executed(&self, id: &str) -> bool {
        self.lookup(id)
            .map(|(graph, idx)| graph.executed[idx].load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Clear executed flags, statuses and recorded errors
    pub fn reset(&self) {
        if let Some(graph) = &self.graph {
            for flag in &graph.executed {
                flag.store(false, Ordering::Release);
            }
            let mut records = graph.records.write().unwrap_or_else(PoisonError::into_inner);
            for record in records.iter_mut() {
                *record = NodeRecord::default();
            }
        }
    }

    /// Current status of `id`; `None` before build or for unknown ids
    pub fn status(&self, id: &str) -> Option<NodeStatus> {
        let (graph, idx) = self.lookup(id).ok()?;
        let records = graph.records.read().unwrap_or_else(PoisonError::into_inner);
        Some(records[idx].status)
    }

    /// Error text recorded for a failed node
    pub fn error(&self, id: &str) -> Option<String> {
        let (graph, idx) = self.lookup(id).ok()?;
        let records = graph.records.read().unwrap_or_else(PoisonError::into_inner);
        records[idx].error.clone()
    }

    /// Override the status of `id`
    pub fn set_status(&self, id: &str, status: NodeStatus) -> Result<(), DagError> {
        let (_, idx) = self.lookup(id)?;
        self.record_at(idx, status, None);
        Ok(())
    }

    fn graph(&self) -> Result<&BuiltGraph, DagError> {
        self.graph.as_ref().ok_or(DagError::NotBuilt)
    }

    fn lookup(&self, id: &str) -> Result<(&BuiltGraph, usize), DagError> {
        let graph = self.graph()?;
        let idx = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| DagError::NodeNotFound(id.to_string()))?;
        Ok((graph, idx))
    }

    fn collect(&self, indices: &[usize]) -> Vec<&Arc<T>> {
        indices.iter().map(|&idx| &self.nodes[idx]).collect()
    }

    // Index-based access for the executor and renderers.

    pub(crate) fn node_at(&self, idx: usize) -> &Arc<T> {
        &self.nodes[idx]
    }

    pub(crate) fn schedule_dependencies_at(&self, idx: usize) -> &[usize] {
        self.graph
            .as_ref()
            .map(|graph| graph.schedule_dependencies[idx].as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn schedule_dependents_at(&self, idx: usize) -> &[usize] {
        self.graph
            .as_ref()
            .map(|graph| graph.schedule_dependents[idx].as_slice())
            .unwrap_or(&[])
    }

    pub(crate) fn stage_at(&self, idx: usize) -> usize {
        self.graph
            .as_ref()
            .map(|graph| graph.stages[idx])
            .unwrap_or(0)
    }

    pub(crate) fn try_execute_at(&self, idx: usize) -> bool {
        self.graph
            .as_ref()
            .map(|graph| claim(graph, idx))
            .unwrap_or(false)
    }

    pub(crate) fn status_at(&self, idx: usize) -> NodeStatus {
        self.graph
            .as_ref()
            .map(|graph| {
                graph.records.read().unwrap_or_else(PoisonError::into_inner)[idx].status
            })
            .unwrap_or_default()
    }

    pub(crate) fn record_at(&self, idx: usize, status: NodeStatus, error: Option<String>) {
        if let Some(graph) = &self.graph {
            let mut records = graph.records.write().unwrap_or_else(PoisonError::into_inner);
            records[idx] = NodeRecord { status, error };
        }
    }
}

impl<T: DagNode> Default for Dag<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn claim(graph: &BuiltGraph, idx: usize) -> bool {
    graph.executed[idx]
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Kahn's algorithm with the lowest ready index taken first.
fn kahn_order(dependencies: &[Vec<usize>], dependents: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = dependencies.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(idx, _)| idx)
        .collect();
    let mut order = Vec::with_capacity(dependencies.len());
    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        for &next in &dependents[idx] {
            remaining[next] -= 1;
            if remaining[next] == 0 {
                ready.insert(next);
            }
        }
    }
    order
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    pub(crate) struct TestNode {
        pub id: String,
        pub deps: Vec<String>,
        pub tolerant: bool,
    }

    impl TestNode {
        pub fn new(id: &str, deps: &[&str]) -> Self {
            Self {
                id: id.to_string(),
                deps: deps.iter().map(|d| d.to_string()).collect(),
                tolerant: false,
            }
        }

        pub fn tolerant(mut self) -> Self {
            self.tolerant = true;
            self
        }
    }

    impl DagNode for TestNode {
        fn id(&self) -> &str {
            &self.id
        }

        fn dependencies(&self) -> &[String] {
            &self.deps
        }

        fn allow_failed(&self) -> bool {
            self.tolerant
        }
    }

    pub(crate) fn built(nodes: Vec<TestNode>) -> Dag<TestNode> {
        let mut dag = Dag::new();
        dag.add_nodes(nodes).expect("add nodes");
        dag.build().expect("build");
        dag
    }

    fn ids(nodes: &[&Arc<TestNode>]) -> Vec<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut dag = Dag::new();
        dag.add_node(TestNode::new("a", &[])).expect("first");
        let err = dag.add_node(TestNode::new("a", &[])).expect_err("duplicate");
        assert_eq!(err, DagError::DuplicateNode("a".to_string()));
    }

    #[test]
    fn test_build_empty_dag_fails() {
        let mut dag: Dag<TestNode> = Dag::new();
        assert_eq!(dag.build(), Err(DagError::EmptyDag));
    }

    #[test]
    fn test_queries_before_build_fail() {
        let mut dag = Dag::new();
        dag.add_node(TestNode::new("a", &[])).expect("add");
        assert_eq!(dag.entries().err(), Some(DagError::NotBuilt));
        assert_eq!(dag.stages().err(), Some(DagError::NotBuilt));
        assert!(dag.node("a").is_some());
        assert!(!dag.try_execute("a"));
    }

    #[test]
    fn test_missing_and_self_dependencies_are_dropped() {
        let dag = built(vec![
            TestNode::new("a", &["a", "ghost"]),
            TestNode::new("b", &["a", "a", "a"]),
        ]);
        assert!(dag.dependencies("a").expect("deps").is_empty());
        assert_eq!(ids(&dag.dependencies("b").expect("deps")), vec!["a"]);
        assert_eq!(dag.node("b").expect("node").deps.len(), 3);
        assert_eq!(dag.edges().expect("edges"), vec![("a", "b")]);
    }

    #[test]
    fn test_add_after_build_requires_rebuild() {
        let mut dag = built(vec![TestNode::new("a", &[])]);
        dag.add_node(TestNode::new("b", &["a"])).expect("add");
        assert!(!dag.is_built());
        assert_eq!(dag.stage("b"), Err(DagError::NotBuilt));
        dag.build().expect("rebuild");
        assert_eq!(dag.stage("b"), Ok(1));
    }

    #[test]
    fn test_forward_reference_resolves_at_build() {
        let dag = built(vec![
            TestNode::new("late", &["early"]),
            TestNode::new("early", &[]),
        ]);
        let order = dag.topological_order().expect("order");
        assert_eq!(ids(&order), vec!["early", "late"]);
    }

    #[test]
    fn test_cycle_rejected_by_default() {
        let mut dag = Dag::new();
        dag.add_nodes(vec![
            TestNode::new("a", &["c"]),
            TestNode::new("b", &["a"]),
            TestNode::new("c", &["b"]),
        ])
        .expect("add");
        match dag.build() {
            Err(DagError::CycleDetected(desc)) => assert_eq!(desc, "a -> b -> c -> a"),
            other => panic!("expected cycle error, got {other:?}"),
        }
        assert!(!dag.is_built());
    }

    #[test]
    fn test_cycle_broken_when_tolerated() {
        let mut dag = Dag::with_cycle_policy(CyclePolicy::Break);
        dag.add_nodes(vec![
            TestNode::new("a", &["c"]),
            TestNode::new("b", &["a"]),
            TestNode::new("c", &["b"]),
        ])
        .expect("add");
        dag.build().expect("build");

        let cycles = dag.find_cycles().expect("cycles");
        assert_eq!(cycles, vec![vec!["a", "b", "c"]]);
        assert_eq!(ids(&dag.topological_order().expect("order")), vec!["a", "b", "c"]);
        assert_eq!(dag.edges().expect("edges").len(), 3);
        assert_eq!(ids(&dag.entries().expect("entries")), vec!["c"]);
    }

    #[test]
    fn test_stages_and_entries_for_chain() {
        let dag = built(vec![
            TestNode::new("fetch", &[]),
            TestNode::new("parse", &["fetch"]),
            TestNode::new("store", &["parse"]),
        ]);
        assert_eq!(dag.stage("fetch"), Ok(0));
        assert_eq!(dag.stage("parse"), Ok(1));
        assert_eq!(dag.stage("store"), Ok(2));
        assert_eq!(ids(&dag.entries().expect("entries")), vec!["store"]);

        let stages = dag.stages().expect("stages");
        assert_eq!(stages.len(), 3);
        assert_eq!(ids(&stages[1]), vec!["parse"]);
    }

    #[test]
    fn test_mesh_has_single_entry() {
        let mut nodes = Vec::new();
        for row in 0..4 {
            for col in 0..4 {
                let mut deps = Vec::new();
                if row > 0 {
                    deps.push(format!("A{}{}", row - 1, col));
                }
                if col > 0 {
                    deps.push(format!("A{}{}", row, col - 1));
                }
                nodes.push(TestNode {
                    id: format!("A{row}{col}"),
                    deps,
                    tolerant: false,
                });
            }
        }
        let dag = built(nodes);
        assert_eq!(ids(&dag.entries().expect("entries")), vec!["A33"]);
        assert_eq!(dag.stage("A33"), Ok(6));
        assert_eq!(ids(&dag.dependents("A00").expect("dependents")), vec!["A01", "A10"]);
    }

    #[test]
    fn test_try_execute_is_idempotent_until_reset() {
        let dag = built(vec![TestNode::new("a", &[])]);
        assert!(dag.try_execute("a"));
        assert!(!dag.try_execute("a"));
        assert!(dag.is_executed("a"));
        assert!(!dag.try_execute("missing"));

        dag.set_status("a", NodeStatus::Completed).expect("status");
        dag.reset();
        assert!(!dag.is_executed("a"));
        assert_eq!(dag.status("a"), Some(NodeStatus::Pending));
        assert!(dag.try_execute("a"));
    }

    #[test]
    fn test_try_execute_concurrent_single_winner() {
        let dag = Arc::new(built(vec![TestNode::new("shared", &[])]));
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dag = dag.clone();
                std::thread::spawn(move || dag.try_execute("shared"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().expect("join"))
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_unknown_node_query() {
        let dag = built(vec![TestNode::new("a", &[])]);
        assert_eq!(
            dag.stage("zzz"),
            Err(DagError::NodeNotFound("zzz".to_string()))
        );
        assert_eq!(dag.status("zzz"), None);
    }
}
