// src/graph/store.rs

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use petgraph::algo::{has_path_connecting, toposort};
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info, warn};

use crate::errors::{DynadagError, Result};
use crate::graph::node::{CommittedEdge, CommittedNode, Mutation};
use crate::graph::{GraphView, MutationError, WorkflowDefinition};
use crate::history::{HistoryEntry, HistoryEvent, HistoryRecorder};
use crate::promise::{validate_declared, PromiseEngine, Violation};
use crate::types::{
    FailureReason, MutationSummary, PropagationPolicy, TaskId, TaskStatus, TerminationCause,
    WorkflowState,
};

/// A mutation the promise engine accepted, ready to be committed.
///
/// Only [`PromiseEngine::validate`] creates approvals, so every commit has
/// passed the promise checks against the version recorded in `base_version`.
#[derive(Debug, Clone)]
pub struct ApprovedMutation {
    origin: TaskId,
    nodes: Vec<CommittedNode>,
    edges: Vec<CommittedEdge>,
    base_version: u64,
    summary: MutationSummary,
}

impl ApprovedMutation {
    pub(crate) fn new(
        origin: TaskId,
        nodes: Vec<CommittedNode>,
        edges: Vec<CommittedEdge>,
        base_version: u64,
        summary: MutationSummary,
    ) -> Self {
        Self {
            origin,
            nodes,
            edges,
            base_version,
            summary,
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn nodes(&self) -> &[CommittedNode] {
        &self.nodes
    }

    /// Implicit spawn edges followed by the explicitly requested ones.
    pub fn edges(&self) -> &[CommittedEdge] {
        &self.edges
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn summary(&self) -> &MutationSummary {
        &self.summary
    }
}

/// Owner of the live graph and its history.
///
/// Every change goes through [`GraphStore::record`], which applies the event
/// to a copy of the current view and only then publishes it and appends it to
/// the log. A failed apply leaves both untouched.
#[derive(Debug)]
pub struct GraphStore {
    view: Arc<GraphView>,
    history: HistoryRecorder,
    engine: PromiseEngine,
    frozen: bool,
}

impl GraphStore {
    pub fn new(workflow_id: &str, propagation: PropagationPolicy) -> Self {
        Self {
            view: Arc::new(GraphView::empty(workflow_id)),
            history: HistoryRecorder::new(),
            engine: PromiseEngine::new(propagation),
            frozen: false,
        }
    }

    /// Build a store and register `definition` as its root graph.
    pub fn from_definition(
        definition: &WorkflowDefinition,
        propagation: PropagationPolicy,
    ) -> Result<Self> {
        let mut store = Self::new(&definition.id, propagation);
        store.register_root(definition)?;
        Ok(store)
    }

    pub fn engine(&self) -> &PromiseEngine {
        &self.engine
    }

    /// Register the static graph. Only valid before anything else is recorded.
    pub fn register_root(&mut self, definition: &WorkflowDefinition) -> Result<u64> {
        if self.view.version() != 0 {
            return Err(DynadagError::AlreadyRegistered(self.view.version()));
        }

        let mut ids: HashSet<&str> = HashSet::new();
        for node in &definition.nodes {
            if node.id.trim().is_empty() {
                return Err(DynadagError::ConfigError("task id cannot be empty".into()));
            }
            if !ids.insert(node.id.as_str()) {
                return Err(DynadagError::ConfigError(format!(
                    "duplicate task id '{}'",
                    node.id
                )));
            }
            validate_declared(&node.id, &node.constraints)?;
        }
        validate_declared("<global>", &definition.constraints.global)?;
        for (slot, declared) in &definition.constraints.slots {
            validate_declared(slot, declared)?;
        }

        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for id in &ids {
            graph.add_node(*id);
        }
        for edge in &definition.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(DynadagError::TaskNotFound(format!(
                        "edge {} -> {} references unknown task '{endpoint}'",
                        edge.from, edge.to
                    )));
                }
            }
            if edge.from == edge.to {
                return Err(DynadagError::DagCycle(format!(
                    "task '{}' depends on itself",
                    edge.from
                )));
            }
            graph.add_edge(edge.from.as_str(), edge.to.as_str(), ());
        }
        if let Err(cycle) = toposort(&graph, None) {
            return Err(DynadagError::DagCycle(format!(
                "cycle involving task '{}'",
                cycle.node_id()
            )));
        }

        let nodes = definition
            .nodes
            .iter()
            .map(|spec| CommittedNode {
                spec: spec.clone(),
                parent: None,
                constraints: self
                    .engine
                    .resolve_constraints(&definition.constraints, None, spec),
            })
            .collect();

        let version = self.record(HistoryEvent::Registered {
            workflow_id: definition.id.clone(),
            nodes,
            edges: definition.edges.clone(),
            constraints: definition.constraints.clone(),
        })?;

        info!(
            workflow = %definition.id,
            tasks = definition.nodes.len(),
            edges = definition.edges.len(),
            version,
            "workflow registered"
        );
        Ok(version)
    }

    /// Ask the promise engine to approve `mutation` against the current view.
    pub fn propose_mutation(&self, mutation: &Mutation) -> Result<ApprovedMutation, MutationError> {
        if self.frozen {
            return Err(MutationError::Frozen);
        }
        self.engine.validate(&self.view, mutation)
    }

    /// Commit an approved mutation atomically, returning the new version.
    ///
    /// Structural checks that the promise engine does not own happen here:
    /// id uniqueness, edge endpoints, edges into existing nodes, and
    /// acyclicity.
    pub fn commit(&mut self, approved: ApprovedMutation) -> Result<u64, MutationError> {
        if self.frozen {
            return Err(MutationError::Frozen);
        }
        let view = Arc::clone(&self.view);
        if approved.base_version != view.version() {
            return Err(MutationError::inconsistency(format!(
                "approval for version {} is stale (current version {})",
                approved.base_version,
                view.version()
            )));
        }

        let origin = view.node(&approved.origin).ok_or_else(|| {
            MutationError::inconsistency(format!("unknown origin '{}'", approved.origin))
        })?;
        if origin.status != TaskStatus::Running {
            return Err(MutationError::NotRunning {
                task: approved.origin.clone(),
            });
        }

        let mut new_ids: BTreeSet<&str> = BTreeSet::new();
        for node in &approved.nodes {
            let id = node.spec.id.as_str();
            if view.contains(id) || !new_ids.insert(id) {
                return Err(MutationError::inconsistency(format!(
                    "task '{id}' already exists"
                )));
            }
        }

        let descendants = view.descendants(&approved.origin);
        let bounds: Vec<_> = origin.constraints.edge_bounds().collect();

        let mut graph = view.digraph();
        for id in &new_ids {
            graph.add_node(*id);
        }

        for ce in &approved.edges {
            let (from, to) = (ce.edge.from.as_str(), ce.edge.to.as_str());
            for endpoint in [from, to] {
                if !graph.contains_node(endpoint) {
                    return Err(MutationError::inconsistency(format!(
                        "edge {from} -> {to} references unknown task '{endpoint}'"
                    )));
                }
            }

            if !new_ids.contains(to) {
                let target = view.node(to).ok_or_else(|| {
                    MutationError::inconsistency(format!("unknown task '{to}'"))
                })?;
                if target.status != TaskStatus::Pending {
                    return Err(MutationError::inconsistency(format!(
                        "edge {from} -> {to} targets a task that is already {}",
                        target.status
                    )));
                }
                let bounded = !bounds.is_empty() && bounds.iter().all(|set| set.contains(to));
                if !descendants.contains(to) && !bounded {
                    return Err(MutationError::inconsistency(format!(
                        "edge {from} -> {to} targets a task outside the region of '{}'",
                        approved.origin
                    )));
                }
            }

            if from == to || has_path_connecting(&graph, to, from, None) {
                warn!(
                    origin = %approved.origin,
                    from,
                    to,
                    "mutation would close a cycle"
                );
                return Err(MutationError::Cycle {
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            graph.add_edge(from, to, ce.edge.kind);
        }
        drop(graph);
        drop(new_ids);

        let origin_id = approved.origin.clone();
        let nodes = approved.nodes.len();
        let version = self.record(HistoryEvent::MutationCommitted {
            origin: approved.origin,
            nodes: approved.nodes,
            edges: approved.edges,
        })?;
        info!(origin = %origin_id, nodes, version, "mutation committed");
        Ok(version)
    }

    /// Validate and commit in one go.
    pub fn apply_mutation(&mut self, mutation: &Mutation) -> Result<u64, MutationError> {
        let approved = self.propose_mutation(mutation)?;
        self.commit(approved)
    }

    /// Log a rejected mutation. The graph and its version are unchanged.
    pub fn record_rejection(&mut self, summary: MutationSummary, error: MutationError) {
        let version = self.view.version();
        self.history.append(
            version,
            HistoryEvent::MutationRejected {
                mutation: summary,
                error,
            },
        );
    }

    /// Check the obligations of `task` before it is allowed to succeed.
    pub fn finalize_obligations(&self, task: &str) -> Result<(), Violation> {
        self.engine.finalize(&self.view, task)
    }

    /// Move `task` to `to`, recording the transition.
    pub fn transition(
        &mut self,
        task: &str,
        to: TaskStatus,
        reason: Option<FailureReason>,
        output: Option<serde_json::Value>,
    ) -> Result<u64, MutationError> {
        let from = self
            .view
            .status(task)
            .ok_or_else(|| MutationError::inconsistency(format!("unknown task '{task}'")))?;
        debug!(task, %from, %to, "task transition");
        self.record(HistoryEvent::TaskStatusChanged {
            task: task.to_string(),
            from,
            to,
            reason,
            output,
        })
    }

    pub fn set_workflow_state(
        &mut self,
        to: WorkflowState,
        cause: Option<TerminationCause>,
    ) -> Result<u64, MutationError> {
        let from = self.view.state();
        if from == to {
            return Ok(self.view.version());
        }
        info!(from = ?from, to = ?to, "workflow state change");
        self.record(HistoryEvent::WorkflowStateChanged { from, to, cause })
    }

    /// Stop accepting mutations and mark the history as final.
    pub fn freeze(&mut self) {
        self.frozen = true;
        self.history.freeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn view(&self) -> &Arc<GraphView> {
        &self.view
    }

    /// Shared handle to the current view.
    pub fn latest(&self) -> Arc<GraphView> {
        Arc::clone(&self.view)
    }

    /// The view at `version`, or the latest view when `None`.
    pub fn read_snapshot(&self, version: Option<u64>) -> Result<Arc<GraphView>> {
        match version {
            None => Ok(self.latest()),
            Some(v) if v == self.view.version() => Ok(self.latest()),
            Some(v) => Ok(Arc::new(self.history.replay(v)?)),
        }
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub fn into_history(self) -> HistoryRecorder {
        self.history
    }

    fn record(&mut self, event: HistoryEvent) -> Result<u64, MutationError> {
        let mut next = GraphView::clone(&self.view);
        next.apply(&event)?;
        let version = next.version();
        self.view = Arc::new(next);
        let entry: &HistoryEntry = self.history.append(version, event);
        debug!(seq = entry.seq, version, "recorded");
        Ok(version)
    }
}
