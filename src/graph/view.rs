// src/graph/view.rs

//! Immutable, versioned view of the workflow graph.

use std::collections::{BTreeMap, HashSet};

use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

use crate::graph::node::{EdgeRecord, NodeRecord, TaskStatusReport};
use crate::graph::MutationError;
use crate::history::HistoryEvent;
use crate::promise::{PromiseRecord, RegistrationConstraints};
use crate::types::{EdgeKind, TaskId, TaskStatus, TerminationCause, WorkflowState};

/// The workflow graph at one version.
///
/// Views are only ever changed by [`GraphView::apply`], which is shared by the
/// live store and by history replay. Readers hold an `Arc<GraphView>` and are
/// never affected by later commits.
#[derive(Debug, Clone, Serialize)]
pub struct GraphView {
    workflow_id: String,
    version: u64,
    state: WorkflowState,
    termination: Option<TerminationCause>,
    nodes: BTreeMap<TaskId, NodeRecord>,
    edges: Vec<EdgeRecord>,
    registration: RegistrationConstraints,
    tallies: BTreeMap<TaskId, PromiseRecord>,
    #[serde(skip)]
    incoming: BTreeMap<TaskId, Vec<usize>>,
    #[serde(skip)]
    outgoing: BTreeMap<TaskId, Vec<usize>>,
}

impl GraphView {
    /// The graph before registration (version 0).
    pub fn empty(workflow_id: &str) -> Self {
        Self {
            workflow_id: workflow_id.to_string(),
            version: 0,
            state: WorkflowState::Registered,
            termination: None,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            registration: RegistrationConstraints::default(),
            tallies: BTreeMap::new(),
            incoming: BTreeMap::new(),
            outgoing: BTreeMap::new(),
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn termination(&self) -> Option<&TerminationCause> {
        self.termination.as_ref()
    }

    pub fn registration(&self) -> &RegistrationConstraints {
        &self.registration
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn tally(&self, id: &str) -> Option<&PromiseRecord> {
        self.tallies.get(id)
    }

    pub fn status(&self, id: &str) -> Option<TaskStatus> {
        self.nodes.get(id).map(|n| n.status)
    }

    pub fn status_report(&self, id: &str) -> Option<TaskStatusReport> {
        let node = self.nodes.get(id)?;
        Some(TaskStatusReport {
            status: node.status,
            output: node.output.clone(),
            failure: node.failure.clone(),
        })
    }

    /// Incoming edges of `id`.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &EdgeRecord> {
        self.incoming
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Outgoing edges of `id`.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &EdgeRecord> {
        self.outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|&i| &self.edges[i])
    }

    /// Whether a committed edge `from -> to` of any kind exists.
    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.outgoing(from).any(|e| e.to == to)
    }

    /// Nodes that are not yet terminal.
    pub fn open_nodes(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.values().filter(|n| !n.status.is_terminal())
    }

    pub fn all_terminal(&self) -> bool {
        self.nodes.values().all(|n| n.status.is_terminal())
    }

    /// Adjacency as a petgraph map, for reachability and cycle checks.
    pub fn digraph(&self) -> DiGraphMap<&str, EdgeKind> {
        let mut graph = DiGraphMap::new();
        for id in self.nodes.keys() {
            graph.add_node(id.as_str());
        }
        for e in &self.edges {
            graph.add_edge(e.from.as_str(), e.to.as_str(), e.kind);
        }
        graph
    }

    /// All nodes reachable from `id` (excluding `id`).
    pub fn descendants(&self, id: &str) -> HashSet<&str> {
        let mut seen = HashSet::new();
        let mut stack: Vec<&str> = self.outgoing(id).map(|e| e.to.as_str()).collect();
        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.outgoing(next).map(|e| e.to.as_str()));
            }
        }
        seen
    }

    /// Apply one history event, producing the next version.
    ///
    /// This is the only code path that changes a view.
    pub fn apply(&mut self, event: &HistoryEvent) -> Result<(), MutationError> {
        match event {
            HistoryEvent::Registered {
                workflow_id,
                nodes,
                edges,
                constraints,
            } => {
                let version = self.version + 1;
                self.workflow_id = workflow_id.clone();
                self.registration = constraints.clone();
                for node in nodes {
                    self.insert_node(node, version)?;
                }
                for edge in edges {
                    self.insert_edge(&edge.from, &edge.to, edge.kind, false, None, version)?;
                }
                self.version = version;
            }
            HistoryEvent::MutationCommitted {
                origin,
                nodes,
                edges,
            } => {
                let version = self.version + 1;
                if !self.nodes.contains_key(origin) {
                    return Err(MutationError::inconsistency(format!(
                        "mutation origin '{origin}' is not a committed task"
                    )));
                }
                for node in nodes {
                    self.insert_node(node, version)?;
                }
                for ce in edges {
                    let e = &ce.edge;
                    self.insert_edge(&e.from, &e.to, e.kind, ce.implicit, Some(origin.clone()), version)?;
                }
                let new_ids: Vec<TaskId> = nodes.iter().map(|n| n.spec.id.clone()).collect();
                if let Some(parent) = self.nodes.get_mut(origin) {
                    parent.children.extend(new_ids.iter().cloned());
                }
                let explicit = edges.iter().filter(|e| !e.implicit).count();
                self.tallies
                    .entry(origin.clone())
                    .or_default()
                    .record(new_ids, explicit);
                self.version = version;
            }
            HistoryEvent::MutationRejected { .. } => {}
            HistoryEvent::TaskStatusChanged {
                task,
                from,
                to,
                reason,
                output,
            } => {
                let version = self.version + 1;
                let node = self.nodes.get_mut(task).ok_or_else(|| {
                    MutationError::inconsistency(format!("status change for unknown task '{task}'"))
                })?;
                if node.status != *from || !from.can_transition_to(*to) {
                    return Err(MutationError::inconsistency(format!(
                        "task '{task}' cannot move {from} -> {to} (currently {})",
                        node.status
                    )));
                }
                node.status = *to;
                match to {
                    TaskStatus::Running => node.started_at = Some(version),
                    TaskStatus::Succeeded => {
                        node.finished_at = Some(version);
                        node.output = output.clone();
                    }
                    TaskStatus::Failed => {
                        node.finished_at = Some(version);
                        node.failure = reason.clone();
                    }
                    TaskStatus::Pending | TaskStatus::Ready => {}
                }
                self.version = version;
            }
            HistoryEvent::WorkflowStateChanged { from, to, cause } => {
                if self.state != *from {
                    return Err(MutationError::inconsistency(format!(
                        "workflow cannot move {from:?} -> {to:?} (currently {:?})",
                        self.state
                    )));
                }
                self.state = *to;
                if cause.is_some() {
                    self.termination = cause.clone();
                }
                self.version += 1;
            }
        }
        Ok(())
    }

    fn insert_node(
        &mut self,
        node: &crate::graph::CommittedNode,
        version: u64,
    ) -> Result<(), MutationError> {
        let id = &node.spec.id;
        if self.nodes.contains_key(id) {
            return Err(MutationError::inconsistency(format!("task '{id}' already exists")));
        }
        self.nodes
            .insert(id.clone(), NodeRecord::from_committed(node, version));
        Ok(())
    }

    fn insert_edge(
        &mut self,
        from: &str,
        to: &str,
        kind: EdgeKind,
        implicit: bool,
        origin: Option<TaskId>,
        version: u64,
    ) -> Result<(), MutationError> {
        for endpoint in [from, to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(MutationError::inconsistency(format!(
                    "edge {from} -> {to} references unknown task '{endpoint}'"
                )));
            }
        }
        let idx = self.edges.len();
        self.edges.push(EdgeRecord {
            from: from.to_string(),
            to: to.to_string(),
            kind,
            implicit,
            origin,
            committed_at: version,
        });
        self.outgoing.entry(from.to_string()).or_default().push(idx);
        self.incoming.entry(to.to_string()).or_default().push(idx);
        Ok(())
    }
}
