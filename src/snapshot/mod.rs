// src/snapshot/mod.rs

//! Snapshot exporter.
//!
//! A [`Snapshot`] is a self-contained, serializable document built from one
//! immutable [`GraphView`]: every committed node and edge, plus the
//! [`ProvisionalRegion`] projected from the constraints of non-terminal
//! tasks. Snapshots can be rendered as JSON or Graphviz DOT.

pub mod dot;
pub mod projection;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::errors::Result;
use crate::graph::GraphView;
use crate::promise::EffectiveConstraint;
use crate::sched::ReadOnlyStateManager;
use crate::types::{EdgeKind, FailureReason, TaskId, TaskStatus, TaskTag, TerminationCause, WorkflowState};

pub use projection::{
    project, EdgeRegion, ProvisionalEdge, ProvisionalNode, ProvisionalRegion, ProvisionalRole,
    Undetermined,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeSnapshot {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
    pub tag: TaskTag,
    pub status: TaskStatus,
    pub committed: bool,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub constraints: Vec<EffectiveConstraint>,
    pub inputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    /// Task whose edge bound keeps this one from becoming ready.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub held_by: Option<TaskId>,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeSnapshot {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
    pub implicit: bool,
    pub committed: bool,
    pub origin: Option<TaskId>,
    pub committed_at: u64,
}

/// Point-in-time export of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub workflow_id: String,
    pub version: u64,
    pub state: WorkflowState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<TerminationCause>,
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
    pub provisional: ProvisionalRegion,
}

impl Snapshot {
    pub fn from_view(view: &GraphView) -> Self {
        let ro = ReadOnlyStateManager::new(view);
        let nodes = view
            .nodes()
            .map(|n| NodeSnapshot {
                id: n.id.clone(),
                task_type: n.task_type.clone(),
                tag: n.tag,
                status: n.status,
                committed: true,
                parent: n.parent.clone(),
                children: n.children.clone(),
                constraints: n.constraints.entries().to_vec(),
                inputs: n.inputs.clone(),
                output: n.output.clone(),
                failure: n.failure.clone(),
                held_by: (n.status == TaskStatus::Pending)
                    .then(|| ro.held_by(&n.id))
                    .flatten(),
                created_at: n.created_at,
                started_at: n.started_at,
                finished_at: n.finished_at,
                metadata: n.metadata.clone(),
            })
            .collect();

        let edges = view
            .edges()
            .iter()
            .map(|e| EdgeSnapshot {
                from: e.from.clone(),
                to: e.to.clone(),
                kind: e.kind,
                implicit: e.implicit,
                committed: true,
                origin: e.origin.clone(),
                committed_at: e.committed_at,
            })
            .collect();

        Self {
            workflow_id: view.workflow_id().to_string(),
            version: view.version(),
            state: view.state(),
            termination: view.termination().cloned(),
            nodes,
            edges,
            provisional: project(view),
        }
    }

    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_dot(&self) -> String {
        dot::render(self)
    }

    /// Short human-readable overview.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "workflow '{}' at version {}: {:?}",
            self.workflow_id, self.version, self.state
        );
        if let Some(cause) = &self.termination {
            let _ = writeln!(out, "  termination: {cause:?}");
        }
        for node in &self.nodes {
            let _ = write!(out, "  {} [{}] {}", node.id, node.task_type, node.status);
            if let Some(owner) = &node.held_by {
                let _ = write!(out, " (held by {owner})");
            }
            let _ = writeln!(out);
        }
        for p in &self.provisional.nodes {
            let _ = writeln!(
                out,
                "  {} (TBD, from {}) {:?}",
                p.key, p.owner, p.role
            );
        }
        for u in &self.provisional.undetermined {
            let _ = writeln!(out, "  {}: undetermined successor(s)", u.owner);
        }
        out
    }
}
