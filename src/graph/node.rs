// src/graph/node.rs

//! Node, edge and mutation types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::promise::{Constraint, ConstraintSet, DeclaredConstraint};
use crate::types::{EdgeKind, FailureReason, MutationSummary, TaskId, TaskStatus, TaskTag};

/// Declaration of a task, used both at registration time and for spawn
/// requests returned by runners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub id: TaskId,
    /// Runner dispatch key (e.g. `"MapChild"`).
    #[serde(rename = "type")]
    pub task_type: String,
    #[serde(default)]
    pub tag: TaskTag,
    #[serde(default)]
    pub constraints: Vec<DeclaredConstraint>,
    /// Input bindings handed to the runner.
    #[serde(default)]
    pub inputs: Value,
    /// A failure of this task counts as resolved for its dependents and
    /// does not fail the workflow.
    #[serde(default)]
    pub tolerate_failure: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl NodeSpec {
    pub fn new(id: impl Into<TaskId>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
            tag: TaskTag::default(),
            constraints: Vec::new(),
            inputs: Value::Null,
            tolerate_failure: false,
            metadata: BTreeMap::new(),
        }
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn declare(mut self, declared: DeclaredConstraint) -> Self {
        self.constraints.push(declared);
        self
    }

    pub fn tolerate_failure(mut self, tolerate: bool) -> Self {
        self.tolerate_failure = tolerate;
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A requested edge between two tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: TaskId,
    pub to: TaskId,
    #[serde(default)]
    pub kind: EdgeKind,
}

impl EdgeSpec {
    pub fn data(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Data,
        }
    }

    pub fn control(from: impl Into<TaskId>, to: impl Into<TaskId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Control,
        }
    }
}

/// A proposed runtime growth of the graph, attributed to `origin`.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub origin: TaskId,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl Mutation {
    pub fn new(origin: impl Into<TaskId>, nodes: Vec<NodeSpec>, edges: Vec<EdgeSpec>) -> Self {
        Self {
            origin: origin.into(),
            nodes,
            edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn summary(&self) -> MutationSummary {
        MutationSummary {
            origin: self.origin.clone(),
            nodes: self.nodes.iter().map(|n| n.id.clone()).collect(),
            edges: self
                .edges
                .iter()
                .map(|e| (e.from.clone(), e.to.clone()))
                .collect(),
        }
    }
}

/// A node as it is committed: its declaration plus the resolved parent and
/// effective constraint set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedNode {
    pub spec: NodeSpec,
    pub parent: Option<TaskId>,
    pub constraints: ConstraintSet,
}

/// An edge as it is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedEdge {
    #[serde(flatten)]
    pub edge: EdgeSpec,
    /// `true` for the control edge from a spawning task to its child.
    #[serde(default)]
    pub implicit: bool,
}

/// Authoritative state of a committed task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeRecord {
    pub id: TaskId,
    pub task_type: String,
    pub tag: TaskTag,
    pub declared: Vec<DeclaredConstraint>,
    pub constraints: ConstraintSet,
    pub inputs: Value,
    pub output: Option<Value>,
    pub status: TaskStatus,
    pub failure: Option<FailureReason>,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub tolerate_failure: bool,
    pub metadata: BTreeMap<String, String>,
    /// Graph version that committed this node.
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub finished_at: Option<u64>,
}

impl NodeRecord {
    pub(crate) fn from_committed(node: &CommittedNode, version: u64) -> Self {
        let spec = &node.spec;
        Self {
            id: spec.id.clone(),
            task_type: spec.task_type.clone(),
            tag: spec.tag,
            declared: spec.constraints.clone(),
            constraints: node.constraints.clone(),
            inputs: spec.inputs.clone(),
            output: None,
            status: TaskStatus::Pending,
            failure: None,
            parent: node.parent.clone(),
            children: Vec::new(),
            tolerate_failure: spec.tolerate_failure,
            metadata: spec.metadata.clone(),
            created_at: version,
            started_at: None,
            finished_at: None,
        }
    }

    /// Whether this node's outcome unblocks its dependents.
    pub fn resolves_dependents(&self) -> bool {
        match self.status {
            TaskStatus::Succeeded => true,
            TaskStatus::Failed => self.tolerate_failure,
            _ => false,
        }
    }

    /// Whether this node's failure should fail its dependents.
    pub fn blocks_dependents(&self) -> bool {
        self.status == TaskStatus::Failed && !self.tolerate_failure
    }
}

/// Authoritative state of a committed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRecord {
    pub from: TaskId,
    pub to: TaskId,
    pub kind: EdgeKind,
    pub implicit: bool,
    /// Task whose mutation created the edge (`None` for registration edges).
    pub origin: Option<TaskId>,
    pub committed_at: u64,
}

/// Status query result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusReport {
    pub status: TaskStatus,
    pub output: Option<Value>,
    pub failure: Option<FailureReason>,
}
