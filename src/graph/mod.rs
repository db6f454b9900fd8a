// src/graph/mod.rs

//! Authoritative workflow graph.
//!
//! The [`GraphStore`] owns the live [`GraphView`] and the history log. It is
//! the only place that commits nodes and edges; readers get immutable,
//! version-tagged views.

pub mod node;
pub mod store;
pub mod view;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::promise::{RegistrationConstraints, Violation};
use crate::types::TaskId;

pub use node::{
    CommittedEdge, CommittedNode, EdgeRecord, EdgeSpec, Mutation, NodeRecord, NodeSpec,
    TaskStatusReport,
};
pub use store::{ApprovedMutation, GraphStore};
pub use view::GraphView;

/// Why a proposed mutation was not committed.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum MutationError {
    #[error("promise violation: {0}")]
    Promise(#[from] Violation),

    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: TaskId, to: TaskId },

    #[error("graph inconsistency: {detail}")]
    Inconsistency { detail: String },

    #[error("task '{task}' is not running")]
    NotRunning { task: TaskId },

    #[error("workflow is frozen")]
    Frozen,
}

impl MutationError {
    pub fn inconsistency(detail: impl Into<String>) -> Self {
        MutationError::Inconsistency {
            detail: detail.into(),
        }
    }
}

/// A workflow as registered before execution: its static nodes and edges
/// plus the constraints declared at registration time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowDefinition {
    pub id: String,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
    pub constraints: RegistrationConstraints,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }

    pub fn constraints(mut self, constraints: RegistrationConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}
