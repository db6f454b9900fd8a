// src/promise/violation.rs

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TaskId;

/// A proposed mutation (or a completed task) broke a declared promise.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "violation", rename_all = "snake_case")]
pub enum Violation {
    #[error("task '{task}' declared NoNewNodes but proposed {count} node(s)")]
    NewNodes { task: TaskId, count: usize },

    #[error("task '{task}' declared NoNewEdges but proposed {count} edge(s)")]
    NewEdges { task: TaskId, count: usize },

    #[error("task '{task}' proposed edge {from} -> {to} outside its EdgesOnlyAmong set")]
    EdgeOutsideSet { task: TaskId, from: TaskId, to: TaskId },

    #[error("task '{task}' may not spawn '{node}' of type '{task_type}' (NodesOnlyOfType)")]
    NodeTypeNotAllowed { task: TaskId, node: TaskId, task_type: String },

    #[error("task '{task}' may not spawn '{node}' (NodesOnlyAmong)")]
    NodeNotAllowed { task: TaskId, node: TaskId },

    #[error("task '{node}' may not be spawned by '{task}' (SpawnableOnlyBy)")]
    SpawnerNotAllowed { task: TaskId, node: TaskId },

    #[error("task '{task}' proposed edge {from} -> {to} but declared NoEdgesFrom({from})")]
    EdgeFromForbidden { task: TaskId, from: TaskId, to: TaskId },

    #[error("task '{task}' proposed edge {from} -> {to} but declared NoEdgesTo({to})")]
    EdgeToForbidden { task: TaskId, from: TaskId, to: TaskId },

    #[error("task '{task}' would spawn {attempted} children, exceeding MaxFanout({max})")]
    FanoutExceeded { task: TaskId, max: usize, attempted: usize },

    #[error("task '{task}' spawned '{node}', which is not one of its ExactlyOneOf templates")]
    NotABranchTemplate { task: TaskId, node: TaskId },

    #[error("task '{task}' would commit {count} successors, ExactlyOneOf allows exactly one")]
    BranchMultiple { task: TaskId, count: usize },

    #[error("task '{task}' finished without committing any ExactlyOneOf successor")]
    BranchNone { task: TaskId },

    #[error("map task '{task}' spawned '{node}' of type '{found}', expected '{expected}'")]
    MapChildType { task: TaskId, node: TaskId, expected: String, found: String },

    #[error("map task '{task}' spawned more than {expected} children")]
    MapTooManyChildren { task: TaskId, expected: usize },

    #[error("map task '{task}' spawned '{node}' with inputs matching no remaining element")]
    MapInputUnmatched { task: TaskId, node: TaskId },

    #[error("map task '{task}' spawned reduce successor '{node}' more than once or with the wrong type")]
    MapReduceInvalid { task: TaskId, node: TaskId },

    #[error("map task '{task}' spawned its reduce successor after {spawned} of {expected} children")]
    MapReduceTooEarly { task: TaskId, spawned: usize, expected: usize },

    #[error("map task '{task}' reduce successor '{reduce}' lacks a data edge from child '{child}'")]
    MapReduceMissingDependency { task: TaskId, reduce: TaskId, child: TaskId },

    #[error("map task '{task}' finished with {children} of {expected} children (reduce spawned: {reduce_spawned})")]
    MapIncomplete { task: TaskId, children: usize, expected: usize, reduce_spawned: bool },

    #[error("task '{task}' spawned '{node}' with malformed constraints: {detail}")]
    MalformedConstraints { task: TaskId, node: TaskId, detail: String },
}

impl Violation {
    /// Name of the constraint that was broken.
    pub fn constraint(&self) -> &'static str {
        match self {
            Violation::NewNodes { .. } => "NoNewNodes",
            Violation::NewEdges { .. } => "NoNewEdges",
            Violation::EdgeOutsideSet { .. } => "EdgesOnlyAmong",
            Violation::NodeTypeNotAllowed { .. } => "NodesOnlyOfType",
            Violation::NodeNotAllowed { .. } => "NodesOnlyAmong",
            Violation::SpawnerNotAllowed { .. } => "SpawnableOnlyBy",
            Violation::EdgeFromForbidden { .. } => "NoEdgesFrom",
            Violation::EdgeToForbidden { .. } => "NoEdgesTo",
            Violation::FanoutExceeded { .. } => "MaxFanout",
            Violation::NotABranchTemplate { .. }
            | Violation::BranchMultiple { .. }
            | Violation::BranchNone { .. } => "ExactlyOneOf",
            Violation::MapChildType { .. }
            | Violation::MapTooManyChildren { .. }
            | Violation::MapInputUnmatched { .. }
            | Violation::MapReduceInvalid { .. }
            | Violation::MapReduceTooEarly { .. }
            | Violation::MapReduceMissingDependency { .. }
            | Violation::MapIncomplete { .. } => "AllOf",
            Violation::MalformedConstraints { .. } => "Declaration",
        }
    }
}
