// src/types.rs

//! Shared vocabulary used by the graph store, promise engine, scheduler and
//! snapshot exporter.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::promise::Violation;

/// Canonical task identifier type used throughout the engine.
pub type TaskId = String;

/// Declared type tag of a task.
///
/// The tag is informational: the promise engine only trusts declared
/// constraints, so a task tagged `Map` without an `all_of` promise is treated
/// like any other task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskTag {
    #[default]
    Static,
    Map,
    Branch,
    Dynamic,
}

/// Kind of a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// The target receives the source's output as an upstream input.
    #[default]
    Data,
    /// The target only waits for the source to finish.
    Control,
}

/// Per-task state machine: `Pending -> Ready -> Running -> {Succeeded, Failed}`.
///
/// `Pending` and `Ready` may also move straight to `Failed` when an upstream
/// task fails or the workflow is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `to`.
    pub fn can_transition_to(self, to: TaskStatus) -> bool {
        matches!(
            (self, to),
            (TaskStatus::Pending, TaskStatus::Ready)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Ready, TaskStatus::Running)
                | (TaskStatus::Ready, TaskStatus::Failed)
                | (TaskStatus::Running, TaskStatus::Succeeded)
                | (TaskStatus::Running, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Workflow-level state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    /// Graph registered, execution not started yet.
    Registered,
    Running,
    /// Every node is terminal and no untolerated failure occurred.
    Completed,
    /// A task failed without being tolerated.
    Failed,
    /// A graph-level violation (or an external shutdown) stopped the workflow.
    Terminated,
}

impl WorkflowState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Terminated
        )
    }
}

/// Why a task ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The runner reported a failure.
    TaskExecution { message: String },
    /// A mutation proposed by this task broke one of its promises.
    PromiseViolation { violation: Violation },
    /// A mutation proposed by this task would have created a cycle.
    CycleRejected { from: TaskId, to: TaskId },
    /// A mutation proposed by this task referenced an inconsistent graph state.
    GraphInconsistency { detail: String },
    /// A predecessor failed and was not tolerated.
    UpstreamFailed { upstream: TaskId },
    /// The workflow stopped before this task could finish.
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TaskExecution { message } => write!(f, "task execution error: {message}"),
            FailureReason::PromiseViolation { violation } => write!(f, "promise violation: {violation}"),
            FailureReason::CycleRejected { from, to } => {
                write!(f, "cycle rejected: edge {from} -> {to}")
            }
            FailureReason::GraphInconsistency { detail } => write!(f, "graph inconsistency: {detail}"),
            FailureReason::UpstreamFailed { upstream } => write!(f, "upstream task '{upstream}' failed"),
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Compact description of a proposed mutation, kept in termination records
/// and rejection log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSummary {
    pub origin: TaskId,
    pub nodes: Vec<TaskId>,
    pub edges: Vec<(TaskId, TaskId)>,
}

/// Recorded reason for a workflow reaching `Failed` or `Terminated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminationCause {
    PromiseViolation {
        task: TaskId,
        violation: Violation,
        mutation: MutationSummary,
    },
    CycleRejected {
        task: TaskId,
        from: TaskId,
        to: TaskId,
        mutation: MutationSummary,
        rejections: usize,
    },
    GraphInconsistency {
        task: Option<TaskId>,
        detail: String,
        mutation: Option<MutationSummary>,
    },
    TaskFailed {
        task: TaskId,
        reason: FailureReason,
    },
    Cancelled {
        reason: String,
    },
}

impl TerminationCause {
    /// The offending task, if the cause is attributable to one.
    pub fn task(&self) -> Option<&str> {
        match self {
            TerminationCause::PromiseViolation { task, .. }
            | TerminationCause::CycleRejected { task, .. }
            | TerminationCause::TaskFailed { task, .. } => Some(task),
            TerminationCause::GraphInconsistency { task, .. } => task.as_deref(),
            TerminationCause::Cancelled { .. } => None,
        }
    }
}

/// How constraints flow from a task to the children it spawns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropagationPolicy {
    /// Restrictive constraints propagate unless a constraint opts out.
    #[default]
    Inherit,
    /// Nothing propagates unless a constraint opts in.
    Isolate,
}

impl FromStr for PropagationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inherit" => Ok(PropagationPolicy::Inherit),
            "isolate" => Ok(PropagationPolicy::Isolate),
            other => Err(format!(
                "invalid constraint_propagation: {other} (expected \"inherit\" or \"isolate\")"
            )),
        }
    }
}

/// What happens to the workflow when a task fails and is not tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Fail the dependents, let independent work finish, end `Failed`.
    #[default]
    Contain,
    /// Stop admitting work, cancel in-flight tasks, end `Failed`.
    Abort,
}
