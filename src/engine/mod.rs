// src/engine/mod.rs

//! Orchestration engine for dynadag.
//!
//! This module ties together:
//! - the scheduler (which owns the graph store)
//! - the main runtime event loop that reacts to:
//!   - task completion events
//!   - mutations proposed by running tasks
//!   - shutdown requests
//! - the [`Orchestrator`] facade that wires a workflow, a runner and the
//!   executor together
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use tokio::sync::oneshot;

use crate::exec::TaskResult;
use crate::graph::{Mutation, MutationError};
use crate::types::{FailurePolicy, PropagationPolicy, TaskId};

/// Channel on which a proposer receives the commit version or the rejection.
pub type ProposalReply = oneshot::Sender<Result<u64, MutationError>>;

/// Outcome of a task run for the scheduler.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Success(TaskResult),
    Failed(String),
}

/// Runtime options used by the scheduler and the async shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Maximum number of tasks running at once (at least 1).
    pub max_concurrency: usize,
    pub propagation: PropagationPolicy,
    pub failure_policy: FailurePolicy,
    /// Number of cycle rejections that terminates the workflow (at least 1).
    pub max_cycle_rejections: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            propagation: PropagationPolicy::Inherit,
            failure_policy: FailurePolicy::Contain,
            max_cycle_rejections: 1,
        }
    }
}

impl OrchestratorOptions {
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = n.max(1);
        self
    }

    pub fn propagation(mut self, policy: PropagationPolicy) -> Self {
        self.propagation = policy;
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn max_cycle_rejections(mut self, n: usize) -> Self {
        self.max_cycle_rejections = n.max(1);
        self
    }
}

/// Events consumed by the pure core.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreEvent {
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    MutationProposed { task: TaskId, mutation: Mutation },
    ShutdownRequested { reason: String },
}

/// Events flowing into the runtime from the executor, running tasks and
/// cancel handles.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A task finished with a concrete outcome.
    TaskCompleted { task: TaskId, outcome: TaskOutcome },
    /// A running task asks to grow the graph; the commit version or the
    /// rejection is sent back on `reply`.
    MutationProposed {
        task: TaskId,
        mutation: Mutation,
        reply: ProposalReply,
    },
    /// Stop the workflow (e.g. a [`CancelHandle`] was used).
    ShutdownRequested { reason: String },
}

impl RuntimeEvent {
    /// Split into the core event and the reply channel, if any.
    pub fn into_core(
        self,
    ) -> (CoreEvent, Option<ProposalReply>) {
        match self {
            RuntimeEvent::TaskCompleted { task, outcome } => {
                (CoreEvent::TaskCompleted { task, outcome }, None)
            }
            RuntimeEvent::MutationProposed {
                task,
                mutation,
                reply,
            } => (CoreEvent::MutationProposed { task, mutation }, Some(reply)),
            RuntimeEvent::ShutdownRequested { reason } => {
                (CoreEvent::ShutdownRequested { reason }, None)
            }
        }
    }
}

pub mod core;
pub mod event_handlers;
pub mod orchestrator;
pub mod report;
pub mod runtime;

pub use core::CoreRuntime;
pub use event_handlers::{CoreCommand, CoreStep};
pub use orchestrator::{CancelHandle, Orchestrator, SnapshotReader};
pub use report::WorkflowReport;
pub use runtime::Runtime;
