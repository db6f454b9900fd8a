// src/sched/step.rs

//! Step-by-step execution result types for the scheduler.

use crate::sched::TaskInvocation;
use crate::types::{TaskId, WorkflowState};

/// Structured result of a single scheduler "step".
///
/// Tests drive the scheduler by hand and assert on these.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Tasks admitted for dispatch in this step.
    pub newly_scheduled: Vec<TaskInvocation>,
    /// Tasks marked `Failed` in this step (including cascaded dependents).
    pub newly_failed: Vec<TaskId>,
    /// In-flight tasks the executor should stop.
    pub cancelled: Vec<TaskId>,
    /// Set when this step moved the workflow to a terminal state.
    pub workflow_finished: Option<WorkflowState>,
}

impl SchedulerStep {
    pub fn is_empty(&self) -> bool {
        self.newly_scheduled.is_empty()
            && self.newly_failed.is_empty()
            && self.cancelled.is_empty()
            && self.workflow_finished.is_none()
    }

    pub(crate) fn merge(&mut self, other: SchedulerStep) {
        self.newly_scheduled.extend(other.newly_scheduled);
        self.newly_failed.extend(other.newly_failed);
        self.cancelled.extend(other.cancelled);
        if other.workflow_finished.is_some() {
            self.workflow_finished = other.workflow_finished;
        }
    }
}
