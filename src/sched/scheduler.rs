// src/sched/scheduler.rs

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::{OrchestratorOptions, TaskOutcome};
use crate::graph::{GraphStore, GraphView, Mutation, MutationError};
use crate::history::HistoryRecorder;
use crate::promise::Violation;
use crate::sched::state_manager::StateManager;
use crate::sched::{SchedulerStep, TaskInvocation};
use crate::types::{
    FailurePolicy, FailureReason, MutationSummary, TaskId, TaskStatus, TerminationCause,
    WorkflowState,
};

/// Scheduler owns the graph store plus the dispatch bookkeeping.
///
/// It is responsible for:
/// - deciding which tasks are ready and admitting them up to the
///   concurrency limit
/// - routing spawn requests through the promise engine into the store
/// - marking tasks as succeeded/failed and failing their dependents
/// - deciding when the workflow is finished, failed or terminated
#[derive(Debug)]
pub struct Scheduler {
    store: GraphStore,
    options: OrchestratorOptions,
    ready: VecDeque<TaskId>,
    running: BTreeSet<TaskId>,
    cycle_rejections: usize,
    /// First task failure that was not tolerated.
    untolerated_failure: Option<(TaskId, FailureReason)>,
}

impl Scheduler {
    pub fn new(store: GraphStore, options: OrchestratorOptions) -> Self {
        Self {
            store,
            options,
            ready: VecDeque::new(),
            running: BTreeSet::new(),
            cycle_rejections: 0,
            untolerated_failure: None,
        }
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn view(&self) -> Arc<GraphView> {
        self.store.latest()
    }

    pub fn state(&self) -> WorkflowState {
        self.store.view().state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Tasks currently handed to the executor.
    pub fn running(&self) -> impl Iterator<Item = &str> {
        self.running.iter().map(String::as_str)
    }

    pub fn into_history(self) -> HistoryRecorder {
        self.store.into_history()
    }

    /// Move the workflow to `Running` and admit the initial ready set.
    pub fn start(&mut self) -> SchedulerStep {
        if self.state() != WorkflowState::Registered {
            warn!(state = ?self.state(), "scheduler: start called twice; ignoring");
            return SchedulerStep::default();
        }
        if let Err(e) = self.store.set_workflow_state(WorkflowState::Running, None) {
            return self.inconsistency(None, e.to_string(), None);
        }
        info!(
            workflow = %self.store.view().workflow_id(),
            tasks = self.store.view().node_count(),
            "scheduler: workflow started"
        );
        self.advance(SchedulerStep::default())
    }

    /// Handle a task's completion.
    ///
    /// A successful result may carry a final spawn request, which is applied
    /// before the task's obligations are checked.
    pub fn step_completion(&mut self, task: &str, outcome: TaskOutcome) -> SchedulerStep {
        if self.is_finished() || !self.running.remove(task) {
            warn!(task = %task, "discarding late completion");
            return SchedulerStep::default();
        }

        match outcome {
            TaskOutcome::Success(result) => {
                if !result.spawn.is_empty() || !result.edges.is_empty() {
                    let mutation = Mutation::new(task, result.spawn, result.edges);
                    if let Err(e) = self.store.apply_mutation(&mutation) {
                        let step = self.handle_rejection(task, mutation.summary(), e);
                        return self.advance(step);
                    }
                }

                if let Err(violation) = self.store.finalize_obligations(task) {
                    warn!(task = %task, violation = %violation, "task finished with unmet obligations");
                    let summary = MutationSummary {
                        origin: task.to_string(),
                        nodes: Vec::new(),
                        edges: Vec::new(),
                    };
                    let step = self.promise_violation(task, violation, summary);
                    return self.advance(step);
                }

                if let Err(e) = self
                    .store
                    .transition(task, TaskStatus::Succeeded, None, Some(result.output))
                {
                    return self.inconsistency(Some(task), e.to_string(), None);
                }
                debug!(task = %task, "task succeeded");
                self.advance(SchedulerStep::default())
            }
            TaskOutcome::Failed(message) => {
                warn!(task = %task, error = %message, "task failed");
                let step = self.fail_task(task, FailureReason::TaskExecution { message });
                self.advance(step)
            }
        }
    }

    /// Handle a mutation proposed by a task that is still running.
    pub fn step_proposal(
        &mut self,
        task: &str,
        mutation: Mutation,
    ) -> (Result<u64, MutationError>, SchedulerStep) {
        if self.store.is_frozen() {
            return (Err(MutationError::Frozen), SchedulerStep::default());
        }
        if !self.running.contains(task) || mutation.origin != task {
            warn!(task = %task, origin = %mutation.origin, "discarding proposal from task that is not running");
            return (
                Err(MutationError::NotRunning {
                    task: mutation.origin.clone(),
                }),
                SchedulerStep::default(),
            );
        }

        match self.store.apply_mutation(&mutation) {
            Ok(version) => (Ok(version), self.advance(SchedulerStep::default())),
            Err(e) => {
                let mut step = self.handle_rejection(task, mutation.summary(), e.clone());
                // The task is already failed; stop whatever it is still doing.
                let failed = self.store.view().status(task) == Some(TaskStatus::Failed);
                if failed && !step.cancelled.iter().any(|c| c == task) {
                    step.cancelled.push(task.to_string());
                }
                (Err(e), self.advance(step))
            }
        }
    }

    /// External shutdown: cancel everything and terminate.
    pub fn step_shutdown(&mut self, reason: &str) -> SchedulerStep {
        if self.is_finished() {
            return SchedulerStep::default();
        }
        info!(reason = %reason, "scheduler: shutdown requested");
        self.terminate(
            WorkflowState::Terminated,
            TerminationCause::Cancelled {
                reason: reason.to_string(),
            },
        )
    }

    fn handle_rejection(
        &mut self,
        task: &str,
        summary: MutationSummary,
        error: MutationError,
    ) -> SchedulerStep {
        self.store.record_rejection(summary.clone(), error.clone());

        match error {
            MutationError::Promise(violation) => self.promise_violation(task, violation, summary),
            MutationError::Cycle { from, to } => {
                self.cycle_rejections += 1;
                let reason = FailureReason::CycleRejected {
                    from: from.clone(),
                    to: to.clone(),
                };
                if self.cycle_rejections >= self.options.max_cycle_rejections {
                    let mut step = self.fail_only(task, reason);
                    step.merge(self.terminate(
                        WorkflowState::Terminated,
                        TerminationCause::CycleRejected {
                            task: task.to_string(),
                            from,
                            to,
                            mutation: summary,
                            rejections: self.cycle_rejections,
                        },
                    ));
                    step
                } else {
                    self.fail_task(task, reason)
                }
            }
            MutationError::Inconsistency { detail } => {
                let mut step = self.fail_only(
                    task,
                    FailureReason::GraphInconsistency {
                        detail: detail.clone(),
                    },
                );
                step.merge(self.inconsistency(Some(task), detail, Some(summary)));
                step
            }
            MutationError::NotRunning { .. } | MutationError::Frozen => SchedulerStep::default(),
        }
    }

    fn promise_violation(
        &mut self,
        task: &str,
        violation: Violation,
        summary: MutationSummary,
    ) -> SchedulerStep {
        warn!(
            task = %task,
            constraint = violation.constraint(),
            "promise violation; terminating workflow"
        );
        let mut step = self.fail_only(
            task,
            FailureReason::PromiseViolation {
                violation: violation.clone(),
            },
        );
        step.merge(self.terminate(
            WorkflowState::Terminated,
            TerminationCause::PromiseViolation {
                task: task.to_string(),
                violation,
                mutation: summary,
            },
        ));
        step
    }

    /// Mark `task` failed and apply the task failure policy.
    fn fail_task(&mut self, task: &str, reason: FailureReason) -> SchedulerStep {
        let mut step = self.fail_only(task, reason.clone());
        let tolerated = self
            .store
            .view()
            .node(task)
            .is_some_and(|n| n.tolerate_failure);
        if tolerated {
            info!(task = %task, "failure tolerated");
            return step;
        }

        if self.untolerated_failure.is_none() {
            self.untolerated_failure = Some((task.to_string(), reason.clone()));
        }
        if self.options.failure_policy == FailurePolicy::Abort && !self.is_finished() {
            step.merge(self.terminate(
                WorkflowState::Failed,
                TerminationCause::TaskFailed {
                    task: task.to_string(),
                    reason,
                },
            ));
        }
        step
    }

    fn fail_only(&mut self, task: &str, reason: FailureReason) -> SchedulerStep {
        self.running.remove(task);
        let mut step = SchedulerStep::default();
        let open = self
            .store
            .view()
            .status(task)
            .is_some_and(|s| !s.is_terminal());
        if open {
            if let Err(e) = self
                .store
                .transition(task, TaskStatus::Failed, Some(reason), None)
            {
                return self.inconsistency(Some(task), e.to_string(), None);
            }
            step.newly_failed.push(task.to_string());
        }
        step
    }

    /// Recompute readiness, admit work and detect the end of the workflow.
    fn advance(&mut self, mut step: SchedulerStep) -> SchedulerStep {
        if self.is_finished() {
            return step;
        }

        match StateManager::new(&mut self.store).sweep() {
            Ok((ready, failed)) => {
                self.ready.extend(ready);
                if !failed.is_empty() && self.untolerated_failure.is_none() {
                    if let Some(first) = failed.first() {
                        let reason = self
                            .store
                            .view()
                            .node(first)
                            .and_then(|n| n.failure.clone())
                            .unwrap_or(FailureReason::Cancelled);
                        self.untolerated_failure = Some((first.clone(), reason));
                    }
                }
                step.newly_failed.extend(failed);
            }
            Err(e) => {
                step.merge(self.inconsistency(None, e.to_string(), None));
                return step;
            }
        }

        while self.running.len() < self.options.max_concurrency {
            let Some(id) = self.ready.pop_front() else {
                break;
            };
            if let Err(e) = self.store.transition(&id, TaskStatus::Running, None, None) {
                step.merge(self.inconsistency(Some(&id), e.to_string(), None));
                return step;
            }
            let Some(invocation) = TaskInvocation::from_view(self.store.view(), &id) else {
                step.merge(self.inconsistency(Some(&id), format!("task '{id}' vanished"), None));
                return step;
            };
            info!(task = %id, task_type = %invocation.task_type, version = invocation.version, "dispatching task");
            self.running.insert(id);
            step.newly_scheduled.push(invocation);
        }

        if self.running.is_empty() && self.ready.is_empty() {
            step.merge(self.finish());
        }
        step
    }

    /// Nothing is running or ready: the workflow is either done or stuck.
    fn finish(&mut self) -> SchedulerStep {
        let view = self.store.latest();
        if !view.all_terminal() {
            let pending: Vec<&str> = view.open_nodes().map(|n| n.id.as_str()).collect();
            error!(pending = ?pending, "no runnable work left but tasks are still pending");
            return self.inconsistency(
                None,
                format!("workflow stalled with pending tasks: {}", pending.join(", ")),
                None,
            );
        }

        let (state, cause) = match self.untolerated_failure.clone() {
            Some((task, reason)) => (
                WorkflowState::Failed,
                Some(TerminationCause::TaskFailed { task, reason }),
            ),
            None => (WorkflowState::Completed, None),
        };
        if let Err(e) = self.store.set_workflow_state(state, cause) {
            return self.inconsistency(None, e.to_string(), None);
        }
        self.store.freeze();
        info!(state = ?state, version = self.store.view().version(), "workflow finished");
        SchedulerStep {
            workflow_finished: Some(state),
            ..SchedulerStep::default()
        }
    }

    fn inconsistency(
        &mut self,
        task: Option<&str>,
        detail: String,
        mutation: Option<MutationSummary>,
    ) -> SchedulerStep {
        error!(task = ?task, detail = %detail, "graph inconsistency; terminating workflow");
        self.terminate(
            WorkflowState::Terminated,
            TerminationCause::GraphInconsistency {
                task: task.map(str::to_string),
                detail,
                mutation,
            },
        )
    }

    /// Stop admission, cancel in-flight work, record the cause and freeze.
    fn terminate(&mut self, state: WorkflowState, cause: TerminationCause) -> SchedulerStep {
        let mut step = SchedulerStep::default();
        if self.is_finished() {
            return step;
        }
        self.ready.clear();

        let mut in_flight = std::mem::take(&mut self.running);
        match StateManager::new(&mut self.store).cancel_open() {
            Ok((running, others)) => {
                step.newly_failed.extend(running.iter().cloned());
                step.newly_failed.extend(others);
                in_flight.extend(running);
            }
            Err(e) => error!(error = %e, "failed to cancel open tasks"),
        }
        step.cancelled.extend(in_flight);

        if let Err(e) = self.store.set_workflow_state(state, Some(cause)) {
            error!(error = %e, "failed to record workflow termination");
        }
        self.store.freeze();
        warn!(state = ?state, version = self.store.view().version(), "workflow stopped");
        step.workflow_finished = Some(state);
        step
    }
}
