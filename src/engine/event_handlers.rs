// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.

use tracing::debug;

use crate::engine::TaskOutcome;
use crate::graph::{Mutation, MutationError};
use crate::sched::{Scheduler, SchedulerStep, TaskInvocation};
use crate::types::TaskId;

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<TaskInvocation>),
    /// Ask the executor to stop these in-flight tasks.
    CancelTasks(Vec<TaskId>),
    /// The workflow reached a terminal state.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
    /// Answer to a `MutationProposed` event.
    pub proposal: Option<Result<u64, MutationError>>,
}

impl CoreStep {
    /// Translate a scheduler step into shell commands.
    ///
    /// Cancellations go first so the executor never runs a dispatched task
    /// alongside work it is being told to stop.
    pub fn from_scheduler(step: SchedulerStep) -> Self {
        let mut commands = Vec::new();
        if !step.cancelled.is_empty() {
            commands.push(CoreCommand::CancelTasks(step.cancelled));
        }
        if !step.newly_scheduled.is_empty() {
            commands.push(CoreCommand::DispatchTasks(step.newly_scheduled));
        }
        let keep_running = step.workflow_finished.is_none();
        if !keep_running {
            commands.push(CoreCommand::RequestExit);
        }
        Self {
            commands,
            keep_running,
            proposal: None,
        }
    }
}

pub fn handle_start(scheduler: &mut Scheduler) -> CoreStep {
    CoreStep::from_scheduler(scheduler.start())
}

pub fn handle_task_completion(
    scheduler: &mut Scheduler,
    task: &str,
    outcome: TaskOutcome,
) -> CoreStep {
    debug!(task = %task, "core: task completed");
    let step = CoreStep::from_scheduler(scheduler.step_completion(task, outcome));
    finished_or(scheduler, step)
}

pub fn handle_mutation_proposed(
    scheduler: &mut Scheduler,
    task: &str,
    mutation: Mutation,
) -> CoreStep {
    debug!(task = %task, nodes = mutation.nodes.len(), edges = mutation.edges.len(), "core: mutation proposed");
    let (result, step) = scheduler.step_proposal(task, mutation);
    let core_step = CoreStep::from_scheduler(step);
    let mut core_step = finished_or(scheduler, core_step);
    core_step.proposal = Some(result);
    core_step
}

pub fn handle_shutdown(scheduler: &mut Scheduler, reason: &str) -> CoreStep {
    let step = CoreStep::from_scheduler(scheduler.step_shutdown(reason));
    finished_or(scheduler, step)
}

/// Late events after the workflow finished still tell the shell to exit.
fn finished_or(scheduler: &Scheduler, mut step: CoreStep) -> CoreStep {
    if scheduler.is_finished() && step.keep_running {
        step.keep_running = false;
        step.commands.push(CoreCommand::RequestExit);
    }
    step
}
