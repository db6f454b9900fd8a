// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`CoreEvent`]s and produces:
//! - an updated core state
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - sending invocations and cancellations to the executor
//! - answering mutation proposals
//! - publishing graph views to snapshot readers
//!
//! The core is unit tested without any Tokio, channels or runners.

use std::sync::Arc;

use crate::engine::event_handlers::{
    handle_mutation_proposed, handle_shutdown, handle_start, handle_task_completion, CoreStep,
};
use crate::engine::CoreEvent;
use crate::graph::GraphView;
use crate::history::HistoryRecorder;
use crate::sched::Scheduler;
use crate::types::WorkflowState;

/// Pure core runtime state.
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    scheduler: Scheduler,
}

impl CoreRuntime {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn state(&self) -> WorkflowState {
        self.scheduler.state()
    }

    pub fn is_finished(&self) -> bool {
        self.scheduler.is_finished()
    }

    pub fn view(&self) -> Arc<GraphView> {
        self.scheduler.view()
    }

    pub fn into_history(self) -> HistoryRecorder {
        self.scheduler.into_history()
    }

    /// Start the workflow and dispatch the initial ready set.
    pub fn start(&mut self) -> CoreStep {
        handle_start(&mut self.scheduler)
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: CoreEvent) -> CoreStep {
        match event {
            CoreEvent::TaskCompleted { task, outcome } => {
                handle_task_completion(&mut self.scheduler, &task, outcome)
            }
            CoreEvent::MutationProposed { task, mutation } => {
                handle_mutation_proposed(&mut self.scheduler, &task, mutation)
            }
            CoreEvent::ShutdownRequested { reason } => {
                handle_shutdown(&mut self.scheduler, &reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::engine::event_handlers::CoreCommand;
    use crate::engine::{OrchestratorOptions, TaskOutcome};
    use crate::exec::TaskResult;
    use crate::graph::{EdgeSpec, GraphStore, Mutation, MutationError, NodeSpec, WorkflowDefinition};
    use crate::promise::Constraint;
    use crate::types::{TaskStatus, TerminationCause};

    fn core_for(def: &WorkflowDefinition, options: OrchestratorOptions) -> CoreRuntime {
        let store = GraphStore::from_definition(def, options.propagation).unwrap();
        CoreRuntime::new(Scheduler::new(store, options))
    }

    fn chain() -> WorkflowDefinition {
        WorkflowDefinition::new("chain")
            .node(NodeSpec::new("A", "t"))
            .node(NodeSpec::new("B", "t"))
            .edge(EdgeSpec::data("A", "B"))
    }

    fn dispatched(step: &CoreStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks.iter().map(|t| t.id.clone())),
                _ => None,
            })
            .flatten()
            .collect()
    }

    fn done(task: &str, output: serde_json::Value) -> CoreEvent {
        CoreEvent::TaskCompleted {
            task: task.to_string(),
            outcome: TaskOutcome::Success(TaskResult::new(output)),
        }
    }

    #[test]
    fn chain_runs_in_dependency_order() {
        let mut core = core_for(&chain(), OrchestratorOptions::default());

        let step = core.start();
        assert!(step.keep_running);
        assert_eq!(dispatched(&step), vec!["A"]);

        let step = core.step(done("A", json!(1)));
        let b = match &step.commands[..] {
            [CoreCommand::DispatchTasks(tasks)] => tasks[0].clone(),
            other => panic!("unexpected commands: {other:?}"),
        };
        assert_eq!(b.id, "B");
        assert_eq!(b.upstream.get("A"), Some(&json!(1)));

        let step = core.step(done("B", json!(2)));
        assert!(!step.keep_running);
        assert_eq!(step.commands, vec![CoreCommand::RequestExit]);
        assert_eq!(core.state(), WorkflowState::Completed);
    }

    #[test]
    fn proposal_from_idle_task_is_refused() {
        let mut core = core_for(&chain(), OrchestratorOptions::default());
        core.start();

        let step = core.step(CoreEvent::MutationProposed {
            task: "B".into(),
            mutation: Mutation::new("B", vec![NodeSpec::new("X", "t")], vec![]),
        });
        assert_eq!(
            step.proposal,
            Some(Err(MutationError::NotRunning { task: "B".into() }))
        );
        assert!(step.keep_running);
        assert!(!core.view().contains("X"));
    }

    #[test]
    fn committed_proposal_extends_the_graph() {
        let mut core = core_for(&chain(), OrchestratorOptions::default());
        core.start();
        let before = core.view().version();

        let step = core.step(CoreEvent::MutationProposed {
            task: "A".into(),
            mutation: Mutation::new("A", vec![NodeSpec::new("X", "t")], vec![EdgeSpec::data("X", "B")]),
        });
        assert_eq!(step.proposal, Some(Ok(before + 1)));
        // X waits for A through the implicit control edge.
        assert!(dispatched(&step).is_empty());

        let step = core.step(done("A", json!(null)));
        assert_eq!(dispatched(&step), vec!["X"]);
        let step = core.step(done("X", json!("x")));
        assert_eq!(dispatched(&step), vec!["B"]);
    }

    #[test]
    fn late_completion_after_shutdown_is_ignored() {
        let mut core = core_for(&chain(), OrchestratorOptions::default());
        core.start();

        let step = core.step(CoreEvent::ShutdownRequested {
            reason: "stop".into(),
        });
        assert!(!step.keep_running);
        assert!(step
            .commands
            .contains(&CoreCommand::CancelTasks(vec!["A".to_string()])));
        let version = core.view().version();

        let step = core.step(done("A", json!(1)));
        assert!(!step.keep_running);
        assert_eq!(core.view().version(), version);
        assert_eq!(core.view().status("A"), Some(TaskStatus::Failed));
        assert!(matches!(
            core.view().termination(),
            Some(TerminationCause::Cancelled { .. })
        ));
    }

    #[test]
    fn concurrency_limit_holds_back_ready_tasks() {
        let def = WorkflowDefinition::new("wide")
            .node(NodeSpec::new("a", "t"))
            .node(NodeSpec::new("b", "t"))
            .node(NodeSpec::new("c", "t"));
        let mut core = core_for(&def, OrchestratorOptions::default().max_concurrency(1));

        assert_eq!(dispatched(&core.start()), vec!["a"]);
        assert_eq!(dispatched(&core.step(done("a", json!(null)))), vec!["b"]);
        assert_eq!(dispatched(&core.step(done("b", json!(null)))), vec!["c"]);
    }

    #[test]
    fn mutually_edge_bounded_tasks_run_one_after_the_other() {
        let both: std::collections::BTreeSet<String> = ["P".to_string(), "Q".to_string()].into();
        let def = WorkflowDefinition::new("pair")
            .node(NodeSpec::new("P", "t").constraint(Constraint::EdgesOnlyAmong { nodes: both.clone() }))
            .node(NodeSpec::new("Q", "t").constraint(Constraint::EdgesOnlyAmong { nodes: both }));
        let mut core = core_for(&def, OrchestratorOptions::default());

        let step = core.start();
        assert!(step.keep_running);
        assert_eq!(dispatched(&step), vec!["P"]);

        let step = core.step(done("P", json!(null)));
        assert_eq!(dispatched(&step), vec!["Q"]);

        let step = core.step(done("Q", json!(null)));
        assert!(!step.keep_running);
        assert_eq!(core.state(), WorkflowState::Completed);
    }
}
