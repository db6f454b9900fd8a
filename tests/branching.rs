// tests/branching.rs

mod common;

use serde_json::json;

use common::{base_registry, run_workflow};
use dynadag::engine::OrchestratorOptions;
use dynadag::exec::{RunnerRegistry, TaskResult};
use dynadag::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};
use dynadag::history::HistoryEvent;
use dynadag::promise::{Constraint, SuccessorTemplate, Violation};
use dynadag::snapshot::{ProvisionalRole, Snapshot};
use dynadag::types::{TaskStatus, TaskTag, TerminationCause, WorkflowState};

/// `S -> B`, where `B` must commit exactly one of `left` (type `L`) or
/// `right` (type `R`).
fn branch_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("branch")
        .node(NodeSpec::new("S", "source"))
        .node(
            NodeSpec::new("B", "choose")
                .tag(TaskTag::Branch)
                .constraint(Constraint::ExactlyOneOf {
                    templates: vec![
                        SuccessorTemplate::new("left", "L"),
                        SuccessorTemplate::new("right", "R"),
                    ],
                }),
        )
        .edge(EdgeSpec::data("S", "B"))
}

fn registry_choosing(spawn: &'static [(&'static str, &'static str)]) -> RunnerRegistry {
    base_registry()
        .register("L", |_inv, _ctx| async move { Ok(TaskResult::new(json!("went left"))) })
        .register("R", |_inv, _ctx| async move { Ok(TaskResult::new(json!("went right"))) })
        .register("choose", move |_inv, _ctx| async move {
            let mut result = TaskResult::new(json!("chosen"));
            for (id, ty) in spawn {
                result = result.spawn(NodeSpec::new(*id, *ty));
            }
            Ok(result)
        })
}

#[tokio::test]
async fn committing_one_successor_completes() {
    let report = run_workflow(
        &branch_definition(),
        OrchestratorOptions::default(),
        registry_choosing(&[("left", "L")]),
    )
    .await;

    assert_eq!(report.state(), WorkflowState::Completed);
    assert_eq!(report.output("left"), Some(&json!("went left")));
    assert!(!report.final_view().contains("right"));
    assert!(report.snapshot().provisional.is_empty());
}

#[tokio::test]
async fn committing_both_successors_is_rejected_atomically() {
    let report = run_workflow(
        &branch_definition(),
        OrchestratorOptions::default(),
        registry_choosing(&[("left", "L"), ("right", "R")]),
    )
    .await;

    assert_eq!(report.state(), WorkflowState::Terminated);
    let view = report.final_view();
    assert!(!view.contains("left"));
    assert!(!view.contains("right"));
    assert_eq!(view.status("B"), Some(TaskStatus::Failed));

    match report.termination() {
        Some(TerminationCause::PromiseViolation {
            task,
            violation,
            mutation,
        }) => {
            assert_eq!(task, "B");
            assert!(matches!(violation, Violation::BranchMultiple { count: 2, .. }));
            assert_eq!(mutation.nodes, vec!["left".to_string(), "right".to_string()]);
        }
        other => panic!("unexpected termination: {other:?}"),
    }

    let rejected = report
        .history()
        .iter()
        .filter(|e| matches!(e.event, HistoryEvent::MutationRejected { .. }))
        .count();
    assert_eq!(rejected, 1);
}

#[tokio::test]
async fn finishing_without_a_successor_violates_the_branch() {
    let report = run_workflow(
        &branch_definition(),
        OrchestratorOptions::default(),
        registry_choosing(&[]),
    )
    .await;

    assert_eq!(report.state(), WorkflowState::Terminated);
    assert!(matches!(
        report.termination(),
        Some(TerminationCause::PromiseViolation {
            violation: Violation::BranchNone { .. },
            ..
        })
    ));
}

#[tokio::test]
async fn spawning_a_non_template_successor_is_rejected() {
    let report = run_workflow(
        &branch_definition(),
        OrchestratorOptions::default(),
        registry_choosing(&[("middle", "L")]),
    )
    .await;

    assert!(matches!(
        report.termination(),
        Some(TerminationCause::PromiseViolation {
            violation: Violation::NotABranchTemplate { .. },
            ..
        })
    ));
    assert!(!report.final_view().contains("middle"));
}

#[tokio::test]
async fn pending_branch_shows_both_candidates() {
    let report = run_workflow(
        &branch_definition(),
        OrchestratorOptions::default(),
        registry_choosing(&[("right", "R")]),
    )
    .await;

    // Version 1 is the registration; B has not run yet.
    let snapshot: Snapshot = report.snapshot_at(1).unwrap();
    let candidates: Vec<_> = snapshot
        .provisional
        .nodes
        .iter()
        .filter(|n| matches!(n.role, ProvisionalRole::BranchCandidate { alternatives: 2 }))
        .map(|n| n.key.as_str())
        .collect();
    assert_eq!(candidates, vec!["left", "right"]);
}
