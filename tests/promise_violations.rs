// tests/promise_violations.rs

mod common;

use serde_json::json;

use common::{base_registry, run_workflow};
use dynadag::engine::OrchestratorOptions;
use dynadag::exec::TaskResult;
use dynadag::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};
use dynadag::promise::{
    Constraint, ConstraintOrigin, DeclaredConstraint, RegistrationConstraints, Violation,
};
use dynadag::types::{
    FailureReason, PropagationPolicy, TaskStatus, TaskTag, TerminationCause, WorkflowState,
};
use dynadag_test_utils::id_set as set;

#[tokio::test]
async fn no_new_nodes_rejects_spawn_and_terminates() {
    let def = WorkflowDefinition::new("static-only")
        .node(NodeSpec::new("N", "greedy").constraint(Constraint::NoNewNodes))
        .node(NodeSpec::new("D", "noop"))
        .edge(EdgeSpec::data("N", "D"));

    let runner = base_registry().register("greedy", |_inv, _ctx| async move {
        Ok(TaskResult::new(json!(null)).spawn(NodeSpec::new("extra", "noop")))
    });

    let report = run_workflow(&def, OrchestratorOptions::default(), runner).await;

    assert_eq!(report.state(), WorkflowState::Terminated);
    let view = report.final_view();
    assert_eq!(view.node_count(), 2);
    assert!(!view.contains("extra"));

    let d = view.node("D").unwrap();
    assert_eq!(d.status, TaskStatus::Failed);
    assert_eq!(d.failure, Some(FailureReason::Cancelled));

    match report.termination() {
        Some(TerminationCause::PromiseViolation { task, violation, .. }) => {
            assert_eq!(task, "N");
            assert_eq!(violation.constraint(), "NoNewNodes");
        }
        other => panic!("unexpected termination: {other:?}"),
    }
}

/// `D` may spawn one child; that child tries to spawn two grandchildren.
fn fanout_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("fanout").node(
        NodeSpec::new("D", "parent")
            .tag(TaskTag::Dynamic)
            .constraint(Constraint::MaxFanout { max: 1 }),
    )
}

fn fanout_registry() -> dynadag::exec::RunnerRegistry {
    base_registry()
        .register("parent", |_inv, _ctx| async move {
            Ok(TaskResult::empty().spawn(NodeSpec::new("C", "child").tag(TaskTag::Dynamic)))
        })
        .register("child", |_inv, _ctx| async move {
            Ok(TaskResult::empty()
                .spawn(NodeSpec::new("g1", "noop"))
                .spawn(NodeSpec::new("g2", "noop")))
        })
}

#[tokio::test]
async fn inherited_constraints_bind_children() {
    let options = OrchestratorOptions::default().propagation(PropagationPolicy::Inherit);
    let report = run_workflow(&fanout_definition(), options, fanout_registry()).await;

    assert_eq!(report.state(), WorkflowState::Terminated);
    assert!(matches!(
        report.termination(),
        Some(TerminationCause::PromiseViolation {
            violation: Violation::FanoutExceeded { max: 1, attempted: 2, .. },
            ..
        })
    ));

    let child = report.final_view().node("C").unwrap();
    assert!(child.constraints.entries().iter().any(|e| e.origin
        == ConstraintOrigin::Inherited {
            from: "D".to_string()
        }));
}

#[tokio::test]
async fn isolated_children_start_unconstrained() {
    let options = OrchestratorOptions::default().propagation(PropagationPolicy::Isolate);
    let report = run_workflow(&fanout_definition(), options, fanout_registry()).await;

    assert_eq!(report.state(), WorkflowState::Completed);
    let view = report.final_view();
    assert_eq!(view.node_count(), 4);
    assert!(view.node("C").unwrap().constraints.is_empty());
}

#[tokio::test]
async fn explicit_opt_out_overrides_inherit() {
    let def = WorkflowDefinition::new("opt-out").node(
        NodeSpec::new("D", "parent")
            .tag(TaskTag::Dynamic)
            .declare(DeclaredConstraint::local(Constraint::MaxFanout { max: 1 })),
    );

    let report = run_workflow(&def, OrchestratorOptions::default(), fanout_registry()).await;
    assert_eq!(report.state(), WorkflowState::Completed);
}

#[tokio::test]
async fn slot_constraints_restrict_who_may_spawn_a_node() {
    let def = WorkflowDefinition::new("slots")
        .node(NodeSpec::new("Q", "intruder"))
        .constraints(RegistrationConstraints {
            global: Vec::new(),
            slots: [(
                "guarded".to_string(),
                vec![DeclaredConstraint::from(Constraint::SpawnableOnlyBy {
                    creators: set(&["P"]),
                })],
            )]
            .into_iter()
            .collect(),
        });

    let runner = base_registry().register("intruder", |_inv, _ctx| async move {
        Ok(TaskResult::empty().spawn(NodeSpec::new("guarded", "noop")))
    });

    let report = run_workflow(&def, OrchestratorOptions::default(), runner).await;

    assert!(matches!(
        report.termination(),
        Some(TerminationCause::PromiseViolation {
            violation: Violation::SpawnerNotAllowed { .. },
            ..
        })
    ));
    assert!(!report.final_view().contains("guarded"));
}

#[tokio::test]
async fn global_constraints_apply_to_every_task() {
    let def = WorkflowDefinition::new("global")
        .node(NodeSpec::new("T", "spawner"))
        .constraints(RegistrationConstraints {
            global: vec![DeclaredConstraint::from(Constraint::NodesOnlyOfType {
                types: set(&["noop"]),
            })],
            slots: Default::default(),
        });

    let runner = base_registry().register("spawner", |_inv, _ctx| async move {
        Ok(TaskResult::empty()
            .spawn(NodeSpec::new("ok", "noop"))
            .spawn(NodeSpec::new("bad", "source")))
    });

    let report = run_workflow(&def, OrchestratorOptions::default(), runner).await;

    match report.termination() {
        Some(TerminationCause::PromiseViolation { violation, .. }) => {
            assert_eq!(
                violation,
                &Violation::NodeTypeNotAllowed {
                    task: "T".into(),
                    node: "bad".into(),
                    task_type: "source".into(),
                }
            );
        }
        other => panic!("unexpected termination: {other:?}"),
    }
    // Atomic: the allowed node was not committed either.
    assert!(!report.final_view().contains("ok"));
}

fn assert_violation(report: &dynadag::engine::WorkflowReport, task: &str, constraint: &str) {
    assert_eq!(report.state(), WorkflowState::Terminated);
    match report.termination() {
        Some(TerminationCause::PromiseViolation { task: t, violation, .. }) => {
            assert_eq!(t, task);
            assert_eq!(violation.constraint(), constraint);
        }
        other => panic!("unexpected termination: {other:?}"),
    }
}

/// Registry where `T` finishes with `result`.
fn wirer(result: fn() -> TaskResult) -> dynadag::exec::RunnerRegistry {
    base_registry().register("wirer", move |_inv, _ctx| async move { Ok(result()) })
}

fn single(constraint: Constraint) -> WorkflowDefinition {
    WorkflowDefinition::new("single").node(NodeSpec::new("T", "wirer").constraint(constraint))
}

#[tokio::test]
async fn no_new_edges_rejects_explicit_edges() {
    let runner = wirer(|| {
        TaskResult::empty()
            .spawn(NodeSpec::new("c", "noop"))
            .edge(EdgeSpec::data("T", "c"))
    });
    let report = run_workflow(&single(Constraint::NoNewEdges), OrchestratorOptions::default(), runner).await;

    assert_violation(&report, "T", "NoNewEdges");
    assert!(!report.final_view().contains("c"));
}

#[tokio::test]
async fn no_new_edges_still_allows_spawning() {
    let runner = wirer(|| TaskResult::empty().spawn(NodeSpec::new("c", "noop")));
    let report = run_workflow(&single(Constraint::NoNewEdges), OrchestratorOptions::default(), runner).await;

    assert_eq!(report.state(), WorkflowState::Completed);
    // Only the implicit spawn edge exists.
    assert!(report.final_view().has_edge("T", "c"));
    assert_eq!(report.final_view().edges().len(), 1);
}

fn bounded_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("bounded")
        .node(NodeSpec::new("T", "wirer").constraint(Constraint::EdgesOnlyAmong {
            nodes: set(&["T", "X", "Y"]),
        }))
        .node(NodeSpec::new("X", "noop"))
        .node(NodeSpec::new("Y", "noop"))
        .node(NodeSpec::new("Z", "noop"))
}

#[tokio::test]
async fn edges_only_among_rejects_edge_leaving_the_set() {
    let runner = wirer(|| TaskResult::empty().edge(EdgeSpec::control("X", "Z")));
    let report = run_workflow(&bounded_definition(), OrchestratorOptions::default(), runner).await;

    assert_violation(&report, "T", "EdgesOnlyAmong");
    assert!(!report.final_view().has_edge("X", "Z"));
}

#[tokio::test]
async fn edges_only_among_wires_held_members() {
    let runner = wirer(|| TaskResult::empty().edge(EdgeSpec::data("X", "Y")));
    let report = run_workflow(&bounded_definition(), OrchestratorOptions::default(), runner).await;

    assert_eq!(report.state(), WorkflowState::Completed);
    let view = report.final_view();
    assert!(view.has_edge("X", "Y"));
    // X and Y were held until T committed, so neither started before it.
    let t_done = view.node("T").unwrap().finished_at.unwrap();
    assert!(view.node("X").unwrap().started_at.unwrap() > t_done);
    assert!(view.node("Y").unwrap().started_at.unwrap() > view.node("X").unwrap().finished_at.unwrap());
}

#[tokio::test]
async fn no_edges_from_rejects_edge_out_of_the_named_task() {
    let def = WorkflowDefinition::new("from")
        .node(NodeSpec::new("X", "noop"))
        .node(NodeSpec::new("T", "wirer").constraint(Constraint::NoEdgesFrom { node: "X".into() }))
        .edge(EdgeSpec::data("X", "T"));
    let runner = wirer(|| {
        TaskResult::empty()
            .spawn(NodeSpec::new("c", "noop"))
            .edge(EdgeSpec::data("X", "c"))
    });
    let report = run_workflow(&def, OrchestratorOptions::default(), runner).await;

    assert_violation(&report, "T", "NoEdgesFrom");
    assert!(!report.final_view().contains("c"));
}

#[tokio::test]
async fn no_edges_from_allows_other_sources() {
    let def = WorkflowDefinition::new("from")
        .node(NodeSpec::new("X", "noop"))
        .node(NodeSpec::new("T", "wirer").constraint(Constraint::NoEdgesFrom { node: "X".into() }))
        .edge(EdgeSpec::data("X", "T"));
    let runner = wirer(|| {
        TaskResult::empty()
            .spawn(NodeSpec::new("c", "noop"))
            .spawn(NodeSpec::new("d", "noop"))
            .edge(EdgeSpec::data("c", "d"))
    });
    let report = run_workflow(&def, OrchestratorOptions::default(), runner).await;

    assert_eq!(report.state(), WorkflowState::Completed);
    assert!(report.final_view().has_edge("c", "d"));
}

#[tokio::test]
async fn no_edges_to_rejects_edge_into_the_named_task() {
    let runner = wirer(|| {
        TaskResult::empty()
            .spawn(NodeSpec::new("c", "noop"))
            .spawn(NodeSpec::new("R", "noop"))
            .edge(EdgeSpec::data("c", "R"))
    });
    let report = run_workflow(
        &single(Constraint::NoEdgesTo { node: "R".into() }),
        OrchestratorOptions::default(),
        runner,
    )
    .await;

    assert_violation(&report, "T", "NoEdgesTo");
    assert!(!report.final_view().contains("R"));
}

#[tokio::test]
async fn no_edges_to_allows_edges_out_of_the_named_task() {
    let runner = wirer(|| {
        TaskResult::empty()
            .spawn(NodeSpec::new("c", "noop"))
            .spawn(NodeSpec::new("R", "noop"))
            .edge(EdgeSpec::data("R", "c"))
    });
    let report = run_workflow(
        &single(Constraint::NoEdgesTo { node: "R".into() }),
        OrchestratorOptions::default(),
        runner,
    )
    .await;

    assert_eq!(report.state(), WorkflowState::Completed);
    assert!(report.final_view().has_edge("R", "c"));
}

#[tokio::test]
async fn nodes_only_among_rejects_unlisted_ids() {
    let runner = wirer(|| TaskResult::empty().spawn(NodeSpec::new("z", "noop")));
    let report = run_workflow(
        &single(Constraint::NodesOnlyAmong { nodes: set(&["a", "b"]) }),
        OrchestratorOptions::default(),
        runner,
    )
    .await;

    assert_violation(&report, "T", "NodesOnlyAmong");
    assert!(!report.final_view().contains("z"));
}

#[tokio::test]
async fn nodes_only_among_allows_a_subset() {
    let runner = wirer(|| TaskResult::empty().spawn(NodeSpec::new("a", "noop")));
    let report = run_workflow(
        &single(Constraint::NodesOnlyAmong { nodes: set(&["a", "b"]) }),
        OrchestratorOptions::default(),
        runner,
    )
    .await;

    assert_eq!(report.state(), WorkflowState::Completed);
    let view = report.final_view();
    assert!(view.contains("a"));
    assert!(!view.contains("b"));
}
