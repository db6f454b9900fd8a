#![allow(dead_code)]

use std::sync::Arc;

use serde_json::{json, Value};

use dynadag::engine::{Orchestrator, OrchestratorOptions, WorkflowReport};
use dynadag::exec::{RunnerRegistry, TaskResult};
use dynadag::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};
use dynadag::promise::{Constraint, SuccessorTemplate};
use dynadag::sched::TaskInvocation;
use dynadag::types::TaskTag;
use dynadag_test_utils::{init_tracing, with_timeout};

/// `A -> M`, where `M` maps `square` over `[1, 2, 3, 4]` and reduces into
/// `R` of type `sum`.
pub fn map_reduce_definition() -> WorkflowDefinition {
    WorkflowDefinition::new("map-reduce")
        .node(NodeSpec::new("A", "source"))
        .node(
            NodeSpec::new("M", "split")
                .tag(TaskTag::Map)
                .constraint(Constraint::AllOf {
                    inputs: vec![json!(1), json!(2), json!(3), json!(4)],
                    child_type: "square".into(),
                    reduce: SuccessorTemplate::new("R", "sum"),
                }),
        )
        .edge(EdgeSpec::data("A", "M"))
}

/// The complete final mutation of `M` in [`map_reduce_definition`].
pub fn map_spawn(children: &[i64]) -> TaskResult {
    let mut result = TaskResult::new(json!("split"));
    for (i, x) in children.iter().enumerate() {
        let id = format!("sq_{i}");
        result = result
            .spawn(NodeSpec::new(id.clone(), "square").inputs(json!(x)))
            .edge(EdgeSpec::data(id, "R"));
    }
    result.spawn(NodeSpec::new("R", "sum"))
}

pub fn square(inv: &TaskInvocation) -> Value {
    let x = inv.inputs.as_i64().unwrap_or_default();
    json!(x * x)
}

pub fn sum_upstream(inv: &TaskInvocation) -> Value {
    json!(inv.upstream.values().filter_map(Value::as_i64).sum::<i64>())
}

/// Runner with trivial `source`, `square` and `sum` handlers.
pub fn base_registry() -> RunnerRegistry {
    RunnerRegistry::new()
        .register("source", |_inv, _ctx| async move { Ok(TaskResult::new(json!("ok"))) })
        .register("square", |inv, _ctx| async move { Ok(TaskResult::new(square(&inv))) })
        .register("sum", |inv, _ctx| async move { Ok(TaskResult::new(sum_upstream(&inv))) })
        .register("noop", |_inv, _ctx| async move { Ok(TaskResult::empty()) })
}

/// Register and run `definition` to completion with the real executor.
pub async fn run_workflow(
    definition: &WorkflowDefinition,
    options: OrchestratorOptions,
    runner: RunnerRegistry,
) -> WorkflowReport {
    init_tracing();
    let orchestrator = Orchestrator::new(definition, options, Arc::new(runner))
        .expect("workflow should register");
    with_timeout(orchestrator.run())
        .await
        .expect("runtime should not error")
}
