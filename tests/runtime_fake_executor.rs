// tests/runtime_fake_executor.rs

mod common;

use std::error::Error;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};

use dynadag::engine::{CoreRuntime, OrchestratorOptions, Runtime, RuntimeEvent, TaskOutcome};
use dynadag::exec::TaskResult;
use dynadag::graph::{EdgeSpec, GraphStore, NodeSpec, WorkflowDefinition};
use dynadag::sched::Scheduler;
use dynadag::types::{FailurePolicy, TaskStatus, WorkflowState};
use dynadag_test_utils::fake_executor::FakeExecutor;
use dynadag_test_utils::{chain_definition, init_tracing};

type TestResult = Result<(), Box<dyn Error>>;

/// Diamond: A -> {B, C} -> D
fn diamond() -> WorkflowDefinition {
    WorkflowDefinition::new("diamond")
        .node(NodeSpec::new("A", "t"))
        .node(NodeSpec::new("B", "t"))
        .node(NodeSpec::new("C", "t"))
        .node(NodeSpec::new("D", "t"))
        .edge(EdgeSpec::data("A", "B"))
        .edge(EdgeSpec::data("A", "C"))
        .edge(EdgeSpec::data("B", "D"))
        .edge(EdgeSpec::data("C", "D"))
}

fn runtime_for(
    def: &WorkflowDefinition,
    options: OrchestratorOptions,
    executor: impl FnOnce(mpsc::Sender<RuntimeEvent>) -> FakeExecutor,
) -> Runtime<FakeExecutor> {
    let store = GraphStore::from_definition(def, options.propagation).unwrap();
    let (views, _) = watch::channel(store.latest());
    let core = CoreRuntime::new(Scheduler::new(store, options));
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(16);
    Runtime::new(core, rt_rx, executor(rt_tx), views)
}

#[tokio::test]
async fn runtime_with_fake_executor_runs_diamond() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let runtime = runtime_for(&diamond(), OrchestratorOptions::default(), |tx| {
        FakeExecutor::new(tx, executed.clone())
    });

    let core = match timeout(Duration::from_secs(3), runtime.run()).await {
        Ok(result) => result?,
        Err(_) => panic!("runtime did not finish within 3 seconds"),
    };

    assert_eq!(core.state(), WorkflowState::Completed);
    let tasks_run = executed.lock().unwrap().clone();
    assert_eq!(tasks_run.first().map(String::as_str), Some("A"));
    assert_eq!(tasks_run.last().map(String::as_str), Some("D"));
    assert_eq!(tasks_run.len(), 4);

    Ok(())
}

#[tokio::test]
async fn scripted_failure_under_abort_cancels_siblings() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let mut cancelled = None;
    let options = OrchestratorOptions::default().failure_policy(FailurePolicy::Abort);
    let runtime = runtime_for(&diamond(), options, |tx| {
        let fake = FakeExecutor::new(tx, executed.clone()).with_script(|inv| match inv.id.as_str() {
            "B" => TaskOutcome::Failed("disk full".into()),
            "C" => TaskOutcome::Success(TaskResult::new(json!("c"))),
            _ => TaskOutcome::Success(TaskResult::empty()),
        });
        cancelled = Some(fake.cancelled());
        fake
    });

    let core = timeout(Duration::from_secs(3), runtime.run()).await??;

    assert_eq!(core.state(), WorkflowState::Failed);
    let view = core.view();
    assert_eq!(view.status("B"), Some(TaskStatus::Failed));
    assert_eq!(view.status("D"), Some(TaskStatus::Failed));
    assert!(!executed.lock().unwrap().contains(&"D".to_string()));

    // B and C are dispatched together; C's completion arrives after B's
    // failure aborted the workflow, so C was cancelled and then discarded.
    let cancelled = cancelled.unwrap();
    assert_eq!(cancelled.lock().unwrap().as_slice(), ["C".to_string()]);
    assert_eq!(view.status("C"), Some(TaskStatus::Failed));

    Ok(())
}

#[tokio::test]
async fn chain_dispatches_one_task_at_a_time() -> TestResult {
    init_tracing();

    let executed = Arc::new(Mutex::new(Vec::new()));
    let def = chain_definition("chain", "t", &["a", "b", "c", "d"]);
    let runtime = runtime_for(&def, OrchestratorOptions::default(), |tx| {
        FakeExecutor::new(tx, executed.clone())
    });

    let core = timeout(Duration::from_secs(3), runtime.run()).await??;

    assert_eq!(core.state(), WorkflowState::Completed);
    assert_eq!(executed.lock().unwrap().as_slice(), ["a", "b", "c", "d"]);
    Ok(())
}
