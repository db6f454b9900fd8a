pub mod builders;
pub mod fake_executor;

use std::collections::BTreeSet;
use std::sync::Once;

use dynadag::graph::{EdgeSpec, GraphStore, NodeSpec, WorkflowDefinition};
use dynadag::types::{PropagationPolicy, TaskId, TaskStatus};
use tracing_subscriber::{fmt, EnvFilter};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// Logs are captured per test and only shown for failures (or with
/// `-- --nocapture`). `DYNADAG_LOG` takes directives like the binary does,
/// e.g. `DYNADAG_LOG=dynadag::promise=debug cargo test`; `RUST_LOG` is the
/// fallback.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter = std::env::var("DYNADAG_LOG")
            .ok()
            .and_then(|raw| EnvFilter::try_new(raw).ok())
            .or_else(|| EnvFilter::try_from_default_env().ok())
            .unwrap_or_else(|| EnvFilter::new("warn,dynadag=info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Task ids as the sets `EdgesOnlyAmong`, `NodesOnlyAmong` and friends take.
pub fn id_set(ids: &[&str]) -> BTreeSet<TaskId> {
    ids.iter().map(|s| s.to_string()).collect()
}

/// `ids[0] -> ids[1] -> ...` linked by data edges, every task of `task_type`.
pub fn chain_definition(workflow: &str, task_type: &str, ids: &[&str]) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new(workflow);
    for id in ids {
        def = def.node(NodeSpec::new(*id, task_type));
    }
    for pair in ids.windows(2) {
        def = def.edge(EdgeSpec::data(pair[0], pair[1]));
    }
    def
}

/// Register `definition` and move `running` through Ready to Running, so the
/// store accepts mutations from those tasks without a scheduler.
pub fn running_store(
    definition: &WorkflowDefinition,
    propagation: PropagationPolicy,
    running: &[&str],
) -> GraphStore {
    let mut store =
        GraphStore::from_definition(definition, propagation).expect("definition should register");
    for id in running {
        store
            .transition(id, TaskStatus::Ready, None, None)
            .expect("task should become ready");
        store
            .transition(id, TaskStatus::Running, None, None)
            .expect("task should start");
    }
    store
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_links_consecutive_tasks() {
        let def = chain_definition("wf", "t", &["a", "b", "c"]);
        let store = running_store(&def, PropagationPolicy::Inherit, &["a"]);
        let view = store.view();
        assert_eq!(view.node_count(), 3);
        assert!(view.has_edge("a", "b") && view.has_edge("b", "c"));
        assert_eq!(view.status("a"), Some(TaskStatus::Running));
        assert_eq!(view.status("b"), Some(TaskStatus::Pending));
    }
}
