// src/exec/task_runner.rs

//! Individual task runner.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::engine::{RuntimeEvent, TaskOutcome};
use crate::exec::{TaskContext, TaskRunner};
use crate::sched::TaskInvocation;

/// Run a single task and emit its `TaskCompleted` event.
///
/// - Runner errors and panics are reported as `TaskOutcome::Failed`.
/// - If the cancel channel fires, the runner future is aborted and **no**
///   `TaskCompleted` event is sent. The scheduler has already failed the
///   task and would discard the result anyway.
pub async fn run_task(
    invocation: TaskInvocation,
    runner: Arc<dyn TaskRunner>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    let id = invocation.id.clone();
    info!(task = %id, task_type = %invocation.task_type, "starting task");

    let ctx = TaskContext::new(id.clone(), runtime_tx.clone());
    let mut handle = tokio::spawn(runner.run(invocation, ctx));

    let outcome = tokio::select! {
        joined = &mut handle => match joined {
            Ok(Ok(result)) => TaskOutcome::Success(result),
            Ok(Err(err)) => {
                warn!(task = %id, error = %err, "task returned an error");
                TaskOutcome::Failed(format!("{err:#}"))
            }
            Err(join_err) => {
                error!(task = %id, error = %join_err, "task runner panicked");
                TaskOutcome::Failed(format!("runner panicked: {join_err}"))
            }
        },

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(()) => info!(task = %id, "cancellation requested; aborting runner"),
                Err(_) => debug!(task = %id, "cancel channel closed without explicit cancellation"),
            }
            handle.abort();
            return;
        }
    };

    if runtime_tx
        .send(RuntimeEvent::TaskCompleted {
            task: id.clone(),
            outcome,
        })
        .await
        .is_err()
    {
        debug!(task = %id, "runtime gone before completion could be reported");
    }
}
