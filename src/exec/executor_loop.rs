// src/exec/executor_loop.rs

//! Main executor loop that manages running tasks.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::engine::RuntimeEvent;
use crate::exec::task_runner::run_task;
use crate::exec::TaskRunner;
use crate::sched::TaskInvocation;
use crate::types::TaskId;

/// Instruction for the executor loop.
#[derive(Debug)]
pub enum ExecutorCommand {
    Run(TaskInvocation),
    Cancel(TaskId),
}

/// Internal handle for a currently-running task.
///
/// - `cancel` is used by the executor to ask the task to stop.
/// - `handle` is the Tokio task driving the runner future.
struct ActiveTask {
    cancel: Option<oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each invocation runs in its own Tokio task. The scheduler never dispatches
/// a task twice, so a `Run` for a task that is still active is ignored.
pub fn spawn_executor(
    runner: Arc<dyn TaskRunner>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> mpsc::Sender<ExecutorCommand> {
    let (tx, mut rx) = mpsc::channel::<ExecutorCommand>(32);

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<TaskId, ActiveTask> = HashMap::new();

        while let Some(command) = rx.recv().await {
            active.retain(|_, t| !t.handle.is_finished());
            match command {
                ExecutorCommand::Run(invocation) => {
                    handle_run(invocation, &runner, &mut active, &runtime_tx);
                }
                ExecutorCommand::Cancel(task) => cancel_task(&task, &mut active),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn handle_run(
    invocation: TaskInvocation,
    runner: &Arc<dyn TaskRunner>,
    active: &mut HashMap<TaskId, ActiveTask>,
    runtime_tx: &mpsc::Sender<RuntimeEvent>,
) {
    let id = invocation.id.clone();
    if active.contains_key(&id) {
        debug!(task = %id, "task already running; ignoring duplicate dispatch");
        return;
    }

    let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
    let runner = Arc::clone(runner);
    let rt_tx = runtime_tx.clone();
    let spawn_id = id.clone();

    let handle = tokio::spawn(async move {
        run_task(invocation, runner, rt_tx, cancel_rx).await;
        debug!(task = %spawn_id, "task runner future finished");
    });

    active.insert(
        id,
        ActiveTask {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

fn cancel_task(task: &str, active: &mut HashMap<TaskId, ActiveTask>) {
    let Some(mut existing) = active.remove(task) else {
        debug!(task = %task, "cancel for task that is not active; ignoring");
        return;
    };

    info!(task = %task, "cancelling running task");
    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(()).is_err() {
            debug!(task = %task, "task already finished while cancelling");
        }
    }
}
