use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use dynadag::engine::{RuntimeEvent, TaskOutcome};
use dynadag::errors::Result;
use dynadag::exec::{ExecutorBackend, TaskContext, TaskFuture, TaskResult, TaskRunner};
use dynadag::sched::TaskInvocation;
use dynadag::types::TaskId;

type Script = Arc<dyn Fn(&TaskInvocation) -> TaskOutcome + Send + Sync>;

/// A fake executor that:
/// - records which tasks were dispatched and which were cancelled
/// - reports a `TaskCompleted` for each dispatched task, with the outcome
///   produced by its script (success with a `null` output by default).
///
/// Completions are sent from a spawned task so the runtime loop never waits
/// on its own channel.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<RuntimeEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    cancelled: Arc<Mutex<Vec<String>>>,
    script: Script,
}

impl FakeExecutor {
    pub fn new(runtime_tx: mpsc::Sender<RuntimeEvent>, executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            runtime_tx,
            executed,
            cancelled: Arc::new(Mutex::new(Vec::new())),
            script: Arc::new(|_| TaskOutcome::Success(TaskResult::empty())),
        }
    }

    pub fn with_script<F>(mut self, script: F) -> Self
    where
        F: Fn(&TaskInvocation) -> TaskOutcome + Send + Sync + 'static,
    {
        self.script = Arc::new(script);
        self
    }

    pub fn cancelled(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.cancelled)
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskInvocation>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let script = Arc::clone(&self.script);

        Box::pin(async move {
            let mut completions = Vec::new();
            for t in tasks {
                executed.lock().unwrap().push(t.id.clone());
                completions.push((t.id.clone(), script(&t)));
            }
            tokio::spawn(async move {
                for (task, outcome) in completions {
                    if tx.send(RuntimeEvent::TaskCompleted { task, outcome }).await.is_err() {
                        break;
                    }
                }
            });
            Ok(())
        })
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let cancelled = Arc::clone(&self.cancelled);
        Box::pin(async move {
            cancelled.lock().unwrap().extend(tasks);
            Ok(())
        })
    }
}

/// Wraps a runner and records the id of every task it was asked to run.
pub struct RecordingRunner<R> {
    inner: R,
    executed: Arc<Mutex<Vec<String>>>,
}

impl<R: TaskRunner> RecordingRunner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.executed)
    }
}

impl<R: TaskRunner> TaskRunner for RecordingRunner<R> {
    fn run(&self, invocation: TaskInvocation, ctx: TaskContext) -> TaskFuture {
        self.executed.lock().unwrap().push(invocation.id.clone());
        self.inner.run(invocation, ctx)
    }
}
