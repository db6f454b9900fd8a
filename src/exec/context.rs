// src/exec/context.rs

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::engine::RuntimeEvent;
use crate::graph::{EdgeSpec, Mutation, MutationError, NodeSpec};
use crate::types::TaskId;

/// Handle given to a running task for growing the graph before it finishes.
#[derive(Debug, Clone)]
pub struct TaskContext {
    task: TaskId,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
}

impl TaskContext {
    pub fn new(task: impl Into<TaskId>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        Self {
            task: task.into(),
            runtime_tx,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task
    }

    /// Propose a mutation and wait for it to be committed or rejected.
    ///
    /// A rejection also fails the task; whatever it returns afterwards is
    /// discarded. A workflow that already stopped answers `Frozen`.
    pub async fn propose(
        &self,
        nodes: Vec<NodeSpec>,
        edges: Vec<EdgeSpec>,
    ) -> Result<u64, MutationError> {
        let (reply, answer) = oneshot::channel();
        let event = RuntimeEvent::MutationProposed {
            task: self.task.clone(),
            mutation: Mutation::new(self.task.clone(), nodes, edges),
            reply,
        };
        if self.runtime_tx.send(event).await.is_err() {
            debug!(task = %self.task, "runtime gone; proposal dropped");
            return Err(MutationError::Frozen);
        }
        answer.await.unwrap_or(Err(MutationError::Frozen))
    }

    /// Spawn a single node with no extra edges.
    pub async fn spawn(&self, node: NodeSpec) -> Result<u64, MutationError> {
        self.propose(vec![node], Vec::new()).await
    }
}
