// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of a raw mpsc sender.
//! This makes it easy to swap in a fake executor in tests while keeping the
//! production executor implementation in [`executor_loop`](super::executor_loop).
//!
//! - `RealExecutorBackend` is the default implementation. It wraps the
//!   executor loop and forwards invocations and cancellations over an mpsc
//!   channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which tasks were scheduled and directly emits `TaskCompleted` events.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::engine::RuntimeEvent;
use crate::errors::{Error, Result};
use crate::exec::executor_loop::{spawn_executor, ExecutorCommand};
use crate::exec::TaskRunner;
use crate::sched::TaskInvocation;
use crate::types::TaskId;

/// Trait abstracting how dispatched tasks are executed.
pub trait ExecutorBackend: Send {
    /// Dispatch the given tasks for execution.
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskInvocation>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Best-effort cancellation of in-flight tasks. Implementations must not
    /// report a completion for a task after cancelling it.
    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Real executor backend used in production.
///
/// The runtime calls `spawn_ready_tasks`, which forwards the invocations to
/// the background executor loop via an mpsc channel.
pub struct RealExecutorBackend {
    tx: mpsc::Sender<ExecutorCommand>,
}

impl RealExecutorBackend {
    /// Create a new real executor backend, wiring `runner` to the given
    /// runtime event sender.
    ///
    /// This spawns the background executor loop immediately.
    pub fn new(runner: Arc<dyn TaskRunner>, runtime_tx: mpsc::Sender<RuntimeEvent>) -> Self {
        let tx = spawn_executor(runner, runtime_tx);
        Self { tx }
    }

    fn send_all(
        &self,
        commands: Vec<ExecutorCommand>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>> {
        // Clone the sender so the future doesn't borrow `self` across `await`.
        let tx = self.tx.clone();

        Box::pin(async move {
            for command in commands {
                tx.send(command).await.map_err(Error::from)?;
            }
            Ok(())
        })
    }
}

impl ExecutorBackend for RealExecutorBackend {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<TaskInvocation>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send_all(tasks.into_iter().map(ExecutorCommand::Run).collect())
    }

    fn cancel_tasks(
        &mut self,
        tasks: Vec<TaskId>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        self.send_all(tasks.into_iter().map(ExecutorCommand::Cancel).collect())
    }
}
