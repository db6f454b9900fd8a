// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::exec::ExecutorBackend;
use crate::graph::GraphView;
use crate::sched::TaskInvocation;

use super::core::CoreRuntime;
use super::{CoreCommand, CoreEvent, CoreStep, ProposalReply, RuntimeEvent};

/// Drives the scheduler in response to `RuntimeEvent`s, and delegates task
/// execution to an `ExecutorBackend`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// runtime semantics. Since only this loop touches the core, every commit is
/// serialized through it. After each step the latest graph view is published
/// on a watch channel for snapshot readers.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    executor: E,
    views: watch::Sender<Arc<GraphView>>,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<RuntimeEvent>,
        executor: E,
        views: watch::Sender<Arc<GraphView>>,
    ) -> Self {
        Self {
            core,
            event_rx,
            executor,
            views,
        }
    }

    /// Main event loop.
    ///
    /// - Starts the workflow.
    /// - Consumes `RuntimeEvent`s from `event_rx` and feeds them into the core.
    /// - Executes the commands returned by the core.
    /// - Returns the core once the workflow reached a terminal state.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!(workflow = %self.core.view().workflow_id(), "dynadag runtime started");

        let step = self.core.start();
        let mut keep_running = self.apply(step, None).await?;

        while keep_running {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    warn!("runtime event channel closed before the workflow finished");
                    let step = self.core.step(CoreEvent::ShutdownRequested {
                        reason: "event channel closed".into(),
                    });
                    self.apply(step, None).await?;
                    break;
                }
            };

            debug!(?event, "runtime received event");

            let (event, reply) = event.into_core();
            let step = self.core.step(event);
            keep_running = self.apply(step, reply).await?;
        }

        info!(
            state = ?self.core.state(),
            version = self.core.view().version(),
            "runtime exiting"
        );
        Ok(self.core)
    }

    /// Publish the new view, answer the proposer and run the commands.
    async fn apply(
        &mut self,
        step: CoreStep,
        reply: Option<ProposalReply>,
    ) -> Result<bool> {
        self.views.send_replace(self.core.view());

        if let (Some(reply), Some(result)) = (reply, step.proposal) {
            if reply.send(result).is_err() {
                debug!("proposer went away before receiving its answer");
            }
        }

        for command in step.commands {
            self.execute_command(command).await?;
        }
        Ok(step.keep_running)
    }

    /// Execute a single command from the core.
    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::CancelTasks(tasks) => {
                debug!(?tasks, "cancelling in-flight tasks");
                self.executor.cancel_tasks(tasks).await?;
            }
            CoreCommand::RequestExit => {
                // keep_running is already false; nothing else to do here.
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    async fn spawn_ready(&mut self, tasks: Vec<TaskInvocation>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        debug!(?ids, "spawning ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
