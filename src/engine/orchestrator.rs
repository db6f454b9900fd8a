// src/engine/orchestrator.rs

//! One orchestrator instance per workflow: create on registration, run to a
//! terminal state, freeze.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::engine::{CoreRuntime, OrchestratorOptions, Runtime, RuntimeEvent, WorkflowReport};
use crate::errors::Result;
use crate::exec::{ExecutorBackend, RealExecutorBackend, TaskRunner};
use crate::graph::{GraphStore, GraphView, TaskStatusReport, WorkflowDefinition};
use crate::sched::Scheduler;
use crate::snapshot::Snapshot;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Registers a workflow and runs it with a task runner.
pub struct Orchestrator {
    core: CoreRuntime,
    runner: Arc<dyn TaskRunner>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    views: watch::Sender<Arc<GraphView>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Register `definition` and prepare to run it.
    pub fn new(
        definition: &WorkflowDefinition,
        options: OrchestratorOptions,
        runner: Arc<dyn TaskRunner>,
    ) -> Result<Self> {
        let store = GraphStore::from_definition(definition, options.propagation)?;
        let (views, _) = watch::channel(store.latest());
        let core = CoreRuntime::new(Scheduler::new(store, options));
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            core,
            runner,
            event_tx,
            event_rx,
            views,
        })
    }

    /// Reader for the live graph; usable while [`Orchestrator::run`] is in
    /// progress and after it returns.
    pub fn snapshots(&self) -> SnapshotReader {
        SnapshotReader {
            rx: self.views.subscribe(),
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.event_tx.clone(),
        }
    }

    /// Sender for runtime events, for executors that report completions
    /// themselves.
    pub fn event_sender(&self) -> mpsc::Sender<RuntimeEvent> {
        self.event_tx.clone()
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatusReport> {
        self.views.borrow().status_report(id)
    }

    /// Run the workflow to a terminal state with the real executor.
    pub async fn run(self) -> Result<WorkflowReport> {
        let executor = RealExecutorBackend::new(Arc::clone(&self.runner), self.event_tx.clone());
        self.run_with_executor(executor).await
    }

    /// Run the workflow with a custom executor backend.
    pub async fn run_with_executor<E: ExecutorBackend>(self, executor: E) -> Result<WorkflowReport> {
        let Orchestrator {
            core,
            event_tx,
            event_rx,
            views,
            ..
        } = self;
        // Only executors, task contexts and cancel handles keep the channel open.
        drop(event_tx);

        let runtime = Runtime::new(core, event_rx, executor, views);
        let core = runtime.run().await?;
        let report = WorkflowReport::new(core.view(), core.into_history());
        info!(
            state = ?report.state(),
            version = report.final_view().version(),
            "workflow run complete"
        );
        Ok(report)
    }
}

/// Non-blocking access to the latest committed graph view.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    rx: watch::Receiver<Arc<GraphView>>,
}

impl SnapshotReader {
    pub fn latest(&self) -> Arc<GraphView> {
        Arc::clone(&self.rx.borrow())
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_view(&self.latest())
    }

    /// Wait until a newer view is published. Returns `None` once the
    /// orchestrator is gone.
    pub async fn changed(&mut self) -> Option<Arc<GraphView>> {
        self.rx.changed().await.ok()?;
        Some(Arc::clone(&self.rx.borrow_and_update()))
    }
}

/// Requests a shutdown of a running workflow.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: mpsc::Sender<RuntimeEvent>,
}

impl CancelHandle {
    /// Terminate the workflow with `TerminationCause::Cancelled`.
    ///
    /// Returns `false` if the workflow already stopped.
    pub async fn cancel(&self, reason: impl Into<String>) -> bool {
        self.tx
            .send(RuntimeEvent::ShutdownRequested {
                reason: reason.into(),
            })
            .await
            .is_ok()
    }
}
