// src/engine/report.rs

use std::sync::Arc;

use serde_json::Value;

use crate::errors::Result;
use crate::graph::{GraphView, TaskStatusReport};
use crate::history::{HistoryEntry, HistoryRecorder};
use crate::snapshot::Snapshot;
use crate::types::{TerminationCause, WorkflowState};

/// Final record of a workflow run: the frozen graph and its history.
#[derive(Debug, Clone)]
pub struct WorkflowReport {
    final_view: Arc<GraphView>,
    history: HistoryRecorder,
}

impl WorkflowReport {
    pub(crate) fn new(final_view: Arc<GraphView>, history: HistoryRecorder) -> Self {
        Self {
            final_view,
            history,
        }
    }

    pub fn state(&self) -> WorkflowState {
        self.final_view.state()
    }

    pub fn termination(&self) -> Option<&TerminationCause> {
        self.final_view.termination()
    }

    pub fn final_view(&self) -> &Arc<GraphView> {
        &self.final_view
    }

    /// The canonical history. Empty only if the run ended abnormally before
    /// the history was frozen.
    pub fn history(&self) -> &[HistoryEntry] {
        self.history.final_history().unwrap_or_default()
    }

    pub fn recorder(&self) -> &HistoryRecorder {
        &self.history
    }

    /// Rebuild the graph as it was at `version`.
    pub fn replay(&self, version: u64) -> Result<GraphView> {
        self.history.replay(version)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_view(&self.final_view)
    }

    pub fn snapshot_at(&self, version: u64) -> Result<Snapshot> {
        Ok(Snapshot::from_view(&self.replay(version)?))
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatusReport> {
        self.final_view.status_report(id)
    }

    pub fn output(&self, id: &str) -> Option<&Value> {
        self.final_view.node(id)?.output.as_ref()
    }
}
