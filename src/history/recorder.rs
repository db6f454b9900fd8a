// src/history/recorder.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{DynadagError, Result};
use crate::graph::{CommittedEdge, CommittedNode, EdgeSpec, GraphView, MutationError};
use crate::promise::RegistrationConstraints;
use crate::types::{FailureReason, MutationSummary, TaskId, TaskStatus, TerminationCause, WorkflowState};

/// One logged change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HistoryEvent {
    Registered {
        workflow_id: String,
        nodes: Vec<CommittedNode>,
        edges: Vec<EdgeSpec>,
        constraints: RegistrationConstraints,
    },
    MutationCommitted {
        origin: TaskId,
        nodes: Vec<CommittedNode>,
        edges: Vec<CommittedEdge>,
    },
    /// Logged for the record only; the graph is unchanged.
    MutationRejected {
        mutation: MutationSummary,
        error: MutationError,
    },
    TaskStatusChanged {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<FailureReason>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
    WorkflowStateChanged {
        from: WorkflowState,
        to: WorkflowState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<TerminationCause>,
    },
}

impl HistoryEvent {
    /// Whether applying the event produces a new graph version.
    pub fn changes_graph(&self) -> bool {
        !matches!(self, HistoryEvent::MutationRejected { .. })
    }
}

/// A history event tagged with the graph version it produced (or, for
/// rejections, the version current when it was logged).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub version: u64,
    #[serde(flatten)]
    pub event: HistoryEvent,
}

/// Append-only, versioned log.
#[derive(Debug, Clone, Default)]
pub struct HistoryRecorder {
    entries: Vec<HistoryEntry>,
    frozen: bool,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event that produced (or was logged at) `version`.
    pub fn append(&mut self, version: u64, event: HistoryEvent) -> &HistoryEntry {
        let seq = self.entries.len() as u64;
        debug!(seq, version, changes_graph = event.changes_graph(), "history: append");
        self.entries.push(HistoryEntry { seq, version, event });
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest version recorded in the log (0 if nothing was recorded).
    pub fn latest_version(&self) -> u64 {
        self.entries.last().map(|e| e.version).unwrap_or(0)
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Mark the log as the canonical post-hoc record.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// The authoritative execution record, available once the workflow has
    /// reached a terminal state.
    pub fn final_history(&self) -> Option<&[HistoryEntry]> {
        self.frozen.then_some(self.entries.as_slice())
    }

    /// Rebuild the graph view as it was at `upto`.
    pub fn replay(&self, upto: u64) -> Result<GraphView> {
        let latest = self.latest_version();
        if upto > latest {
            return Err(DynadagError::UnknownVersion {
                requested: upto,
                latest,
            });
        }

        let mut view = GraphView::empty("");
        for entry in self.entries.iter().take_while(|e| e.version <= upto) {
            view.apply(&entry.event)?;
        }
        Ok(view)
    }
}
