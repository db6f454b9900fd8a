// src/promise/tally.rs

use serde::{Deserialize, Serialize};

use crate::types::TaskId;

/// Running tally of the mutations attributed to a task.
///
/// Cumulative constraints (`MaxFanout`, `ExactlyOneOf`, `AllOf`) are checked
/// against the tally plus the proposed mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseRecord {
    /// Ids of the nodes this task has spawned, in commit order.
    pub spawned: Vec<TaskId>,
    /// Number of explicitly requested edges committed for this task.
    pub edges_created: usize,
    /// Number of mutations committed for this task.
    pub mutations: usize,
}

impl PromiseRecord {
    pub fn nodes_spawned(&self) -> usize {
        self.spawned.len()
    }

    pub fn has_spawned(&self, id: &str) -> bool {
        self.spawned.iter().any(|s| s == id)
    }

    pub(crate) fn record(&mut self, nodes: impl IntoIterator<Item = TaskId>, edges: usize) {
        self.spawned.extend(nodes);
        self.edges_created += edges;
        self.mutations += 1;
    }
}
