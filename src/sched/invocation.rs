// src/sched/invocation.rs

use std::collections::BTreeMap;

use serde_json::Value;

use crate::graph::GraphView;
use crate::types::{EdgeKind, TaskId, TaskTag};

/// A task handed to the runner, with everything it needs to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInvocation {
    pub id: TaskId,
    pub task_type: String,
    pub tag: TaskTag,
    pub inputs: Value,
    /// Outputs of data predecessors, keyed by predecessor id. Tolerated
    /// failures show up as `Value::Null`.
    pub upstream: BTreeMap<TaskId, Value>,
    pub parent: Option<TaskId>,
    /// Graph version the task was dispatched at.
    pub version: u64,
}

impl TaskInvocation {
    pub(crate) fn from_view(view: &GraphView, id: &str) -> Option<Self> {
        let node = view.node(id)?;
        let upstream = view
            .incoming(id)
            .filter(|e| e.kind == EdgeKind::Data)
            .filter_map(|e| {
                let pred = view.node(&e.from)?;
                Some((pred.id.clone(), pred.output.clone().unwrap_or(Value::Null)))
            })
            .collect();

        Some(Self {
            id: node.id.clone(),
            task_type: node.task_type.clone(),
            tag: node.tag,
            inputs: node.inputs.clone(),
            upstream,
            parent: node.parent.clone(),
            version: view.version(),
        })
    }
}
