// src/exec/runner.rs

//! The contract between the orchestrator and external task code.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::anyhow;
use serde_json::Value;

use crate::exec::TaskContext;
use crate::graph::{EdgeSpec, NodeSpec};
use crate::sched::TaskInvocation;

/// What a runner reports when a task finishes successfully.
///
/// `spawn` and `edges` form one final mutation, proposed on the task's
/// behalf before its obligations are checked.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskResult {
    pub output: Value,
    pub spawn: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl TaskResult {
    pub fn new(output: Value) -> Self {
        Self {
            output,
            ..Self::default()
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn spawn(mut self, node: NodeSpec) -> Self {
        self.spawn.push(node);
        self
    }

    pub fn edge(mut self, edge: EdgeSpec) -> Self {
        self.edges.push(edge);
        self
    }
}

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<TaskResult>> + Send + 'static>>;

/// Executes tasks. Any `Err` is recorded as a task execution failure.
pub trait TaskRunner: Send + Sync {
    fn run(&self, invocation: TaskInvocation, ctx: TaskContext) -> TaskFuture;
}

type Handler = Arc<dyn Fn(TaskInvocation, TaskContext) -> TaskFuture + Send + Sync>;

/// A [`TaskRunner`] that dispatches on the task type.
#[derive(Clone, Default)]
pub struct RunnerRegistry {
    handlers: HashMap<String, Handler>,
}

impl fmt::Debug for RunnerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("RunnerRegistry")
            .field("types", &types)
            .finish()
    }
}

impl RunnerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(mut self, task_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(TaskInvocation, TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<TaskResult>> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |inv, ctx| -> TaskFuture { Box::pin(handler(inv, ctx)) });
        self.handlers.insert(task_type.into(), handler);
        self
    }

    pub fn handles(&self, task_type: &str) -> bool {
        self.handlers.contains_key(task_type)
    }
}

impl TaskRunner for RunnerRegistry {
    fn run(&self, invocation: TaskInvocation, ctx: TaskContext) -> TaskFuture {
        match self.handlers.get(&invocation.task_type) {
            Some(handler) => handler(invocation, ctx),
            None => {
                let task_type = invocation.task_type;
                Box::pin(async move { Err(anyhow!("no runner registered for task type '{task_type}'")) })
            }
        }
    }
}
