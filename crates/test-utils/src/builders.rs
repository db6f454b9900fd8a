#![allow(dead_code)]

use std::collections::BTreeMap;

use serde_json::Value;
use dynadag::config::model::{ConfigSection, SlotSection, TaskConfig, WorkflowSection};
use dynadag::config::{RawWorkflowFile, WorkflowFile};
use dynadag::promise::{Constraint, DeclaredConstraint};
use dynadag::types::{FailurePolicy, PropagationPolicy, TaskTag};

/// Builder for `WorkflowFile` to simplify test setup.
pub struct WorkflowFileBuilder {
    raw: RawWorkflowFile,
}

impl WorkflowFileBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            raw: RawWorkflowFile {
                config: ConfigSection::default(),
                workflow: WorkflowSection {
                    id: id.to_string(),
                    constraints: Vec::new(),
                },
                slot: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.raw.task.insert(name.to_string(), task);
        self
    }

    pub fn with_global(mut self, constraint: DeclaredConstraint) -> Self {
        self.raw.workflow.constraints.push(constraint);
        self
    }

    pub fn with_slot(mut self, id: &str, constraint: DeclaredConstraint) -> Self {
        self.raw
            .slot
            .entry(id.to_string())
            .or_insert_with(SlotSection::default)
            .constraints
            .push(constraint);
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.raw.config.max_concurrency = n;
        self
    }

    pub fn propagation(mut self, policy: PropagationPolicy) -> Self {
        self.raw.config.constraint_propagation = policy;
        self
    }

    pub fn on_task_failure(mut self, policy: FailurePolicy) -> Self {
        self.raw.config.on_task_failure = policy;
        self
    }

    pub fn raw(self) -> RawWorkflowFile {
        self.raw
    }

    pub fn build(self) -> WorkflowFile {
        WorkflowFile::try_from(self.raw).expect("Failed to build valid workflow from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(task_type: &str) -> Self {
        Self {
            task: TaskConfig {
                task_type: task_type.to_string(),
                tag: TaskTag::default(),
                after: vec![],
                wait_for: vec![],
                inputs: Value::Null,
                tolerate_failure: false,
                metadata: BTreeMap::new(),
                constraints: vec![],
            },
        }
    }

    pub fn tag(mut self, tag: TaskTag) -> Self {
        self.task.tag = tag;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn wait_for(mut self, dep: &str) -> Self {
        self.task.wait_for.push(dep.to_string());
        self
    }

    pub fn inputs(mut self, inputs: Value) -> Self {
        self.task.inputs = inputs;
        self
    }

    pub fn tolerate_failure(mut self, val: bool) -> Self {
        self.task.tolerate_failure = val;
        self
    }

    pub fn constraint(mut self, constraint: Constraint) -> Self {
        self.task.constraints.push(DeclaredConstraint {
            constraint,
            propagate: None,
        });
        self
    }

    pub fn declare(mut self, declared: DeclaredConstraint) -> Self {
        self.task.constraints.push(declared);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
