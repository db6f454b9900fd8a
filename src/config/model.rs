// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::engine::OrchestratorOptions;
use crate::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};
use crate::promise::{DeclaredConstraint, RegistrationConstraints};
use crate::types::{FailurePolicy, PropagationPolicy, TaskTag};

/// Top-level workflow file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// max_concurrency = 2
///
/// [workflow]
/// id = "etl"
///
/// [task.M]
/// type = "split"
/// after = ["A"]
/// constraints = [{ kind = "max_fanout", max = 4 }]
/// ```
///
/// All sections except `[task.<id>]` are optional.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub workflow: WorkflowSection,

    /// Constraints attached to task ids, applied whenever a task with that
    /// id is registered or spawned.
    #[serde(default)]
    pub slot: BTreeMap<String, SlotSection>,

    /// Statically known tasks, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[config]` section: runtime options.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// `"inherit"` (default) or `"isolate"`.
    #[serde(default)]
    pub constraint_propagation: PropagationPolicy,

    /// `"contain"` (default) or `"abort"`.
    #[serde(default)]
    pub on_task_failure: FailurePolicy,

    #[serde(default = "default_max_cycle_rejections")]
    pub max_cycle_rejections: usize,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_cycle_rejections() -> usize {
    1
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            constraint_propagation: PropagationPolicy::default(),
            on_task_failure: FailurePolicy::default(),
            max_cycle_rejections: default_max_cycle_rejections(),
        }
    }
}

/// `[workflow]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowSection {
    #[serde(default = "default_workflow_id")]
    pub id: String,

    /// Global constraints applying to every task.
    #[serde(default)]
    pub constraints: Vec<DeclaredConstraint>,
}

fn default_workflow_id() -> String {
    "workflow".to_string()
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            id: default_workflow_id(),
            constraints: Vec::new(),
        }
    }
}

/// `[slot.<id>]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlotSection {
    #[serde(default)]
    pub constraints: Vec<DeclaredConstraint>,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Runner dispatch key.
    #[serde(rename = "type")]
    pub task_type: String,

    /// Informational label (`static`, `map`, `branch`, `dynamic`).
    #[serde(default)]
    pub tag: TaskTag,

    /// Data dependencies: this task receives the outputs of these tasks.
    #[serde(default)]
    pub after: Vec<String>,

    /// Control dependencies: this task only waits for these tasks.
    #[serde(default)]
    pub wait_for: Vec<String>,

    #[serde(default)]
    pub inputs: Value,

    #[serde(default)]
    pub tolerate_failure: bool,

    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    #[serde(default)]
    pub constraints: Vec<DeclaredConstraint>,
}

/// A validated workflow file.
///
/// Obtained through `WorkflowFile::try_from(raw)`, which checks references,
/// constraint well-formedness and acyclicity.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    config: ConfigSection,
    workflow: WorkflowSection,
    slot: BTreeMap<String, SlotSection>,
    task: BTreeMap<String, TaskConfig>,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(raw: RawWorkflowFile) -> Self {
        Self {
            config: raw.config,
            workflow: raw.workflow,
            slot: raw.slot,
            task: raw.task,
        }
    }

    pub fn config(&self) -> &ConfigSection {
        &self.config
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow.id
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }

    pub fn options(&self) -> OrchestratorOptions {
        OrchestratorOptions::default()
            .max_concurrency(self.config.max_concurrency)
            .propagation(self.config.constraint_propagation)
            .failure_policy(self.config.on_task_failure)
            .max_cycle_rejections(self.config.max_cycle_rejections)
    }

    /// The registration-time graph described by the file.
    pub fn definition(&self) -> WorkflowDefinition {
        let mut definition = WorkflowDefinition::new(self.workflow.id.clone()).constraints(
            RegistrationConstraints {
                global: self.workflow.constraints.clone(),
                slots: self
                    .slot
                    .iter()
                    .map(|(id, s)| (id.clone(), s.constraints.clone()))
                    .collect(),
            },
        );

        for (id, tc) in &self.task {
            let mut node = NodeSpec::new(id.clone(), tc.task_type.clone())
                .tag(tc.tag)
                .inputs(tc.inputs.clone())
                .tolerate_failure(tc.tolerate_failure);
            node.constraints = tc.constraints.clone();
            node.metadata = tc.metadata.clone();
            definition = definition.node(node);

            for dep in &tc.after {
                definition = definition.edge(EdgeSpec::data(dep.clone(), id.clone()));
            }
            for dep in &tc.wait_for {
                definition = definition.edge(EdgeSpec::control(dep.clone(), id.clone()));
            }
        }

        definition
    }
}
