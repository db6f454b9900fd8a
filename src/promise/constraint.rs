// src/promise/constraint.rs

//! Constraint vocabulary and per-task constraint sets.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DynadagError, Result};
use crate::types::{PropagationPolicy, TaskId};

/// A successor a branch or map task promises it may spawn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SuccessorTemplate {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: String,
}

impl SuccessorTemplate {
    pub fn new(id: impl Into<TaskId>, task_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task_type: task_type.into(),
        }
    }
}

/// A structural rule a task declares about how it may mutate the graph.
///
/// Edge constraints apply to the edges a task requests explicitly; the
/// control edge committed from a task to each node it spawns is governed by
/// the node constraints instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constraint {
    NoNewNodes,
    NoNewEdges,
    /// Both endpoints of every requested edge must be in `nodes`.
    EdgesOnlyAmong { nodes: BTreeSet<TaskId> },
    /// Every spawned node must have one of these task types.
    NodesOnlyOfType { types: BTreeSet<String> },
    /// Every spawned node must have one of these ids.
    NodesOnlyAmong { nodes: BTreeSet<TaskId> },
    /// Declared on a node: only these tasks may spawn it.
    SpawnableOnlyBy { creators: BTreeSet<TaskId> },
    NoEdgesFrom { node: TaskId },
    NoEdgesTo { node: TaskId },
    /// Bounds the total number of children a task may spawn.
    MaxFanout { max: usize },
    /// Branching: exactly one successor, chosen from `templates`.
    ExactlyOneOf { templates: Vec<SuccessorTemplate> },
    /// Map: one `child_type` child per element of `inputs`, then exactly one
    /// `reduce` successor with a data edge from every child.
    AllOf {
        inputs: Vec<Value>,
        child_type: String,
        reduce: SuccessorTemplate,
    },
}

impl Constraint {
    /// Stable name used in logs and violation messages.
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::NoNewNodes => "NoNewNodes",
            Constraint::NoNewEdges => "NoNewEdges",
            Constraint::EdgesOnlyAmong { .. } => "EdgesOnlyAmong",
            Constraint::NodesOnlyOfType { .. } => "NodesOnlyOfType",
            Constraint::NodesOnlyAmong { .. } => "NodesOnlyAmong",
            Constraint::SpawnableOnlyBy { .. } => "SpawnableOnlyBy",
            Constraint::NoEdgesFrom { .. } => "NoEdgesFrom",
            Constraint::NoEdgesTo { .. } => "NoEdgesTo",
            Constraint::MaxFanout { .. } => "MaxFanout",
            Constraint::ExactlyOneOf { .. } => "ExactlyOneOf",
            Constraint::AllOf { .. } => "AllOf",
        }
    }

    /// Obligations require something to happen, not just forbid it.
    pub fn is_obligation(&self) -> bool {
        matches!(self, Constraint::ExactlyOneOf { .. } | Constraint::AllOf { .. })
    }

    /// Whether the constraint propagates to spawned children when the
    /// declaration does not say so explicitly.
    pub fn propagates_by_default(&self, policy: PropagationPolicy) -> bool {
        match policy {
            PropagationPolicy::Isolate => false,
            PropagationPolicy::Inherit => {
                !self.is_obligation() && !matches!(self, Constraint::SpawnableOnlyBy { .. })
            }
        }
    }

    /// Key used when a child's own declaration overrides an inherited one.
    pub fn override_key(&self) -> String {
        match self {
            Constraint::NoEdgesFrom { node } => format!("NoEdgesFrom:{node}"),
            Constraint::NoEdgesTo { node } => format!("NoEdgesTo:{node}"),
            other => other.name().to_string(),
        }
    }
}

/// A constraint as written in a task declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredConstraint {
    #[serde(flatten)]
    pub constraint: Constraint,
    /// Explicit propagation to spawned children; `None` follows the
    /// workflow's propagation policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub propagate: Option<bool>,
}

impl DeclaredConstraint {
    pub fn propagating(constraint: Constraint) -> Self {
        Self {
            constraint,
            propagate: Some(true),
        }
    }

    pub fn local(constraint: Constraint) -> Self {
        Self {
            constraint,
            propagate: Some(false),
        }
    }
}

impl From<Constraint> for DeclaredConstraint {
    fn from(constraint: Constraint) -> Self {
        Self {
            constraint,
            propagate: None,
        }
    }
}

/// Constraints declared before execution starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationConstraints {
    /// Apply to every task in the workflow, including spawned ones.
    #[serde(default)]
    pub global: Vec<DeclaredConstraint>,
    /// Apply to the task with the given id whenever it is registered or spawned.
    #[serde(default)]
    pub slots: BTreeMap<TaskId, Vec<DeclaredConstraint>>,
}

impl RegistrationConstraints {
    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.slots.is_empty()
    }
}

/// Where a task's effective constraint came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ConstraintOrigin {
    Declared,
    Slot,
    Global,
    Inherited { from: TaskId },
}

/// One entry of a task's effective constraint set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConstraint {
    pub constraint: Constraint,
    pub origin: ConstraintOrigin,
    pub propagate: bool,
}

/// The effective constraint set of a committed task.
///
/// Fixed when the task is committed, so it cannot change once the task is
/// `Running`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConstraintSet {
    entries: Vec<EffectiveConstraint>,
}

impl ConstraintSet {
    pub fn new(entries: Vec<EffectiveConstraint>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[EffectiveConstraint] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.entries.iter().map(|e| &e.constraint)
    }

    /// Entries that flow down to spawned children.
    pub fn propagated(&self) -> impl Iterator<Item = &EffectiveConstraint> {
        self.entries.iter().filter(|e| e.propagate)
    }

    pub fn forbids_new_nodes(&self) -> bool {
        self.iter().any(|c| matches!(c, Constraint::NoNewNodes))
    }

    pub fn forbids_new_edges(&self) -> bool {
        self.iter().any(|c| matches!(c, Constraint::NoNewEdges))
    }

    /// Every `EdgesOnlyAmong` set declared; an edge must satisfy all of them.
    pub fn edge_bounds(&self) -> impl Iterator<Item = &BTreeSet<TaskId>> {
        self.iter().filter_map(|c| match c {
            Constraint::EdgesOnlyAmong { nodes } => Some(nodes),
            _ => None,
        })
    }

    /// Whether an edge into `node` is still permitted by the edge constraints.
    pub fn may_add_edge_into(&self, node: &str) -> bool {
        if self.forbids_new_edges() {
            return false;
        }
        let forbidden = self
            .iter()
            .any(|c| matches!(c, Constraint::NoEdgesTo { node: n } if n == node));
        !forbidden && self.edge_bounds().all(|set| set.contains(node))
    }

    /// Smallest declared fan-out bound, if any.
    pub fn max_fanout(&self) -> Option<usize> {
        self.iter()
            .filter_map(|c| match c {
                Constraint::MaxFanout { max } => Some(*max),
                _ => None,
            })
            .min()
    }

    pub fn allowed_types(&self) -> Option<BTreeSet<String>> {
        intersect(self.iter().filter_map(|c| match c {
            Constraint::NodesOnlyOfType { types } => Some(types),
            _ => None,
        }))
    }

    pub fn allowed_nodes(&self) -> Option<BTreeSet<TaskId>> {
        intersect(self.iter().filter_map(|c| match c {
            Constraint::NodesOnlyAmong { nodes } => Some(nodes),
            _ => None,
        }))
    }

    pub fn spawners(&self) -> Option<BTreeSet<TaskId>> {
        intersect(self.iter().filter_map(|c| match c {
            Constraint::SpawnableOnlyBy { creators } => Some(creators),
            _ => None,
        }))
    }

    pub fn branch_templates(&self) -> Option<&[SuccessorTemplate]> {
        self.iter().find_map(|c| match c {
            Constraint::ExactlyOneOf { templates } => Some(templates.as_slice()),
            _ => None,
        })
    }

    /// `(inputs, child_type, reduce)` of the map promise, if declared.
    pub fn map_promise(&self) -> Option<(&[Value], &str, &SuccessorTemplate)> {
        self.iter().find_map(|c| match c {
            Constraint::AllOf {
                inputs,
                child_type,
                reduce,
            } => Some((inputs.as_slice(), child_type.as_str(), reduce)),
            _ => None,
        })
    }
}

fn intersect<'a, T>(mut sets: impl Iterator<Item = &'a BTreeSet<T>>) -> Option<BTreeSet<T>>
where
    T: Ord + Clone + 'a,
{
    let first = sets.next()?.clone();
    Some(sets.fold(first, |acc, s| acc.intersection(s).cloned().collect()))
}

/// Check a task's declared constraints for well-formedness.
pub fn validate_declared(task: &str, declared: &[DeclaredConstraint]) -> Result<()> {
    let invalid = |detail: String| DynadagError::InvalidConstraint {
        task: task.to_string(),
        detail,
    };

    let mut branch = 0usize;
    let mut map = 0usize;
    let mut no_new_nodes = false;

    for d in declared {
        match &d.constraint {
            Constraint::NoNewNodes => no_new_nodes = true,
            Constraint::NoNewEdges | Constraint::NoEdgesFrom { .. } | Constraint::NoEdgesTo { .. } => {}
            Constraint::MaxFanout { .. } => {}
            Constraint::EdgesOnlyAmong { nodes } | Constraint::NodesOnlyAmong { nodes } => {
                if nodes.is_empty() {
                    return Err(invalid(format!(
                        "{} requires a non-empty node set",
                        d.constraint.name()
                    )));
                }
            }
            Constraint::NodesOnlyOfType { types } => {
                if types.is_empty() {
                    return Err(invalid("NodesOnlyOfType requires a non-empty type set".into()));
                }
            }
            Constraint::SpawnableOnlyBy { creators } => {
                if creators.is_empty() {
                    return Err(invalid("SpawnableOnlyBy requires a non-empty creator set".into()));
                }
            }
            Constraint::ExactlyOneOf { templates } => {
                branch += 1;
                if templates.is_empty() {
                    return Err(invalid("ExactlyOneOf requires at least one template".into()));
                }
                let mut seen = HashSet::new();
                for t in templates {
                    if t.id == task {
                        return Err(invalid(format!("ExactlyOneOf template '{}' is the task itself", t.id)));
                    }
                    if !seen.insert(t.id.as_str()) {
                        return Err(invalid(format!("ExactlyOneOf template '{}' listed twice", t.id)));
                    }
                }
            }
            Constraint::AllOf {
                child_type, reduce, ..
            } => {
                map += 1;
                if child_type.trim().is_empty() {
                    return Err(invalid("AllOf requires a child_type".into()));
                }
                if reduce.id == task {
                    return Err(invalid("AllOf reduce successor cannot be the task itself".into()));
                }
            }
        }
    }

    if branch > 1 || map > 1 {
        return Err(invalid("at most one ExactlyOneOf and one AllOf may be declared".into()));
    }
    if branch > 0 && map > 0 {
        return Err(invalid("ExactlyOneOf and AllOf cannot both be declared".into()));
    }
    if no_new_nodes && (branch > 0 || map > 0) {
        return Err(invalid(
            "NoNewNodes contradicts a declared ExactlyOneOf/AllOf obligation".into(),
        ));
    }

    Ok(())
}
