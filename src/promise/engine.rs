// src/promise/engine.rs

//! Validation of proposed mutations against declared promises.

use std::collections::BTreeSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::graph::{
    ApprovedMutation, CommittedEdge, CommittedNode, EdgeSpec, GraphView, Mutation, MutationError,
    NodeRecord, NodeSpec,
};
use crate::promise::constraint::{
    validate_declared, Constraint, ConstraintOrigin, ConstraintSet, DeclaredConstraint,
    EffectiveConstraint, RegistrationConstraints,
};
use crate::promise::{PromiseRecord, Violation};
use crate::types::{PropagationPolicy, TaskId, TaskStatus};

/// Generic constraint evaluator.
///
/// Map and branch tasks are not special-cased: a task is held to whatever
/// `AllOf` / `ExactlyOneOf` promise it declared, whatever its tag says.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromiseEngine {
    propagation: PropagationPolicy,
}

impl PromiseEngine {
    pub fn new(propagation: PropagationPolicy) -> Self {
        Self { propagation }
    }

    pub fn propagation(&self) -> PropagationPolicy {
        self.propagation
    }

    /// Compute the effective constraint set of a node about to be committed.
    ///
    /// Order: own declarations, slot constraints, global constraints, then
    /// whatever the parent propagates that the node does not override.
    pub fn resolve_constraints(
        &self,
        registration: &RegistrationConstraints,
        parent: Option<&NodeRecord>,
        spec: &NodeSpec,
    ) -> ConstraintSet {
        let mut entries: Vec<EffectiveConstraint> = Vec::new();

        let mut push = |declared: &DeclaredConstraint, origin: ConstraintOrigin| {
            let propagate = declared
                .propagate
                .unwrap_or_else(|| declared.constraint.propagates_by_default(self.propagation));
            entries.push(EffectiveConstraint {
                constraint: declared.constraint.clone(),
                origin,
                propagate,
            });
        };

        for d in &spec.constraints {
            push(d, ConstraintOrigin::Declared);
        }
        if let Some(slot) = registration.slots.get(&spec.id) {
            for d in slot {
                push(d, ConstraintOrigin::Slot);
            }
        }
        for d in &registration.global {
            // Globals already apply to every task; they never need to be inherited.
            entries.push(EffectiveConstraint {
                constraint: d.constraint.clone(),
                origin: ConstraintOrigin::Global,
                propagate: false,
            });
        }

        if let Some(parent) = parent {
            let own_keys: BTreeSet<String> = entries
                .iter()
                .filter(|e| e.origin != ConstraintOrigin::Global)
                .map(|e| e.constraint.override_key())
                .collect();
            for inherited in parent.constraints.propagated() {
                if own_keys.contains(&inherited.constraint.override_key()) {
                    debug!(
                        task = %spec.id,
                        parent = %parent.id,
                        constraint = inherited.constraint.name(),
                        "inherited constraint overridden by own declaration"
                    );
                    continue;
                }
                entries.push(EffectiveConstraint {
                    constraint: inherited.constraint.clone(),
                    origin: ConstraintOrigin::Inherited {
                        from: parent.id.clone(),
                    },
                    propagate: true,
                });
            }
        }

        ConstraintSet::new(entries)
    }

    /// Validate a mutation proposed by its origin task.
    ///
    /// A single failing constraint rejects the whole mutation. On success
    /// the returned approval carries the resolved nodes and edges; the tally
    /// is only updated when the approval is committed.
    pub fn validate(
        &self,
        view: &GraphView,
        mutation: &Mutation,
    ) -> Result<ApprovedMutation, MutationError> {
        let origin = view.node(&mutation.origin).ok_or_else(|| {
            MutationError::inconsistency(format!(
                "mutation origin '{}' is not a committed task",
                mutation.origin
            ))
        })?;
        if origin.status != TaskStatus::Running {
            return Err(MutationError::NotRunning {
                task: origin.id.clone(),
            });
        }

        let empty = PromiseRecord::default();
        let tally = view.tally(&origin.id).unwrap_or(&empty);

        for node in &mutation.nodes {
            if let Err(e) = validate_declared(&node.id, &node.constraints) {
                return Err(Violation::MalformedConstraints {
                    task: origin.id.clone(),
                    node: node.id.clone(),
                    detail: e.to_string(),
                }
                .into());
            }
        }

        for constraint in origin.constraints.iter() {
            check_constraint(view, origin, tally, constraint, mutation).map_err(|v| {
                warn!(
                    task = %origin.id,
                    constraint = constraint.name(),
                    violation = %v,
                    "promise engine rejected mutation"
                );
                MutationError::Promise(v)
            })?;
        }

        let mut nodes = Vec::with_capacity(mutation.nodes.len());
        for spec in &mutation.nodes {
            let constraints = self.resolve_constraints(view.registration(), Some(origin), spec);
            if let Some(creators) = constraints.spawners() {
                if !creators.contains(&origin.id) {
                    return Err(Violation::SpawnerNotAllowed {
                        task: origin.id.clone(),
                        node: spec.id.clone(),
                    }
                    .into());
                }
            }
            nodes.push(CommittedNode {
                spec: spec.clone(),
                parent: Some(origin.id.clone()),
                constraints,
            });
        }

        let mut edges: Vec<CommittedEdge> = mutation
            .nodes
            .iter()
            .map(|n| CommittedEdge {
                edge: EdgeSpec::control(origin.id.clone(), n.id.clone()),
                implicit: true,
            })
            .collect();
        edges.extend(mutation.edges.iter().map(|e| CommittedEdge {
            edge: e.clone(),
            implicit: false,
        }));

        debug!(
            task = %origin.id,
            nodes = nodes.len(),
            edges = edges.len(),
            base_version = view.version(),
            "promise engine approved mutation"
        );

        Ok(ApprovedMutation::new(
            origin.id.clone(),
            nodes,
            edges,
            view.version(),
            mutation.summary(),
        ))
    }

    /// Check the obligations a task must have met by the time it succeeds.
    pub fn finalize(&self, view: &GraphView, task: &str) -> Result<(), Violation> {
        let Some(node) = view.node(task) else {
            return Ok(());
        };
        let empty = PromiseRecord::default();
        let tally = view.tally(task).unwrap_or(&empty);

        if node.constraints.branch_templates().is_some() && tally.nodes_spawned() == 0 {
            return Err(Violation::BranchNone {
                task: task.to_string(),
            });
        }

        if let Some((inputs, _, reduce)) = node.constraints.map_promise() {
            let reduce_spawned = tally.has_spawned(&reduce.id);
            let children = tally.nodes_spawned() - usize::from(reduce_spawned);
            if children != inputs.len() || !reduce_spawned {
                return Err(Violation::MapIncomplete {
                    task: task.to_string(),
                    children,
                    expected: inputs.len(),
                    reduce_spawned,
                });
            }
        }

        Ok(())
    }
}

fn check_constraint(
    view: &GraphView,
    origin: &NodeRecord,
    tally: &PromiseRecord,
    constraint: &Constraint,
    mutation: &Mutation,
) -> Result<(), Violation> {
    let task = || origin.id.clone();

    match constraint {
        Constraint::NoNewNodes => {
            if !mutation.nodes.is_empty() {
                return Err(Violation::NewNodes {
                    task: task(),
                    count: mutation.nodes.len(),
                });
            }
        }
        Constraint::NoNewEdges => {
            if !mutation.edges.is_empty() {
                return Err(Violation::NewEdges {
                    task: task(),
                    count: mutation.edges.len(),
                });
            }
        }
        Constraint::EdgesOnlyAmong { nodes } => {
            if let Some(e) = mutation
                .edges
                .iter()
                .find(|e| !nodes.contains(&e.from) || !nodes.contains(&e.to))
            {
                return Err(Violation::EdgeOutsideSet {
                    task: task(),
                    from: e.from.clone(),
                    to: e.to.clone(),
                });
            }
        }
        Constraint::NodesOnlyOfType { types } => {
            if let Some(n) = mutation.nodes.iter().find(|n| !types.contains(&n.task_type)) {
                return Err(Violation::NodeTypeNotAllowed {
                    task: task(),
                    node: n.id.clone(),
                    task_type: n.task_type.clone(),
                });
            }
        }
        Constraint::NodesOnlyAmong { nodes } => {
            if let Some(n) = mutation.nodes.iter().find(|n| !nodes.contains(&n.id)) {
                return Err(Violation::NodeNotAllowed {
                    task: task(),
                    node: n.id.clone(),
                });
            }
        }
        // Checked against the spawned node's own constraints.
        Constraint::SpawnableOnlyBy { .. } => {}
        Constraint::NoEdgesFrom { node } => {
            if let Some(e) = mutation.edges.iter().find(|e| &e.from == node) {
                return Err(Violation::EdgeFromForbidden {
                    task: task(),
                    from: e.from.clone(),
                    to: e.to.clone(),
                });
            }
        }
        Constraint::NoEdgesTo { node } => {
            if let Some(e) = mutation.edges.iter().find(|e| &e.to == node) {
                return Err(Violation::EdgeToForbidden {
                    task: task(),
                    from: e.from.clone(),
                    to: e.to.clone(),
                });
            }
        }
        Constraint::MaxFanout { max } => {
            let attempted = tally.nodes_spawned() + mutation.nodes.len();
            if attempted > *max {
                return Err(Violation::FanoutExceeded {
                    task: task(),
                    max: *max,
                    attempted,
                });
            }
        }
        Constraint::ExactlyOneOf { templates } => {
            if let Some(n) = mutation
                .nodes
                .iter()
                .find(|n| !templates.iter().any(|t| t.id == n.id && t.task_type == n.task_type))
            {
                return Err(Violation::NotABranchTemplate {
                    task: task(),
                    node: n.id.clone(),
                });
            }
            let count = tally.nodes_spawned() + mutation.nodes.len();
            if count > 1 {
                return Err(Violation::BranchMultiple { task: task(), count });
            }
        }
        Constraint::AllOf {
            inputs,
            child_type,
            reduce,
        } => check_map(view, origin, tally, inputs, child_type, &reduce.id, &reduce.task_type, mutation)?,
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn check_map(
    view: &GraphView,
    origin: &NodeRecord,
    tally: &PromiseRecord,
    inputs: &[Value],
    child_type: &str,
    reduce_id: &str,
    reduce_type: &str,
    mutation: &Mutation,
) -> Result<(), Violation> {
    let task = || origin.id.clone();
    let reduce_already = tally.has_spawned(reduce_id);

    // Children spawned by earlier mutations, and the input elements they claimed.
    let previous_children: Vec<TaskId> = tally
        .spawned
        .iter()
        .filter(|id| id.as_str() != reduce_id)
        .cloned()
        .collect();
    let mut unclaimed: Vec<&Value> = inputs.iter().collect();
    for child in &previous_children {
        if let Some(record) = view.node(child) {
            if let Some(pos) = unclaimed.iter().position(|v| **v == record.inputs) {
                unclaimed.remove(pos);
            }
        }
    }

    let mut new_children: Vec<&NodeSpec> = Vec::new();
    let mut reduce_spec: Option<&NodeSpec> = None;
    for n in &mutation.nodes {
        if n.id == reduce_id {
            if reduce_already || reduce_spec.is_some() || n.task_type != reduce_type {
                return Err(Violation::MapReduceInvalid {
                    task: task(),
                    node: n.id.clone(),
                });
            }
            reduce_spec = Some(n);
            continue;
        }
        if n.task_type != child_type {
            return Err(Violation::MapChildType {
                task: task(),
                node: n.id.clone(),
                expected: child_type.to_string(),
                found: n.task_type.clone(),
            });
        }
        if reduce_already {
            return Err(Violation::MapTooManyChildren {
                task: task(),
                expected: inputs.len(),
            });
        }
        new_children.push(n);
    }

    let total_children = previous_children.len() + new_children.len();
    if total_children > inputs.len() {
        return Err(Violation::MapTooManyChildren {
            task: task(),
            expected: inputs.len(),
        });
    }

    for child in &new_children {
        match unclaimed.iter().position(|v| **v == child.inputs) {
            Some(pos) => {
                unclaimed.remove(pos);
            }
            None => {
                return Err(Violation::MapInputUnmatched {
                    task: task(),
                    node: child.id.clone(),
                });
            }
        }
    }

    if let Some(reduce) = reduce_spec {
        if total_children != inputs.len() {
            return Err(Violation::MapReduceTooEarly {
                task: task(),
                spawned: total_children,
                expected: inputs.len(),
            });
        }
        let all_children = previous_children
            .iter()
            .map(String::as_str)
            .chain(new_children.iter().map(|c| c.id.as_str()));
        for child in all_children {
            let has_dependency = mutation.edges.iter().any(|e| {
                e.from == child && e.to == reduce.id && e.kind == crate::types::EdgeKind::Data
            });
            if !has_dependency {
                return Err(Violation::MapReduceMissingDependency {
                    task: task(),
                    reduce: reduce.id.clone(),
                    child: child.to_string(),
                });
            }
        }
    }

    Ok(())
}
