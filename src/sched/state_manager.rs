// src/sched/state_manager.rs

//! Readiness and failure propagation over the committed graph.

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, info};

use crate::graph::{GraphStore, GraphView, MutationError, NodeRecord};
use crate::types::{EdgeKind, FailureReason, TaskId, TaskStatus};

/// What a `Pending` task is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Some predecessor has not resolved yet.
    Waiting,
    /// A non-terminal task may still add an edge into this one.
    Held { owner: TaskId },
    /// A predecessor failed and was not tolerated.
    UpstreamFailed { upstream: TaskId },
}

/// Read-only readiness queries against one graph version.
///
/// The petgraph projection of the view is built once here and reused by every
/// reachability check, so a full sweep does not rebuild it per task pair.
pub struct ReadOnlyStateManager<'a> {
    view: &'a GraphView,
    graph: DiGraphMap<&'a str, EdgeKind>,
}

impl<'a> ReadOnlyStateManager<'a> {
    pub fn new(view: &'a GraphView) -> Self {
        Self {
            view,
            graph: view.digraph(),
        }
    }

    pub fn upstream_failure(&self, id: &str) -> Option<TaskId> {
        self.view
            .incoming(id)
            .filter_map(|e| self.view.node(&e.from))
            .find(|pred| pred.blocks_dependents())
            .map(|pred| pred.id.clone())
    }

    pub fn deps_satisfied(&self, id: &str) -> bool {
        self.view
            .incoming(id)
            .filter_map(|e| self.view.node(&e.from))
            .all(|pred| pred.resolves_dependents())
    }

    /// The task whose `EdgesOnlyAmong` bound still allows an edge into `id`.
    ///
    /// Ancestors of `id` are skipped: they finish before `id` can run anyway.
    /// Between two `Pending` tasks that both bound edges, only the one with
    /// the smaller id holds the other, so holds never form a cycle.
    pub fn held_by(&self, id: &str) -> Option<TaskId> {
        let id_bounds_edges = self.view.node(id).is_some_and(bounds_edges);
        self.view
            .open_nodes()
            .filter(|owner| owner.id != id)
            .filter(|owner| bounds_edges(owner) && owner.constraints.may_add_edge_into(id))
            .filter(|owner| {
                owner.status != TaskStatus::Pending || !id_bounds_edges || owner.id.as_str() < id
            })
            .find(|owner| !self.reaches(id, &owner.id) && !self.reaches(&owner.id, id))
            .map(|owner| owner.id.clone())
    }

    /// Whether `to` is reachable from `from` through committed edges.
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        if !self.graph.contains_node(from) || !self.graph.contains_node(to) {
            return false;
        }
        has_path_connecting(&self.graph, from, to, None)
    }

    pub fn readiness(&self, id: &str) -> Readiness {
        if let Some(upstream) = self.upstream_failure(id) {
            return Readiness::UpstreamFailed { upstream };
        }
        if !self.deps_satisfied(id) {
            return Readiness::Waiting;
        }
        match self.held_by(id) {
            Some(owner) => Readiness::Held { owner },
            None => Readiness::Ready,
        }
    }
}

/// Whether `node` may still add edges, but only within `EdgesOnlyAmong` bounds.
fn bounds_edges(node: &NodeRecord) -> bool {
    !node.constraints.forbids_new_edges() && node.constraints.edge_bounds().next().is_some()
}

/// Applies readiness decisions to the store.
pub struct StateManager<'a> {
    store: &'a mut GraphStore,
}

impl<'a> StateManager<'a> {
    pub fn new(store: &'a mut GraphStore) -> Self {
        Self { store }
    }

    /// Move every `Pending` task whose fate is decided, until nothing changes.
    ///
    /// Returns `(newly_ready, newly_failed)`.
    pub fn sweep(&mut self) -> Result<(Vec<TaskId>, Vec<TaskId>), MutationError> {
        let mut ready = Vec::new();
        let mut failed = Vec::new();

        loop {
            let view = self.store.latest();
            let ro = ReadOnlyStateManager::new(&view);
            let decisions: Vec<(TaskId, Readiness)> = view
                .nodes()
                .filter(|n| n.status == TaskStatus::Pending)
                .map(|n| (n.id.clone(), ro.readiness(&n.id)))
                .filter(|(_, r)| matches!(r, Readiness::Ready | Readiness::UpstreamFailed { .. }))
                .collect();

            if decisions.is_empty() {
                break;
            }

            for (id, readiness) in decisions {
                match readiness {
                    Readiness::UpstreamFailed { upstream } => {
                        info!(task = %id, upstream = %upstream, "failing task: upstream failed");
                        self.store.transition(
                            &id,
                            TaskStatus::Failed,
                            Some(FailureReason::UpstreamFailed { upstream }),
                            None,
                        )?;
                        failed.push(id);
                    }
                    Readiness::Ready => {
                        debug!(task = %id, "dependencies satisfied; marking Ready");
                        self.store.transition(&id, TaskStatus::Ready, None, None)?;
                        ready.push(id);
                    }
                    Readiness::Waiting | Readiness::Held { .. } => {}
                }
            }
        }

        Ok((ready, failed))
    }

    /// Fail every non-terminal task with `Cancelled`.
    ///
    /// Returns the tasks that were `Running`, which the executor must stop,
    /// followed by everything else that was cancelled.
    pub fn cancel_open(&mut self) -> Result<(Vec<TaskId>, Vec<TaskId>), MutationError> {
        let view = self.store.latest();
        let mut running = Vec::new();
        let mut others = Vec::new();
        for node in view.open_nodes() {
            self.store.transition(
                &node.id,
                TaskStatus::Failed,
                Some(FailureReason::Cancelled),
                None,
            )?;
            if node.status == TaskStatus::Running {
                running.push(node.id.clone());
            } else {
                others.push(node.id.clone());
            }
        }
        Ok((running, others))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};
    use crate::promise::Constraint;
    use crate::types::PropagationPolicy;

    #[test]
    fn roots_become_ready_and_dependents_wait() {
        let def = WorkflowDefinition::new("wf")
            .node(NodeSpec::new("A", "T"))
            .node(NodeSpec::new("B", "T"))
            .edge(EdgeSpec::data("A", "B"));
        let mut store = GraphStore::from_definition(&def, PropagationPolicy::Inherit).unwrap();
        let (ready, failed) = StateManager::new(&mut store).sweep().unwrap();
        assert_eq!(ready, vec!["A".to_string()]);
        assert!(failed.is_empty());
        assert_eq!(store.view().status("B"), Some(TaskStatus::Pending));
    }

    #[test]
    fn failure_cascades_through_dependents() {
        let def = WorkflowDefinition::new("wf")
            .node(NodeSpec::new("A", "T"))
            .node(NodeSpec::new("B", "T"))
            .node(NodeSpec::new("C", "T"))
            .edge(EdgeSpec::data("A", "B"))
            .edge(EdgeSpec::control("B", "C"));
        let mut store = GraphStore::from_definition(&def, PropagationPolicy::Inherit).unwrap();
        StateManager::new(&mut store).sweep().unwrap();
        store.transition("A", TaskStatus::Running, None, None).unwrap();
        store
            .transition(
                "A",
                TaskStatus::Failed,
                Some(FailureReason::TaskExecution { message: "boom".into() }),
                None,
            )
            .unwrap();
        let (_, failed) = StateManager::new(&mut store).sweep().unwrap();
        assert_eq!(failed, vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn edge_bound_member_is_held_until_owner_finishes() {
        let def = WorkflowDefinition::new("wf")
            .node(NodeSpec::new("D", "T").constraint(Constraint::EdgesOnlyAmong {
                nodes: ["D".to_string(), "Z".to_string()].into(),
            }))
            .node(NodeSpec::new("Z", "T"));
        let store = GraphStore::from_definition(&def, PropagationPolicy::Inherit).unwrap();
        let view = store.latest();
        let ro = ReadOnlyStateManager::new(&view);
        assert_eq!(ro.readiness("D"), Readiness::Ready);
        assert_eq!(
            ro.readiness("Z"),
            Readiness::Held {
                owner: "D".to_string()
            }
        );
    }

    #[test]
    fn mutually_bounded_roots_do_not_hold_each_other() {
        let both: std::collections::BTreeSet<String> = ["P".to_string(), "Q".to_string()].into();
        let def = WorkflowDefinition::new("wf")
            .node(NodeSpec::new("P", "T").constraint(Constraint::EdgesOnlyAmong { nodes: both.clone() }))
            .node(NodeSpec::new("Q", "T").constraint(Constraint::EdgesOnlyAmong { nodes: both }));
        let mut store = GraphStore::from_definition(&def, PropagationPolicy::Inherit).unwrap();

        let view = store.latest();
        let ro = ReadOnlyStateManager::new(&view);
        assert_eq!(ro.readiness("P"), Readiness::Ready);
        assert_eq!(ro.readiness("Q"), Readiness::Held { owner: "P".to_string() });

        let (ready, _) = StateManager::new(&mut store).sweep().unwrap();
        assert_eq!(ready, vec!["P".to_string()]);

        store.transition("P", TaskStatus::Running, None, None).unwrap();
        store.transition("P", TaskStatus::Succeeded, None, None).unwrap();
        let (ready, _) = StateManager::new(&mut store).sweep().unwrap();
        assert_eq!(ready, vec!["Q".to_string()]);
    }
}
