// src/snapshot/projection.rs

//! Bounded future shape of non-terminal tasks.
//!
//! Only what a task's constraints guarantee is projected. Anything a later
//! commit could contradict is left out; a task that may grow without bound
//! gets an [`Undetermined`] marker instead of guessed nodes.

use serde::Serialize;
use serde_json::Value;

use crate::graph::GraphView;
use crate::promise::PromiseRecord;
use crate::sched::ReadOnlyStateManager;
use crate::types::{EdgeKind, TaskId, TaskStatus};

/// Why a provisional node is shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ProvisionalRole {
    /// One of the owner's `ExactlyOneOf` templates; exactly one will commit.
    BranchCandidate { alternatives: usize },
    /// A map child not yet spawned; its id is chosen by the owner.
    MapChild { index: usize, input: Value },
    /// The reduce successor of a map.
    Reduce,
    /// Allowed by the owner's `NodesOnlyAmong` set, may never be spawned.
    Optional,
}

/// A node that may appear later.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionalNode {
    /// Rendering key: the id when known, a placeholder otherwise.
    pub key: String,
    pub id: Option<TaskId>,
    #[serde(rename = "type")]
    pub task_type: Option<String>,
    pub owner: TaskId,
    #[serde(flatten)]
    pub role: ProvisionalRole,
}

/// An edge that will be committed if its endpoints are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionalEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
    pub owner: TaskId,
}

/// Nodes an owner may still connect with new edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRegion {
    pub owner: TaskId,
    pub nodes: Vec<TaskId>,
    /// Pending members that wait for the owner before becoming ready.
    pub held: Vec<TaskId>,
}

/// Marker for a task whose future successors cannot be bounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Undetermined {
    pub owner: TaskId,
    /// Remaining children allowed by `MaxFanout`, if declared.
    pub remaining: Option<usize>,
    /// Allowed child types, if declared.
    pub types: Option<Vec<String>>,
}

/// Everything shown as provisional at one version.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisionalRegion {
    pub nodes: Vec<ProvisionalNode>,
    pub edges: Vec<ProvisionalEdge>,
    pub edge_regions: Vec<EdgeRegion>,
    pub undetermined: Vec<Undetermined>,
}

impl ProvisionalRegion {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.edges.is_empty()
            && self.edge_regions.is_empty()
            && self.undetermined.is_empty()
    }

    /// Placeholder key of a map child slot.
    pub fn slot_key(owner: &str, index: usize) -> String {
        format!("{owner}[{index}]")
    }
}

/// Project the bounded future of every non-terminal task in `view`.
pub fn project(view: &GraphView) -> ProvisionalRegion {
    let mut region = ProvisionalRegion::default();
    let empty = PromiseRecord::default();
    let ro = ReadOnlyStateManager::new(view);

    for node in view.open_nodes() {
        let constraints = &node.constraints;
        let tally = view.tally(&node.id).unwrap_or(&empty);
        let can_spawn = !constraints.forbids_new_nodes()
            && constraints
                .max_fanout()
                .is_none_or(|max| tally.nodes_spawned() < max);

        if let Some(templates) = constraints.branch_templates() {
            if tally.nodes_spawned() == 0 && can_spawn {
                for t in templates.iter().filter(|t| !view.contains(&t.id)) {
                    region.nodes.push(ProvisionalNode {
                        key: t.id.clone(),
                        id: Some(t.id.clone()),
                        task_type: Some(t.task_type.clone()),
                        owner: node.id.clone(),
                        role: ProvisionalRole::BranchCandidate {
                            alternatives: templates.len(),
                        },
                    });
                    region.edges.push(ProvisionalEdge {
                        from: node.id.clone(),
                        to: t.id.clone(),
                        kind: EdgeKind::Control,
                        owner: node.id.clone(),
                    });
                }
            }
        } else if let Some((inputs, child_type, reduce)) = constraints.map_promise() {
            if !tally.has_spawned(&reduce.id) {
                let mut unclaimed: Vec<(usize, &Value)> = inputs.iter().enumerate().collect();
                for child in tally.spawned.iter().filter_map(|id| view.node(id)) {
                    if let Some(pos) = unclaimed.iter().position(|(_, v)| **v == child.inputs) {
                        unclaimed.remove(pos);
                    }
                }

                for (index, input) in unclaimed {
                    let key = ProvisionalRegion::slot_key(&node.id, index);
                    region.nodes.push(ProvisionalNode {
                        key: key.clone(),
                        id: None,
                        task_type: Some(child_type.to_string()),
                        owner: node.id.clone(),
                        role: ProvisionalRole::MapChild {
                            index,
                            input: input.clone(),
                        },
                    });
                    region.edges.push(ProvisionalEdge {
                        from: node.id.clone(),
                        to: key.clone(),
                        kind: EdgeKind::Control,
                        owner: node.id.clone(),
                    });
                    region.edges.push(ProvisionalEdge {
                        from: key,
                        to: reduce.id.clone(),
                        kind: EdgeKind::Data,
                        owner: node.id.clone(),
                    });
                }
                for child in &tally.spawned {
                    region.edges.push(ProvisionalEdge {
                        from: child.clone(),
                        to: reduce.id.clone(),
                        kind: EdgeKind::Data,
                        owner: node.id.clone(),
                    });
                }

                region.nodes.push(ProvisionalNode {
                    key: reduce.id.clone(),
                    id: Some(reduce.id.clone()),
                    task_type: Some(reduce.task_type.clone()),
                    owner: node.id.clone(),
                    role: ProvisionalRole::Reduce,
                });
                region.edges.push(ProvisionalEdge {
                    from: node.id.clone(),
                    to: reduce.id.clone(),
                    kind: EdgeKind::Control,
                    owner: node.id.clone(),
                });
            }
        } else if let Some(allowed) = constraints.allowed_nodes() {
            if can_spawn {
                for id in allowed.iter().filter(|id| !view.contains(id)) {
                    region.nodes.push(ProvisionalNode {
                        key: id.clone(),
                        id: Some(id.clone()),
                        task_type: None,
                        owner: node.id.clone(),
                        role: ProvisionalRole::Optional,
                    });
                }
            }
        } else if can_spawn {
            region.undetermined.push(Undetermined {
                owner: node.id.clone(),
                remaining: constraints
                    .max_fanout()
                    .map(|max| max.saturating_sub(tally.nodes_spawned())),
                types: constraints
                    .allowed_types()
                    .map(|types| types.into_iter().collect()),
            });
        }

        if !constraints.forbids_new_edges() {
            let mut bounds = constraints.edge_bounds();
            if let Some(first) = bounds.next() {
                let nodes: Vec<TaskId> = first
                    .iter()
                    .filter(|id| constraints.may_add_edge_into(id))
                    .cloned()
                    .collect();
                let held = nodes
                    .iter()
                    .filter(|id| view.status(id) == Some(TaskStatus::Pending))
                    .filter(|id| ro.held_by(id).is_some())
                    .cloned()
                    .collect();
                region.edge_regions.push(EdgeRegion {
                    owner: node.id.clone(),
                    nodes,
                    held,
                });
            }
        }
    }

    region
}
