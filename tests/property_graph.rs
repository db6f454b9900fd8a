// tests/property_graph.rs

use std::collections::BTreeSet;

use petgraph::algo::toposort;
use proptest::prelude::*;

use dynadag::graph::{EdgeSpec, GraphView, Mutation, NodeSpec, WorkflowDefinition};
use dynadag::promise::{Constraint, SuccessorTemplate};
use dynadag::snapshot::Snapshot;
use dynadag::types::PropagationPolicy;
use dynadag_test_utils::running_store;

/// Static tasks `n0..nK`; `n0` is the root and task `i` only depends on
/// tasks `< i`, so registration always succeeds.
fn definition(num: usize, raw_deps: &[Vec<usize>], fanout: usize) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("prop").node(
        NodeSpec::new("n0", "t").constraint(Constraint::MaxFanout { max: fanout }),
    );
    for i in 1..num {
        def = def.node(NodeSpec::new(format!("n{i}"), "t"));
        let deps: BTreeSet<usize> = raw_deps[i].iter().map(|d| d % i).collect();
        for d in deps {
            def = def.edge(EdgeSpec::data(format!("n{d}"), format!("n{i}")));
        }
    }
    def
}

/// A batch of new nodes plus edges between arbitrary known or new ids.
fn mutation(round: usize, spawn: usize, edges: &[(usize, usize)], existing: usize) -> Mutation {
    let new_ids: Vec<String> = (0..spawn).map(|k| format!("x{round}_{k}")).collect();
    let pool: Vec<String> = (0..existing)
        .map(|i| format!("n{i}"))
        .chain(new_ids.iter().cloned())
        .collect();
    let edges = edges
        .iter()
        .map(|(a, b)| EdgeSpec::data(pool[a % pool.len()].clone(), pool[b % pool.len()].clone()))
        .collect();
    let nodes = new_ids.into_iter().map(|id| NodeSpec::new(id, "t")).collect();
    Mutation::new("n0", nodes, edges)
}

proptest! {
    #[test]
    fn graph_stays_acyclic_and_promises_hold(
        num in 1usize..8,
        raw_deps in proptest::collection::vec(proptest::collection::vec(0usize..8, 0..3), 8),
        fanout in 0usize..6,
        rounds in proptest::collection::vec(
            (0usize..3, proptest::collection::vec((0usize..16, 0usize..16), 0..4)),
            1..6,
        ),
    ) {
        let def = definition(num, &raw_deps, fanout);
        let mut store = running_store(&def, PropagationPolicy::Inherit, &["n0"]);

        for (round, (spawn, edges)) in rounds.iter().enumerate() {
            let before = store.latest();
            let m = mutation(round, *spawn, edges, num);

            match store.apply_mutation(&m) {
                Ok(version) => {
                    prop_assert_eq!(version, before.version() + 1);
                    for n in &m.nodes {
                        prop_assert!(store.view().contains(&n.id));
                    }
                }
                Err(_) => {
                    // Rejections leave the graph untouched.
                    prop_assert_eq!(store.view().version(), before.version());
                    prop_assert_eq!(store.view().node_count(), before.node_count());
                    prop_assert_eq!(store.view().edges().len(), before.edges().len());
                }
            }

            let view = store.latest();
            prop_assert!(toposort(&view.digraph(), None).is_ok());

            let children = view.nodes().filter(|n| n.parent.as_deref() == Some("n0")).count();
            prop_assert!(children <= fanout);
        }
    }
}

const SPAWN_IDS: [&str; 4] = ["X", "Y", "a", "b"];
const SPAWN_TYPES: [&str; 2] = ["t", "u"];

/// One constraint for the spawning root, chosen by `kind`.
fn root_constraint(kind: usize, fanout: usize) -> Option<Constraint> {
    let set = |ids: &[&str]| ids.iter().map(|s| s.to_string()).collect();
    match kind {
        0 => None,
        1 => Some(Constraint::NoNewNodes),
        2 => Some(Constraint::MaxFanout { max: fanout }),
        3 => Some(Constraint::NodesOnlyOfType { types: set(&["t"]) }),
        4 => Some(Constraint::NodesOnlyAmong { nodes: set(&["X", "a"]) }),
        _ => Some(Constraint::ExactlyOneOf {
            templates: vec![SuccessorTemplate::new("X", "t"), SuccessorTemplate::new("Y", "u")],
        }),
    }
}

/// Nothing committed between `before` and `after` contradicts what the
/// snapshot of `before` showed.
fn assert_not_contradicted(before: &GraphView, after: &GraphView) -> Result<(), TestCaseError> {
    for node in before.nodes() {
        let later = after.node(&node.id);
        prop_assert!(later.is_some(), "committed task {} disappeared", node.id);
        let later = later.unwrap();
        prop_assert_eq!(&later.task_type, &node.task_type);
        prop_assert_eq!(&later.parent, &node.parent);
    }
    for e in before.edges() {
        prop_assert!(after.has_edge(&e.from, &e.to), "edge {} -> {} disappeared", e.from, e.to);
    }

    let region = Snapshot::from_view(before).provisional;
    let new: Vec<_> = after.nodes().filter(|n| !before.contains(&n.id)).collect();
    for node in &new {
        let owner = node.parent.as_deref().unwrap_or_default();
        let shown = region.nodes.iter().any(|p| {
            p.owner == owner
                && match &p.id {
                    Some(id) => {
                        id == &node.id && p.task_type.as_ref().is_none_or(|t| t == &node.task_type)
                    }
                    None => p.task_type.as_ref() == Some(&node.task_type),
                }
        });
        let open = region.undetermined.iter().any(|u| {
            u.owner == owner
                && u.types.as_ref().is_none_or(|types| types.contains(&node.task_type))
                && u.remaining.is_none_or(|r| r >= new.len())
        });
        prop_assert!(
            shown || open,
            "{} ({}) committed at v{} was ruled out by the snapshot at v{}",
            node.id,
            node.task_type,
            after.version(),
            before.version()
        );
    }
    Ok(())
}

proptest! {
    #[test]
    fn snapshots_are_never_contradicted_by_later_commits(
        kind in 0usize..6,
        fanout in 0usize..4,
        rounds in proptest::collection::vec(
            proptest::collection::vec((0usize..4, 0usize..2), 0..3),
            1..5,
        ),
    ) {
        let mut root = NodeSpec::new("n0", "t");
        if let Some(c) = root_constraint(kind, fanout) {
            root = root.constraint(c);
        }
        let def = WorkflowDefinition::new("prop").node(root);
        let mut store = running_store(&def, PropagationPolicy::Isolate, &["n0"]);

        for spawns in &rounds {
            let nodes = spawns
                .iter()
                .map(|(id, ty)| NodeSpec::new(SPAWN_IDS[*id], SPAWN_TYPES[*ty]))
                .collect();
            // Rejections are expected; only commits matter here.
            let _ = store.apply_mutation(&Mutation::new("n0", nodes, Vec::new()));
        }

        let history = store.history();
        let latest = store.view().version();
        for v in 1..latest {
            let before = history.replay(v).unwrap();
            let after = history.replay(v + 1).unwrap();
            assert_not_contradicted(&before, &after)?;
        }
    }
}
