// src/snapshot/dot.rs

//! Graphviz DOT rendering.
//!
//! Committed nodes and edges are solid. Provisional ones are dashed gray
//! and labelled `(TBD)`. Remaining map slots are collapsed into a single
//! `<owner>_N` node.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use crate::snapshot::{ProvisionalRole, Snapshot};
use crate::types::{EdgeKind, TaskStatus};

fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\\\""))
}

fn status_color(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "white",
        TaskStatus::Ready => "lightyellow",
        TaskStatus::Running => "lightblue",
        TaskStatus::Succeeded => "palegreen",
        TaskStatus::Failed => "lightpink",
    }
}

pub fn render(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph {} {{", quote(&snapshot.workflow_id));
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box, style=filled];");

    for node in &snapshot.nodes {
        let label = format!("{}\\n{} ({})", node.id, node.task_type, node.status);
        let _ = writeln!(
            out,
            "  {} [label={}, fillcolor={}];",
            quote(&node.id),
            quote(&label),
            status_color(node.status)
        );
    }
    for edge in &snapshot.edges {
        let style = match edge.kind {
            EdgeKind::Data => "solid",
            EdgeKind::Control => "bold",
        };
        let _ = writeln!(
            out,
            "  {} -> {} [style={style}];",
            quote(&edge.from),
            quote(&edge.to)
        );
    }

    // Map slots of one owner collapse into `<owner>_N`.
    let mut slots: BTreeMap<&str, (usize, Option<&str>)> = BTreeMap::new();
    let mut slot_keys: BTreeMap<&str, String> = BTreeMap::new();
    for p in &snapshot.provisional.nodes {
        if let ProvisionalRole::MapChild { .. } = p.role {
            let entry = slots.entry(p.owner.as_str()).or_insert((0, p.task_type.as_deref()));
            entry.0 += 1;
            slot_keys.insert(p.key.as_str(), format!("{}_N", p.owner));
        }
    }
    for (owner, (count, task_type)) in &slots {
        let label = format!("{owner}_N\\n{} x{count} (TBD)", task_type.unwrap_or("?"));
        let _ = writeln!(
            out,
            "  {} [label={}, style=\"dashed\", color=gray, fontcolor=gray, fillcolor=white];",
            quote(&format!("{owner}_N")),
            quote(&label)
        );
    }

    for p in &snapshot.provisional.nodes {
        if matches!(p.role, ProvisionalRole::MapChild { .. }) {
            continue;
        }
        let label = match &p.task_type {
            Some(t) => format!("{}\\n{t} (TBD)", p.key),
            None => format!("{} (TBD)", p.key),
        };
        let _ = writeln!(
            out,
            "  {} [label={}, style=\"dashed\", color=gray, fontcolor=gray, fillcolor=white];",
            quote(&p.key),
            quote(&label)
        );
    }

    let mut drawn: BTreeSet<(String, String)> = BTreeSet::new();
    for e in &snapshot.provisional.edges {
        let from = slot_keys.get(e.from.as_str()).cloned().unwrap_or_else(|| e.from.clone());
        let to = slot_keys.get(e.to.as_str()).cloned().unwrap_or_else(|| e.to.clone());
        if drawn.insert((from.clone(), to.clone())) {
            let _ = writeln!(
                out,
                "  {} -> {} [style=dashed, color=gray];",
                quote(&from),
                quote(&to)
            );
        }
    }

    for u in &snapshot.provisional.undetermined {
        let key = format!("{}_undetermined", u.owner);
        let _ = writeln!(
            out,
            "  {} [label=\"undetermined successor(s)\", shape=plaintext, style=\"\", fontcolor=gray];",
            quote(&key)
        );
        let _ = writeln!(out, "  {} -> {} [style=dotted, color=gray];", quote(&u.owner), quote(&key));
    }

    let _ = writeln!(out, "}}");
    out
}
