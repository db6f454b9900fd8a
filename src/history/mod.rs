// src/history/mod.rs

//! Append-only execution history.
//!
//! Every committed mutation, task status transition and workflow state
//! transition is appended as a [`HistoryEvent`] tagged with the graph version
//! it produced. The live [`GraphView`](crate::graph::GraphView) is built by
//! applying exactly these events, so [`HistoryRecorder::replay`] reconstructs
//! the same view the snapshot exporter showed at any version.

pub mod recorder;

pub use recorder::{HistoryEntry, HistoryEvent, HistoryRecorder};
