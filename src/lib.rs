// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod history;
pub mod logging;
pub mod promise;
pub mod sched;
pub mod snapshot;
pub mod types;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::{CliArgs, OutputFormat};
use crate::config::loader::load_and_validate;
use crate::graph::GraphStore;
use crate::snapshot::Snapshot;

pub use crate::engine::{Orchestrator, OrchestratorOptions, WorkflowReport};
pub use crate::exec::{RunnerRegistry, TaskContext, TaskResult, TaskRunner};
pub use crate::graph::{EdgeSpec, NodeSpec, WorkflowDefinition};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the workflow file, registers it into a fresh graph
/// store (which applies constraint resolution) and prints the initial
/// snapshot, provisional regions included. Executing a workflow needs task
/// runners, which are supplied by embedding the library through
/// [`Orchestrator`].
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let file = load_and_validate(&config_path)?;

    let mut options = file.options();
    if let Some(policy) = args.propagation {
        options = options.propagation(policy);
    }

    let definition = file.definition();
    info!(
        workflow = %definition.id,
        tasks = definition.nodes.len(),
        edges = definition.edges.len(),
        "workflow loaded"
    );

    let store = GraphStore::from_definition(&definition, options.propagation)?;
    let snapshot = Snapshot::from_view(store.view());

    let rendered = match args.format {
        OutputFormat::Json => snapshot.to_json()?,
        OutputFormat::Dot => snapshot.to_dot(),
        OutputFormat::Summary => snapshot.summary(),
    };
    println!("{rendered}");

    debug!(version = snapshot.version, "snapshot rendered");
    Ok(())
}
