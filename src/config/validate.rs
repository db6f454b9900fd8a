// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::{DynadagError, Result};
use crate::promise::validate_declared;

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = DynadagError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_workflow(&raw)?;
        Ok(WorkflowFile::new_unchecked(raw))
    }
}

fn validate_raw_workflow(cfg: &RawWorkflowFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_global_config(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_constraints(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(DynadagError::ConfigError(
            "workflow must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawWorkflowFile) -> Result<()> {
    if cfg.config.max_concurrency == 0 {
        return Err(DynadagError::ConfigError(
            "[config].max_concurrency must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.config.max_cycle_rejections == 0 {
        return Err(DynadagError::ConfigError(
            "[config].max_cycle_rejections must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.workflow.id.trim().is_empty() {
        return Err(DynadagError::ConfigError(
            "[workflow].id cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawWorkflowFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.task_type.trim().is_empty() {
            return Err(DynadagError::ConfigError(format!(
                "task '{name}' has an empty `type`"
            )));
        }
        for (field, deps) in [("after", &task.after), ("wait_for", &task.wait_for)] {
            for dep in deps {
                if !cfg.task.contains_key(dep) {
                    return Err(DynadagError::ConfigError(format!(
                        "task '{name}' has unknown dependency '{dep}' in `{field}`"
                    )));
                }
                if dep == name {
                    return Err(DynadagError::ConfigError(format!(
                        "task '{name}' cannot depend on itself in `{field}`"
                    )));
                }
            }
        }
    }
    Ok(())
}

fn validate_constraints(cfg: &RawWorkflowFile) -> Result<()> {
    validate_declared("<workflow>", &cfg.workflow.constraints)?;
    for (id, slot) in &cfg.slot {
        validate_declared(id, &slot.constraints)?;
    }
    for (id, task) in &cfg.task {
        validate_declared(id, &task.constraints)?;
    }
    Ok(())
}

fn validate_dag(cfg: &RawWorkflowFile) -> Result<()> {
    // Edge direction: dep -> task, for both data and control dependencies.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter().chain(task.wait_for.iter()) {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DynadagError::DagCycle(format!(
            "cycle detected in task graph involving task '{}'",
            cycle.node_id()
        ))),
    }
}
