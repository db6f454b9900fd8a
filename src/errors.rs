// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::graph::MutationError;

#[derive(Error, Debug)]
pub enum DynadagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Invalid constraint on task '{task}': {detail}")]
    InvalidConstraint { task: String, detail: String },

    #[error("Workflow already registered at version {0}")]
    AlreadyRegistered(u64),

    #[error("Unknown graph version {requested} (latest is {latest})")]
    UnknownVersion { requested: u64, latest: u64 },

    #[error("Mutation rejected: {0}")]
    Mutation(#[from] MutationError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;

/// Defaults to [`DynadagError`]; layers with their own error type name it
/// explicitly, e.g. `Result<u64, MutationError>`.
pub type Result<T, E = DynadagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_version(raw: &str) -> Result<u64, MutationError> {
        raw.parse()
            .map_err(|_| MutationError::inconsistency(format!("bad version '{raw}'")))
    }

    fn lift(raw: &str) -> Result<u64> {
        Ok(parse_version(raw)?)
    }

    #[test]
    fn layer_errors_share_the_crate_alias() {
        assert_eq!(lift("3").unwrap(), 3);
        assert!(matches!(
            lift("x").unwrap_err(),
            DynadagError::Mutation(MutationError::Inconsistency { .. })
        ));
    }
}
