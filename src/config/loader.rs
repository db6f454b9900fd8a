// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::errors::Result;

/// Load a workflow file from a given path and return the raw `RawWorkflowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Parse workflow TOML from a string.
pub fn parse_str(contents: &str) -> Result<RawWorkflowFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a workflow file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks for:
///   - unknown `after` / `wait_for` references,
///   - malformed constraint declarations,
///   - cycles among the static tasks,
///   - basic `[config]` sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    WorkflowFile::try_from(raw)
}

/// Default workflow file: `Dynadag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Dynadag.toml")
}
