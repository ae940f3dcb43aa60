// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{RawModel, WorkflowModel};
use crate::errors::Result;

/// Load a workflow document from a given path and return the raw
/// `RawModel`.
///
/// This only performs TOML deserialization; it does **not** perform
/// semantic validation (cycle definitions, scheduler names, dependency
/// trees). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawModel> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let model: RawModel = toml::from_str(&contents)?;

    Ok(model)
}

/// Load a workflow document from path and run full validation.
///
/// This is the entry point used by the engine on every invocation where
/// the document changed:
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Checks cycle definitions, scheduler names, cycle references and
///   dependency trees.
///
/// Any failure here is a model error: the invocation aborts before
/// persisted state is touched.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowModel> {
    let raw = load_from_path(&path)?;
    let model = WorkflowModel::try_from(raw)?;
    Ok(model)
}
