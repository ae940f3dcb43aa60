// src/errors.rs

//! Crate-wide error taxonomy and `Result` alias.
//!
//! Only two error classes abort an entire invocation: model validation
//! failures (raised before any state mutation) and lock acquisition
//! failures on `run`. Scheduler call failures are caught and logged at
//! the task/cycle level and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CycleflowError {
    /// Malformed or semantically invalid source model. Fatal for the
    /// current invocation; prior persisted state is untouched.
    #[error("Model error: {0}")]
    Model(String),

    /// The state lock could not be acquired within the retry budget.
    #[error("The workflow is locked")]
    WorkflowLocked,

    /// A submit/poll/cancel call against a batch scheduler failed.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// The persisted state snapshot is unreadable or from an
    /// unsupported schema version.
    #[error("State error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("State encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CycleflowError>;
