//! Error types for the layerbuild pipeline.
//!
//! Every variant is fatal. The pipeline stops at the first one it sees and
//! hands it back to the caller unchanged; the message carries whatever
//! diagnostic the external tool printed.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// One step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Verify,
    /// Stage A: payload archive built on top of the source image.
    BuildBase,
    /// Stage B: requirements layered onto the Stage A image.
    BuildFinal,
    Auth,
    Login,
    Push,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Verify => "verify",
            Stage::BuildBase => "build (stage A)",
            Stage::BuildFinal => "build (stage B)",
            Stage::Auth => "auth",
            Stage::Login => "login",
            Stage::Push => "push",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Pipeline error taxonomy.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Object could not be retrieved from the store.
    #[error("fetch of {location} failed: {message}")]
    Fetch { location: String, message: String },

    /// Downloaded payload does not match the pinned digest.
    #[error("integrity check failed for {path}: expected sha256 {expected}, got {actual}")]
    Integrity {
        path: String,
        expected: String,
        actual: String,
    },

    /// Image build tool exited non-zero.
    #[error("{stage} failed for {tag}: {message}")]
    Build {
        stage: Stage,
        tag: String,
        message: String,
    },

    /// Token issuance or registry login failed.
    #[error("authentication to {registry} failed: {message}")]
    Auth { registry: String, message: String },

    /// Upload to the registry failed.
    #[error("push of {tag} failed: {message}")]
    Push { tag: String, message: String },

    /// A single external command ran past the per-stage timeout.
    #[error("{stage} timed out after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },

    /// The whole run ran past the overall deadline.
    #[error("pipeline exceeded its deadline of {}s", .0.as_secs())]
    Deadline(Duration),

    /// Caller-supplied inputs are unusable.
    #[error("invalid build request: {0}")]
    Request(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The stage this error aborted, if it belongs to one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Fetch { .. } => Some(Stage::Fetch),
            PipelineError::Integrity { .. } => Some(Stage::Verify),
            PipelineError::Build { stage, .. } => Some(*stage),
            PipelineError::Auth { .. } => Some(Stage::Auth),
            PipelineError::Push { .. } => Some(Stage::Push),
            PipelineError::Timeout { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

/// Render an `anyhow` error with its full context chain on one line.
pub(crate) fn describe(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}
