use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures to run the controller CLI at all, as opposed to the CLI running
/// and rejecting a manifest (see [`crate::controller::ApplyOutcome`]).
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("controller binary `{0}` was not found on PATH")]
    BinaryNotFound(String),
    #[error("failed to launch `{path}`: {source}")]
    Spawn { path: PathBuf, source: std::io::Error },
    #[error("failed to render manifest: {0}")]
    Render(#[from] serde_yaml::Error),
    #[error("i/o error while talking to the controller: {0}")]
    Io(#[from] std::io::Error),
    #[error("controller did not finish within {0:?}")]
    Timeout(Duration),
}
