//! Error types for hydra-commit.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("branch head JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to parse manifest for path '{path}': {source}")]
    Manifest {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to emit YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid branch '{branch}': {reason}")]
    InvalidBranch { branch: String, reason: &'static str },

    #[error("invalid destination path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("destination path '{path}' appears more than once in one commit")]
    DuplicatePath { path: String },
}

/// Convenience constructor for [`CommitError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CommitError {
    CommitError::Io {
        path: path.into(),
        source,
    }
}
