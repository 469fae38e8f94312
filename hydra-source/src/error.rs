//! Error types for hydra-source.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("repository not found at {path}")]
    RepoNotFound { path: PathBuf },

    #[error("source path '{path}' not found in repository")]
    PathNotFound { path: String },

    #[error("source path '{path}' must be relative and stay inside the repository")]
    PathEscape { path: String },

    #[error("revision reference must not be empty")]
    EmptyRevision,

    #[error("{kind} source at {path} requires rendering, which is not supported")]
    UnsupportedSource { path: PathBuf, kind: &'static str },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid manifest in {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}
