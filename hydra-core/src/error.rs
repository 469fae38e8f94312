//! Error types for hydra-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store and config operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.hydra/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    #[error("project not found at {path}")]
    ProjectNotFound { path: PathBuf },

    #[error("target not found at {path}")]
    TargetNotFound { path: PathBuf },

    /// Project and target names become file names; see `store::validate_name`.
    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },
}
