//! Error types for hydra-hydrator.

use thiserror::Error;

use crate::grouping::DedupFingerprint;

/// Error returned by a collaborator behind [`crate::Dependencies`] or
/// [`crate::CommitService`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors that can abort resolution or fail a batch.
#[derive(Debug, Error)]
pub enum HydrationError {
    #[error("failed to list targets: {0}")]
    ListTargets(#[source] BoxError),

    #[error("failed to get project '{project}' for target '{target}': {source}")]
    Project {
        project: String,
        target: String,
        #[source]
        source: BoxError,
    },

    /// Two targets in one group write to the same branch and path. This is a
    /// configuration error; the whole resolution is discarded.
    #[error("multiple hydrators use the same destination: {0}")]
    DuplicateDestination(DedupFingerprint),

    #[error("failed to resolve dry revision: {0}")]
    ResolveRevision(#[source] BoxError),

    #[error("failed to get repo objects for target '{target}': {source}")]
    RepoObjects {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to marshal object: {0}")]
    Marshal(#[from] serde_json::Error),

    #[error("failed to get hydrator credentials: {0}")]
    Credentials(#[source] BoxError),

    #[error("failed to commit hydrated manifests: {0}")]
    Commit(#[source] BoxError),
}
