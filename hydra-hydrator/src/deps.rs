//! Collaborator seams of the engine.
//!
//! The engine never touches storage, revision control or manifest rendering
//! directly. Everything it needs from the outside world goes through
//! [`Dependencies`] and [`CommitService`], which keeps it testable against
//! in-memory fakes.

use serde::{Deserialize, Serialize};

use hydra_core::{
    HydratorStatus, ManifestSource, Project, QualifiedName, RepoCredentials, Target,
};

use crate::error::BoxError;
use crate::grouping::HydrationQueueKey;

/// Rendered output for one target: the objects plus the commands that
/// produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedManifests {
    pub objects: Vec<serde_json::Value>,
    pub commands: Vec<String>,
}

pub trait Dependencies: Send + Sync {
    /// Project of `target`, provided the target may be processed.
    fn processable_project(&self, target: &Target) -> Result<Project, BoxError>;

    /// Every target the engine may consider, in a stable order.
    fn processable_targets(&self) -> Result<Vec<Target>, BoxError>;

    /// Rendered objects for `source` at `revision`, with `project` as the
    /// policy context.
    fn repo_objects(
        &self,
        target: &Target,
        source: &ManifestSource,
        revision: &str,
        project: &Project,
    ) -> Result<RenderedManifests, BoxError>;

    /// Write credentials for `repo_url`. `Ok(None)` means none are
    /// registered.
    fn write_credentials(&self, repo_url: &str) -> Result<Option<RepoCredentials>, BoxError>;

    /// Resolve a revision reference to a concrete revision id.
    fn resolve_revision(&self, repo_url: &str, target_revision: &str) -> Result<String, BoxError>;

    /// Ask the downstream sync engine to re-read `name`.
    fn request_refresh(&self, name: &QualifiedName);

    /// Record `new_status` on the target `orig` was read from. Must be
    /// idempotent.
    fn persist_hydrator_status(
        &self,
        orig: &Target,
        new_status: &HydratorStatus,
    ) -> Result<(), BoxError>;

    /// Schedule a batch for `key`. Must be idempotent.
    fn add_hydration_queue_item(&self, key: HydrationQueueKey);
}

/// One serialized object inside a path unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydratedManifest {
    pub manifest_json: String,
}

/// Everything written to one destination path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDetails {
    pub path: String,
    pub manifests: Vec<HydratedManifest>,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// A single multi-path write against one destination branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub repo: RepoCredentials,
    pub sync_branch: String,
    pub target_branch: String,
    pub dry_sha: String,
    pub commit_message: String,
    pub paths: Vec<PathDetails>,
}

pub trait CommitService: Send + Sync {
    /// Apply every path unit as one atomic commit and return its id.
    fn commit_hydrated_manifests(&self, request: &CommitRequest) -> Result<String, BoxError>;
}
