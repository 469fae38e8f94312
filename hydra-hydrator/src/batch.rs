//! Batch hydration: many targets, one commit.

use serde_json::{Map, Value};
use tracing::debug;

use hydra_core::RepoCredentials;

use crate::deps::{CommitRequest, CommitService, Dependencies, HydratedManifest, PathDetails};
use crate::error::HydrationError;
use crate::resolver::RelevantTarget;

pub const COMMIT_MESSAGE_PREFIX: &str = "[Hydrator Bot] hydrate";

pub fn commit_message(dry_sha: &str) -> String {
    format!("{COMMIT_MESSAGE_PREFIX} {dry_sha}")
}

/// Render every target in `targets` and submit them as one commit at
/// `revision`. Returns the commit id.
///
/// `targets` must be non-empty and share one grouping key; the repository
/// and branches are taken from the first entry. Any failure fails the whole
/// batch.
pub fn hydrate<D, C>(
    deps: &D,
    commit: &C,
    targets: &[RelevantTarget],
    revision: &str,
) -> Result<String, HydrationError>
where
    D: Dependencies + ?Sized,
    C: CommitService + ?Sized,
{
    let Some(first) = targets.first() else {
        return Ok(String::new());
    };
    let repo_url = first.hydrator.dry_source.repo_url.clone();
    let sync_branch = first.hydrator.sync_source.target_branch.clone();
    let target_branch = first.hydrator.destination_branch().to_string();

    let mut paths = Vec::with_capacity(targets.len());
    for relevant in targets {
        let name = relevant.target.qualified_name();
        let source = relevant.hydrator.dry_manifest_source();

        let rendered = deps
            .repo_objects(
                &relevant.target,
                &source,
                &source.target_revision,
                &relevant.project,
            )
            .map_err(|source| HydrationError::RepoObjects {
                target: name.to_string(),
                source,
            })?;

        let manifests = rendered
            .objects
            .iter()
            .map(|object| {
                Ok(HydratedManifest {
                    manifest_json: canonical_json(object)?,
                })
            })
            .collect::<Result<Vec<_>, HydrationError>>()?;

        debug!(target = %name, objects = manifests.len(), "rendered manifests");
        paths.push(PathDetails {
            path: relevant.hydrator.sync_source.path.clone(),
            manifests,
            commands: rendered.commands,
        });
    }

    let repo = deps
        .write_credentials(&repo_url)
        .map_err(HydrationError::Credentials)?
        .unwrap_or_else(|| RepoCredentials::anonymous(repo_url.as_str()));

    let request = CommitRequest {
        repo,
        sync_branch,
        target_branch,
        dry_sha: revision.to_string(),
        commit_message: commit_message(revision),
        paths,
    };

    commit
        .commit_hydrated_manifests(&request)
        .map_err(HydrationError::Commit)
}

/// Compact JSON with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> Result<String, HydrationError> {
    Ok(serde_json::to_string(&sorted(value))?)
}

fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                out.insert(key.clone(), sorted(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}
