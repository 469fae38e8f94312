//! Hash-gated staged writer and the local commit.
//!
//! ## Commit protocol
//!
//! 1. SHA-256 hash every rendered file and compare with the hash recorded on
//!    the branch head; identical files still on disk are skipped.
//! 2. Stage: write each changed file to `<path>.hydra.tmp`. Any failure
//!    removes every staged file; the branch is untouched.
//! 3. Publish: move the current file aside to `<path>.hydra.bak` and rename
//!    the staged file into place. A failed rename restores every file
//!    published so far.
//! 4. Save the branch head, then drop the backups. A failed head save rolls
//!    the published files back as well.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use sha2::{Digest, Sha256};

use hydra_hydrator::{CommitRequest, PathDetails};

use crate::error::{io_err, CommitError};
use crate::heads::{self, BranchHead, FileHashes};

pub const MANIFEST_FILE: &str = "manifest.yaml";
pub const METADATA_FILE: &str = "hydrator.metadata";

// ---------------------------------------------------------------------------
// Write result
// ---------------------------------------------------------------------------

/// Outcome of an individual file write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Content changed or the file did not previously exist.
    Written { path: PathBuf },
    /// Content matches the recorded hash.
    Unchanged { path: PathBuf },
}

impl WriteResult {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteResult::Written { .. })
    }
}

// ---------------------------------------------------------------------------
// Staging
// ---------------------------------------------------------------------------

/// A changed file written next to its destination, not yet renamed in.
#[derive(Debug)]
pub(crate) struct StagedFile {
    path: PathBuf,
    tmp: PathBuf,
    key: String,
    digest: String,
}

/// Stage `content` for `path` unless `hashes[key]` already records it and
/// the file is still on disk. `None` means unchanged.
pub(crate) fn stage_write(
    path: &Path,
    key: &str,
    content: &str,
    hashes: &FileHashes,
) -> Result<Option<StagedFile>, CommitError> {
    let digest = hex::encode(Sha256::digest(content.as_bytes()));

    if hashes.get(key) == Some(&digest) && path.is_file() {
        tracing::debug!("unchanged: {}", path.display());
        return Ok(None);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let tmp = sibling(path, "hydra.tmp");
    if let Err(e) = std::fs::write(&tmp, content) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&tmp, e));
    }
    Ok(Some(StagedFile {
        path: path.to_path_buf(),
        tmp,
        key: key.to_string(),
        digest,
    }))
}

fn discard(staged: &[StagedFile]) {
    for file in staged {
        let _ = std::fs::remove_file(&file.tmp);
    }
}

// ---------------------------------------------------------------------------
// Publishing
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct PublishedFile {
    path: PathBuf,
    backup: Option<PathBuf>,
}

/// Files renamed into place by one commit, undoable until [`finish`].
///
/// [`finish`]: Publication::finish
#[derive(Debug, Default)]
pub(crate) struct Publication {
    files: Vec<PublishedFile>,
}

impl Publication {
    /// Rename every staged file into place. On failure everything published
    /// so far is restored and the remaining staged files are removed.
    pub(crate) fn publish(staged: &[StagedFile]) -> Result<Self, CommitError> {
        let mut publication = Self::default();
        for (i, file) in staged.iter().enumerate() {
            if let Err(err) = publication.publish_one(file) {
                discard(&staged[i..]);
                publication.rollback();
                return Err(err);
            }
        }
        Ok(publication)
    }

    fn publish_one(&mut self, file: &StagedFile) -> Result<(), CommitError> {
        let backup = if file.path.is_file() {
            let backup = sibling(&file.path, "hydra.bak");
            std::fs::rename(&file.path, &backup).map_err(|e| io_err(&file.path, e))?;
            Some(backup)
        } else {
            None
        };
        if let Err(e) = std::fs::rename(&file.tmp, &file.path) {
            if let Some(backup) = &backup {
                let _ = std::fs::rename(backup, &file.path);
            }
            return Err(io_err(&file.path, e));
        }
        tracing::debug!("wrote: {}", file.path.display());
        self.files.push(PublishedFile {
            path: file.path.clone(),
            backup,
        });
        Ok(())
    }

    /// Put back the previous content of every published file.
    pub(crate) fn rollback(self) {
        for file in self.files.into_iter().rev() {
            let restored = match &file.backup {
                Some(backup) => std::fs::rename(backup, &file.path),
                None => std::fs::remove_file(&file.path),
            };
            if let Err(err) = restored {
                tracing::warn!(path = %file.path.display(), error = %err, "failed to roll back hydrated file");
            }
        }
    }

    /// Drop the backups; the published files stay.
    pub(crate) fn finish(self) {
        for backup in self.files.into_iter().filter_map(|f| f.backup) {
            if let Err(err) = std::fs::remove_file(&backup) {
                tracing::debug!(path = %backup.display(), error = %err, "stale backup left behind");
            }
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{suffix}", path.display()))
}

// ---------------------------------------------------------------------------
// commit
// ---------------------------------------------------------------------------

/// Outcome of one commit against a destination branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub branch: String,
    pub head: String,
    pub writes: Vec<WriteResult>,
}

/// Contents of `hydrator.metadata`, next to each hydrated manifest.
#[derive(Debug, Serialize)]
struct HydratorMetadata<'a> {
    #[serde(rename = "drySha")]
    dry_sha: &'a str,
    #[serde(rename = "repoURL")]
    repo_url: &'a str,
    commands: &'a [String],
}

/// Write every path unit of `request` below `<root>/<target_branch>/` and
/// advance the branch head.
///
/// All units are validated before anything is written. When no file
/// changes the existing head is returned untouched.
pub fn commit_at(root: &Path, request: &CommitRequest) -> Result<CommitResult, CommitError> {
    validate_branch(&request.target_branch)?;
    let units = validate_paths(&request.paths)?;
    let rendered = units
        .iter()
        .map(|(rel, unit)| render_unit(rel, unit, request))
        .collect::<Result<Vec<_>, _>>()?;

    let branch_dir = root.join(&request.target_branch);
    let previous = heads::load_at(root, &request.target_branch)?;
    let mut hashes = previous
        .as_ref()
        .map(|h| h.files.clone())
        .unwrap_or_default();

    let mut writes = Vec::with_capacity(rendered.len() * 2);
    let mut staged = Vec::new();
    for (rel, manifest, metadata) in &rendered {
        for (file, content) in [(MANIFEST_FILE, manifest), (METADATA_FILE, metadata)] {
            let key = join_key(rel, file);
            let path = branch_dir.join(&key);
            match stage_write(&path, &key, content, &hashes) {
                Ok(Some(file)) => {
                    writes.push(WriteResult::Written { path });
                    staged.push(file);
                }
                Ok(None) => writes.push(WriteResult::Unchanged { path }),
                Err(err) => {
                    discard(&staged);
                    return Err(err);
                }
            }
        }
    }

    if let Some(previous) = previous.as_ref() {
        if staged.is_empty() {
            tracing::debug!(branch = %request.target_branch, head = %previous.head, "nothing to commit");
            return Ok(CommitResult {
                branch: request.target_branch.clone(),
                head: previous.head.clone(),
                writes,
            });
        }
    }

    let publication = Publication::publish(&staged)?;
    for file in staged {
        hashes.insert(file.key, file.digest);
    }

    let head = heads::commit_id(
        previous.as_ref().map(|h| h.head.as_str()),
        &request.dry_sha,
        &request.commit_message,
        &hashes,
    );
    let saved = heads::save_at(
        root,
        &request.target_branch,
        &BranchHead {
            head: head.clone(),
            dry_sha: request.dry_sha.clone(),
            committed_at: Utc::now(),
            files: hashes,
        },
    );
    if let Err(err) = saved {
        publication.rollback();
        return Err(err);
    }
    publication.finish();
    tracing::info!(branch = %request.target_branch, head = %head, paths = rendered.len(), "committed hydrated manifests");

    Ok(CommitResult {
        branch: request.target_branch.clone(),
        head,
        writes,
    })
}

fn render_unit(
    rel: &str,
    unit: &PathDetails,
    request: &CommitRequest,
) -> Result<(String, String, String), CommitError> {
    let mut documents = Vec::with_capacity(unit.manifests.len());
    for manifest in &unit.manifests {
        let value: serde_json::Value =
            serde_json::from_str(&manifest.manifest_json).map_err(|source| {
                CommitError::Manifest {
                    path: unit.path.clone(),
                    source,
                }
            })?;
        documents.push(serde_yaml::to_string(&value)?);
    }
    let manifest = documents.join("---\n");

    let metadata = HydratorMetadata {
        dry_sha: &request.dry_sha,
        repo_url: &request.repo.repo_url,
        commands: &unit.commands,
    };
    let metadata = format!("{}\n", serde_json::to_string_pretty(&metadata)?);

    Ok((rel.to_string(), manifest, metadata))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_branch(branch: &str) -> Result<(), CommitError> {
    let reason = if branch.trim().is_empty() {
        Some("must not be empty")
    } else if branch.starts_with('.') || branch.split('/').any(|c| c.starts_with('.')) {
        Some("components must not start with '.'")
    } else if Path::new(branch).is_absolute() || branch.split('/').any(str::is_empty) {
        Some("must be a relative name without empty components")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(CommitError::InvalidBranch {
            branch: branch.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Normalized relative path of each unit; `""` is the branch root.
fn validate_paths(paths: &[PathDetails]) -> Result<Vec<(String, &PathDetails)>, CommitError> {
    let mut seen = HashSet::with_capacity(paths.len());
    let mut out = Vec::with_capacity(paths.len());
    for unit in paths {
        let rel = normalize(&unit.path)?;
        if !seen.insert(rel.clone()) {
            return Err(CommitError::DuplicatePath {
                path: unit.path.clone(),
            });
        }
        out.push((rel, unit));
    }
    Ok(out)
}

fn normalize(path: &str) -> Result<String, CommitError> {
    let mut parts = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_string_lossy();
                if part.starts_with('.') {
                    return Err(CommitError::InvalidPath {
                        path: path.to_string(),
                        reason: "hidden components are reserved",
                    });
                }
                parts.push(part.into_owned());
            }
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(CommitError::InvalidPath {
                    path: path.to_string(),
                    reason: "must not contain '..'",
                })
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(CommitError::InvalidPath {
                    path: path.to_string(),
                    reason: "must be relative",
                })
            }
        }
    }
    Ok(parts.join("/"))
}

fn join_key(rel: &str, file: &str) -> String {
    if rel.is_empty() {
        file.to_string()
    } else {
        format!("{rel}/{file}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
