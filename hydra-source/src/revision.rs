//! Content revisions of a dry repository.

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::{io_err, SourceError};
use crate::{is_hidden, repo_dir};

/// Resolve `target_revision` in the repository at `repo_url` to a revision id.
///
/// A local directory has a single line of history, its working tree, so
/// every non-empty reference resolves to the SHA-256 of the tree: sorted
/// relative paths and contents of all regular files, hidden entries skipped.
pub fn resolve_revision(repo_url: &str, target_revision: &str) -> Result<String, SourceError> {
    if target_revision.trim().is_empty() {
        return Err(SourceError::EmptyRevision);
    }
    let repo = repo_dir(repo_url);
    if !repo.is_dir() {
        return Err(SourceError::RepoNotFound { path: repo });
    }

    let mut hasher = Sha256::new();
    let walker = WalkDir::new(&repo)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

    for entry in walker {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: repo.clone(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(&repo)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let contents = std::fs::read(entry.path()).map_err(|e| io_err(entry.path(), e))?;

        hasher.update(relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((contents.len() as u64).to_le_bytes());
        hasher.update(&contents);
    }

    Ok(hex::encode(hasher.finalize()))
}
