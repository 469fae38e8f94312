//! Branch heads: the last commit on a destination branch and the hash of
//! every file it wrote.
//!
//! Persisted as JSON at `<root>/.heads/<branch>.json`, written with the
//! atomic `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, CommitError};

/// Relative file path (from the branch directory) to SHA-256 hex digest.
pub type FileHashes = BTreeMap<String, String>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BranchHead {
    pub head: String,
    pub dry_sha: String,
    pub committed_at: DateTime<Utc>,
    #[serde(default)]
    pub files: FileHashes,
}

pub fn heads_dir(root: &Path) -> PathBuf {
    root.join(".heads")
}

/// `<root>/.heads/<branch>.json`. Branches containing `/` nest.
pub fn head_path_at(root: &Path, branch: &str) -> PathBuf {
    heads_dir(root).join(format!("{branch}.json"))
}

/// Load the head of `branch`, or `None` if nothing was committed yet.
pub fn load_at(root: &Path, branch: &str) -> Result<Option<BranchHead>, CommitError> {
    let path = head_path_at(root, branch);
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(Some(serde_json::from_str(&contents)?))
}

pub fn save_at(root: &Path, branch: &str, head: &BranchHead) -> Result<(), CommitError> {
    let path = head_path_at(root, branch);
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("invalid head path")));
    };
    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

    let json = serde_json::to_string_pretty(head)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, &json).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Commit id over the previous head, the dry SHA, the message and every
/// tracked file hash (in path order).
pub fn commit_id(previous: Option<&str>, dry_sha: &str, message: &str, files: &FileHashes) -> String {
    let mut h = Sha256::new();
    h.update(previous.unwrap_or_default().as_bytes());
    h.update([0u8]);
    h.update(dry_sha.as_bytes());
    h.update([0u8]);
    h.update(message.as_bytes());
    for (path, digest) in files {
        h.update([0u8]);
        h.update(path.as_bytes());
        h.update([b'=']);
        h.update(digest.as_bytes());
    }
    hex::encode(h.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn head(files: &[(&str, &str)]) -> BranchHead {
        BranchHead {
            head: "c0ffee".to_string(),
            dry_sha: "abc123".to_string(),
            committed_at: Utc::now(),
            files: files
                .iter()
                .map(|(p, h)| (p.to_string(), h.to_string()))
                .collect(),
        }
    }

    #[test]
    fn missing_head_is_none() {
        let root = TempDir::new().unwrap();
        assert!(load_at(root.path(), "env/prod").unwrap().is_none());
    }

    #[test]
    fn slashed_branch_nests_and_reloads() {
        let root = TempDir::new().unwrap();
        let saved = head(&[("guestbook/manifest.yaml", "deadbeef")]);
        save_at(root.path(), "env/prod", &saved).unwrap();

        assert!(root.path().join(".heads/env/prod.json").exists());
        assert!(!root.path().join(".heads/env/prod.json.tmp").exists());
        assert_eq!(load_at(root.path(), "env/prod").unwrap(), Some(saved));
    }

    #[test]
    fn commit_id_depends_on_every_input() {
        let files = head(&[("a/manifest.yaml", "1")]).files;
        let base = commit_id(None, "abc123", "msg", &files);
        assert_eq!(base, commit_id(None, "abc123", "msg", &files));
        assert_ne!(base, commit_id(Some("prev"), "abc123", "msg", &files));
        assert_ne!(base, commit_id(None, "def456", "msg", &files));
        assert_ne!(base, commit_id(None, "abc123", "other", &files));
        let changed = head(&[("a/manifest.yaml", "2")]).files;
        assert_ne!(base, commit_id(None, "abc123", "msg", &changed));
    }
}
