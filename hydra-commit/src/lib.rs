//! # hydra-commit
//!
//! Local destination writer. Implements [`hydra_hydrator::CommitService`]
//! by writing hydrated manifests into a directory tree, one subdirectory per
//! destination branch, and tracking a content-addressed head per branch.
//!
//! ```text
//! <root>/
//!   <branch>/<path>/manifest.yaml
//!   <branch>/<path>/hydrator.metadata
//!   .heads/<branch>.json
//! ```

pub mod error;
pub mod heads;
pub mod writer;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use hydra_hydrator::{BoxError, CommitRequest, CommitService};

pub use error::CommitError;
pub use heads::BranchHead;
pub use writer::{commit_at, CommitResult, WriteResult, MANIFEST_FILE, METADATA_FILE};

type BranchLock = Arc<Mutex<()>>;

/// Commit service over a local destination root.
///
/// Commits to the same branch are serialized; clones share the locks.
#[derive(Debug, Clone)]
pub struct LocalCommitService {
    root: PathBuf,
    branches: Arc<Mutex<HashMap<String, BranchLock>>>,
}

impl LocalCommitService {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            branches: Arc::default(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn commit(&self, request: &CommitRequest) -> Result<CommitResult, CommitError> {
        let branch = self.branch_lock(&request.target_branch);
        let _held = lock(&branch);
        commit_at(&self.root, request)
    }

    fn branch_lock(&self, branch: &str) -> BranchLock {
        lock(&self.branches)
            .entry(branch.to_string())
            .or_default()
            .clone()
    }

    /// Current head of `branch`, if anything was committed.
    pub fn head(&self, branch: &str) -> Result<Option<BranchHead>, CommitError> {
        heads::load_at(&self.root, branch)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CommitService for LocalCommitService {
    fn commit_hydrated_manifests(&self, request: &CommitRequest) -> Result<String, BoxError> {
        Ok(self.commit(request)?.head)
    }
}
