//! Local-directory dry sources for `hydra`.
//!
//! A dry repository is a plain directory (optionally given as a `file://`
//! URL). [`resolve_revision`] digests its contents into a revision id and
//! [`load_manifests`] reads the plain manifests below a source path.
//! Sources that need rendering (Kustomize, Helm) are detected and rejected.

pub mod error;
pub mod manifests;
pub mod revision;

use std::path::{Component, Path, PathBuf};

pub use error::SourceError;
pub use manifests::{detect_source_kind, load_manifests, SourceKind};
pub use revision::resolve_revision;

/// Directory a repo URL refers to.
pub fn repo_dir(repo_url: &str) -> PathBuf {
    PathBuf::from(repo_url.strip_prefix("file://").unwrap_or(repo_url))
}

/// `repo/path`, refusing absolute paths and `..` components.
pub(crate) fn join_inside(repo: &Path, path: &str) -> Result<PathBuf, SourceError> {
    let relative = Path::new(path);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(SourceError::PathEscape {
            path: path.to_string(),
        });
    }
    Ok(repo.join(relative))
}

pub(crate) fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}
