//! Manifest loading from a source path.
//!
//! `detect_source_kind` inspects indicator files at the source root, most
//! specific first; only plain directories can be loaded without rendering.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{io_err, SourceError};
use crate::{is_hidden, join_inside, repo_dir};

const KUSTOMIZE_INDICATORS: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];
const HELM_INDICATOR: &str = "Chart.yaml";
const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Kustomize,
    Helm,
    Directory,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Kustomize => "kustomize",
            SourceKind::Helm => "helm",
            SourceKind::Directory => "directory",
        }
    }
}

pub fn detect_source_kind(dir: &Path) -> SourceKind {
    if KUSTOMIZE_INDICATORS.iter().any(|f| dir.join(f).is_file()) {
        return SourceKind::Kustomize;
    }
    if dir.join(HELM_INDICATOR).is_file() {
        return SourceKind::Helm;
    }
    SourceKind::Directory
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Every manifest object below `path` in the repository at `repo_url`, in
/// sorted file order.
///
/// Files ending in `.yaml`, `.yml` or `.json` are read recursively; YAML
/// files may hold several documents and empty documents are dropped. Each
/// remaining document must be a mapping with a `kind`.
pub fn load_manifests(repo_url: &str, path: &str) -> Result<Vec<serde_json::Value>, SourceError> {
    let repo = repo_dir(repo_url);
    if !repo.is_dir() {
        return Err(SourceError::RepoNotFound { path: repo });
    }
    let dir = join_inside(&repo, path)?;
    if !dir.is_dir() {
        return Err(SourceError::PathNotFound {
            path: path.to_string(),
        });
    }

    let kind = detect_source_kind(&dir);
    if kind != SourceKind::Directory {
        return Err(SourceError::UnsupportedSource {
            path: dir,
            kind: kind.as_str(),
        });
    }

    let mut objects = Vec::new();
    for file in manifest_files(&dir)? {
        let contents = fs::read_to_string(&file).map_err(|e| io_err(&file, e))?;
        let documents = if has_extension(&file, "json") {
            vec![parse_json(&file, &contents)?]
        } else {
            parse_yaml_documents(&file, &contents)?
        };
        for document in documents {
            if document.is_null() {
                continue;
            }
            validate(&file, &document)?;
            objects.push(document);
        }
    }
    debug!(path = %dir.display(), objects = objects.len(), "loaded manifests");
    Ok(objects)
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, SourceError> {
    let mut files = Vec::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry.map_err(|source| SourceError::Walk {
            path: dir.to_path_buf(),
            source,
        })?;
        let is_manifest = entry.file_type().is_file()
            && MANIFEST_EXTENSIONS
                .iter()
                .any(|ext| has_extension(entry.path(), ext));
        if is_manifest {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

fn parse_json(path: &Path, contents: &str) -> Result<serde_json::Value, SourceError> {
    serde_json::from_str(contents).map_err(|e| SourceError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn parse_yaml_documents(path: &Path, contents: &str) -> Result<Vec<serde_json::Value>, SourceError> {
    serde_yaml::Deserializer::from_str(contents)
        .map(|document| {
            serde_json::Value::deserialize(document).map_err(|e| SourceError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn validate(path: &Path, document: &serde_json::Value) -> Result<(), SourceError> {
    let Some(object) = document.as_object() else {
        return Err(SourceError::InvalidManifest {
            path: path.to_path_buf(),
            reason: "document is not a mapping".to_string(),
        });
    };
    match object.get("kind").and_then(|k| k.as_str()) {
        Some(kind) if !kind.is_empty() => Ok(()),
        _ => Err(SourceError::InvalidManifest {
            path: path.to_path_buf(),
            reason: "missing 'kind'".to_string(),
        }),
    }
}
