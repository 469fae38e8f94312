//! Per-target YAML store.
//!
//! # Storage layout
//!
//! ```text
//! ~/.hydra/
//!   projects/
//!     <project_name>/
//!       project.yaml        (project policy: mode 0600)
//!       <target_name>.yaml  (one file per target, spec + status: mode 0600)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::StoreError;
use crate::types::{
    HydrationPhase, HydratorStatus, Project, ProjectName, QualifiedName, SourceHydrator, Target,
};

const PROJECT_INDEX: &str = "project.yaml";

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.hydra/` (pure, no I/O).
pub fn hydra_root(home: &Path) -> PathBuf {
    home.join(".hydra")
}

/// `<home>/.hydra/projects/` (pure, no I/O).
pub fn projects_root(home: &Path) -> PathBuf {
    hydra_root(home).join("projects")
}

/// `<home>/.hydra/projects/<project>/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn project_dir_at(home: &Path, project: &ProjectName) -> Result<PathBuf, StoreError> {
    let dir = projects_root(home).join(&project.0);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.hydra/projects/<project>/project.yaml` (pure, no I/O).
pub fn project_path_at(home: &Path, project: &ProjectName) -> PathBuf {
    projects_root(home).join(&project.0).join(PROJECT_INDEX)
}

/// `<home>/.hydra/projects/<project>/<target>.yaml` (pure, no I/O).
pub fn target_path_at(home: &Path, name: &QualifiedName) -> PathBuf {
    projects_root(home)
        .join(&name.project.0)
        .join(format!("{}.yaml", name.name.0))
}

/// Lists the names of all project directories under `<home>/.hydra/projects/`.
pub fn list_project_names_at(home: &Path) -> Result<Vec<ProjectName>, StoreError> {
    let dir = projects_root(home);
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut names: Vec<ProjectName> = std::fs::read_dir(&dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| ProjectName::from(e.file_name().to_string_lossy().into_owned()))
        .collect();
    names.sort();
    Ok(names)
}

// ---------------------------------------------------------------------------
// 2. Projects
// ---------------------------------------------------------------------------

/// Load `<home>/.hydra/projects/<project>/project.yaml`.
///
/// Returns `StoreError::ProjectNotFound` if absent.
pub fn load_project_at(home: &Path, project: &ProjectName) -> Result<Project, StoreError> {
    let path = project_path_at(home, project);
    if !path.exists() {
        return Err(StoreError::ProjectNotFound { path });
    }
    read_yaml(&path)
}

/// `load_project_at` convenience wrapper.
pub fn load_project(project: &ProjectName) -> Result<Project, StoreError> {
    load_project_at(&home()?, project)
}

/// Atomically save a project index.
pub fn save_project_at(home: &Path, project: &Project) -> Result<(), StoreError> {
    validate_name(&project.name.0)?;
    project_dir_at(home, &project.name)?;
    write_yaml_atomic(&project_path_at(home, &project.name), project)
}

/// Create a project with the given source repo patterns.
///
/// Idempotent: if the project already exists, loads and returns it unchanged.
pub fn add_project_at(
    home: &Path,
    name: ProjectName,
    source_repos: Vec<String>,
) -> Result<Project, StoreError> {
    validate_name(&name.0)?;
    if project_path_at(home, &name).exists() {
        return load_project_at(home, &name);
    }
    let project = Project {
        name,
        source_repos,
        created_at: Utc::now(),
    };
    save_project_at(home, &project)?;
    Ok(project)
}

/// `add_project_at` convenience wrapper.
pub fn add_project(name: ProjectName, source_repos: Vec<String>) -> Result<Project, StoreError> {
    add_project_at(&home()?, name, source_repos)
}

// ---------------------------------------------------------------------------
// 3. Targets
// ---------------------------------------------------------------------------

/// Load a single target.
///
/// Returns `StoreError::TargetNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_target_at(home: &Path, name: &QualifiedName) -> Result<Target, StoreError> {
    let path = target_path_at(home, name);
    if !path.exists() {
        return Err(StoreError::TargetNotFound { path });
    }
    read_yaml(&path)
}

/// `load_target_at` convenience wrapper.
pub fn load_target(name: &QualifiedName) -> Result<Target, StoreError> {
    load_target_at(&home()?, name)
}

/// Walk `<home>/.hydra/projects/*/*.yaml` and return every target. Results are
/// sorted deterministically (project name, then target name).
///
/// Skips `project.yaml` index files. A target file that cannot be read or
/// parsed is logged and left out so one broken target never hides the rest;
/// `load_target_at` still reports the error for that target.
pub fn list_targets_at(home: &Path) -> Result<Vec<Target>, StoreError> {
    let mut result = Vec::new();
    for project in list_project_names_at(home)? {
        let dir = projects_root(home).join(&project.0);
        let mut file_entries: Vec<_> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .collect();
        file_entries.sort_by_key(|e| e.file_name());

        for file_entry in file_entries {
            let fname = file_entry.file_name();
            let name = fname.to_string_lossy();
            if !name.ends_with(".yaml") || name == PROJECT_INDEX {
                continue;
            }
            let path = file_entry.path();
            match read_yaml(&path) {
                Ok(target) => result.push(target),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping unreadable target");
                }
            }
        }
    }
    Ok(result)
}

/// `list_targets_at` convenience wrapper.
pub fn list_targets() -> Result<Vec<Target>, StoreError> {
    list_targets_at(&home()?)
}

/// Atomically save a target to `<home>/.hydra/projects/<project>/<target>.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_target_at(home: &Path, target: &Target) -> Result<(), StoreError> {
    validate_name(&target.name.0)?;
    project_dir_at(home, &target.project)?;
    write_yaml_atomic(&target_path_at(home, &target.qualified_name()), target)
}

/// `save_target_at` convenience wrapper.
pub fn save_target(target: &Target) -> Result<(), StoreError> {
    save_target_at(&home()?, target)
}

/// Register a target with a hydrator configuration under an existing project.
///
/// Returns `StoreError::ProjectNotFound` if the project has not been created.
/// An existing target keeps its status; only its configuration is replaced.
pub fn add_target_at(
    home: &Path,
    name: &QualifiedName,
    source_hydrator: SourceHydrator,
) -> Result<Target, StoreError> {
    validate_name(&name.name.0)?;
    let project_path = project_path_at(home, &name.project);
    if !project_path.exists() {
        return Err(StoreError::ProjectNotFound { path: project_path });
    }

    let now = Utc::now();
    let target = match load_target_at(home, name) {
        Ok(mut existing) => {
            existing.source_hydrator = Some(source_hydrator);
            existing.updated_at = now;
            existing
        }
        Err(StoreError::TargetNotFound { .. }) => Target {
            name: name.name.clone(),
            project: name.project.clone(),
            source_hydrator: Some(source_hydrator),
            hydrate_requested: false,
            status: HydratorStatus::default(),
            created_at: now,
            updated_at: now,
        },
        Err(err) => return Err(err),
    };
    save_target_at(home, &target)?;
    Ok(target)
}

/// `add_target_at` convenience wrapper.
pub fn add_target(
    name: &QualifiedName,
    source_hydrator: SourceHydrator,
) -> Result<Target, StoreError> {
    add_target_at(&home()?, name, source_hydrator)
}

// ---------------------------------------------------------------------------
// 4. Status
// ---------------------------------------------------------------------------

/// Record `new_status` on the target `orig` was read from.
///
/// Idempotent: returns `Ok(false)` without writing when the status on disk
/// (or the caller's snapshot) already equals `new_status`. The target is
/// re-read before writing so concurrent spec edits are not clobbered.
/// Starting a new hydration (phase `Hydrating`) consumes a pending manual
/// request.
pub fn persist_status_at(
    home: &Path,
    orig: &Target,
    new_status: &HydratorStatus,
) -> Result<bool, StoreError> {
    if orig.status == *new_status && !consumes_request(orig, new_status) {
        return Ok(false);
    }

    let mut current = load_target_at(home, &orig.qualified_name())?;
    if current.status == *new_status && !consumes_request(&current, new_status) {
        return Ok(false);
    }

    if consumes_request(&current, new_status) {
        current.hydrate_requested = false;
    }
    current.status = new_status.clone();
    current.updated_at = Utc::now();
    save_target_at(home, &current)?;
    Ok(true)
}

/// `persist_status_at` convenience wrapper.
pub fn persist_status(orig: &Target, new_status: &HydratorStatus) -> Result<bool, StoreError> {
    persist_status_at(&home()?, orig, new_status)
}

/// Flag a target for hydration on its next trigger evaluation.
pub fn request_hydration_at(home: &Path, name: &QualifiedName) -> Result<Target, StoreError> {
    let mut target = load_target_at(home, name)?;
    if !target.hydrate_requested {
        target.hydrate_requested = true;
        target.updated_at = Utc::now();
        save_target_at(home, &target)?;
    }
    Ok(target)
}

/// `request_hydration_at` convenience wrapper.
pub fn request_hydration(name: &QualifiedName) -> Result<Target, StoreError> {
    request_hydration_at(&home()?, name)
}

fn consumes_request(target: &Target, new_status: &HydratorStatus) -> bool {
    target.hydrate_requested
        && matches!(
            new_status.current_operation.as_ref().map(|op| op.phase),
            Some(HydrationPhase::Hydrating)
        )
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Names become path components: non-empty, no separators, not the index file.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.contains('/') || name.contains('\\') {
        Some("must not contain path separators")
    } else if name.starts_with('.') {
        Some("must not start with '.'")
    } else if name == "project" {
        Some("'project' is reserved")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(StoreError::InvalidName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

fn write_yaml_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!("{file_name}.tmp"));

    let yaml = serde_yaml::to_string(value)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DrySource, HydrationOperation, SyncSource};
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn guestbook() -> QualifiedName {
        QualifiedName::new("platform", "guestbook")
    }

    fn hydrator() -> SourceHydrator {
        SourceHydrator {
            dry_source: DrySource {
                repo_url: "/srv/dry".to_string(),
                target_revision: "main".to_string(),
                path: "guestbook".to_string(),
            },
            sync_source: SyncSource {
                target_branch: "env/prod".to_string(),
                path: "guestbook".to_string(),
            },
            hydrate_to: None,
        }
    }

    fn seeded_home() -> TempDir {
        let home = make_home();
        add_project_at(home.path(), ProjectName::from("platform"), vec!["*".into()])
            .expect("project");
        add_target_at(home.path(), &guestbook(), hydrator()).expect("target");
        home
    }

    fn hydrating_status() -> HydratorStatus {
        HydratorStatus {
            current_operation: Some(HydrationOperation {
                phase: HydrationPhase::Hydrating,
                started_at: Utc::now(),
                finished_at: None,
                dry_sha: "abc123".to_string(),
                hydrated_sha: None,
                message: String::new(),
                source_hydrator: hydrator(),
            }),
            last_successful_operation: None,
        }
    }

    #[test]
    fn target_path_is_correct() {
        let home = make_home();
        let path = target_path_at(home.path(), &guestbook());
        assert!(path.ends_with(".hydra/projects/platform/guestbook.yaml"));
    }

    #[test]
    fn project_dir_created_with_perms() {
        let home = make_home();
        let dir = project_dir_at(home.path(), &ProjectName::from("platform")).expect("dir");
        assert!(dir.exists());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dir).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o700);
        }
    }

    #[test]
    fn add_target_requires_project() {
        let home = make_home();
        let err = add_target_at(home.path(), &guestbook(), hydrator()).unwrap_err();
        assert!(matches!(err, StoreError::ProjectNotFound { .. }));
    }

    #[test]
    fn add_target_keeps_existing_status() {
        let home = seeded_home();
        let target = load_target_at(home.path(), &guestbook()).expect("load");
        persist_status_at(home.path(), &target, &hydrating_status()).expect("persist");

        let mut changed = hydrator();
        changed.sync_source.path = "guestbook-v2".to_string();
        let updated = add_target_at(home.path(), &guestbook(), changed.clone()).expect("re-add");
        assert_eq!(updated.source_hydrator, Some(changed));
        assert!(updated.status.current_operation.is_some());
    }

    #[test]
    fn list_targets_skips_project_index() {
        let home = seeded_home();
        let targets = list_targets_at(home.path()).expect("list");
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, crate::types::TargetName::from("guestbook"));
    }

    #[test]
    fn list_targets_empty_when_no_projects() {
        let home = make_home();
        assert!(list_targets_at(home.path()).expect("list").is_empty());
    }

    #[test]
    fn persist_status_is_idempotent() {
        let home = seeded_home();
        let target = load_target_at(home.path(), &guestbook()).expect("load");
        let status = hydrating_status();

        assert!(persist_status_at(home.path(), &target, &status).expect("first"));
        let reloaded = load_target_at(home.path(), &guestbook()).expect("reload");
        assert!(!persist_status_at(home.path(), &reloaded, &status).expect("second"));
        // A stale caller snapshot still collapses against what is on disk.
        assert!(!persist_status_at(home.path(), &target, &status).expect("stale"));
    }

    #[test]
    fn hydrating_status_consumes_manual_request() {
        let home = seeded_home();
        let requested = request_hydration_at(home.path(), &guestbook()).expect("request");
        assert!(requested.hydrate_requested);

        persist_status_at(home.path(), &requested, &hydrating_status()).expect("persist");
        let reloaded = load_target_at(home.path(), &guestbook()).expect("reload");
        assert!(!reloaded.hydrate_requested);
        assert!(reloaded.status.current_operation.is_some());
    }

    #[test]
    fn invalid_names_rejected() {
        for name in ["", "a/b", ".hidden", "project"] {
            let err = validate_name(name).unwrap_err();
            assert!(matches!(err, StoreError::InvalidName { .. }), "name {name:?}");
        }
        assert!(validate_name("guestbook").is_ok());
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = seeded_home();
        let tmp = target_path_at(home.path(), &guestbook()).with_file_name("guestbook.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(StoreError::HomeNotFound.to_string().contains("home directory"));
    }
}
