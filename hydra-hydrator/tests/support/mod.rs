//! In-memory collaborators for driving the engine in tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::json;

use hydra_core::{
    DrySource, HydrateTo, HydrationPhase, HydratorStatus, ManifestSource, Project, ProjectName, QualifiedName,
    RepoCredentials, SourceHydrator, SyncSource, Target, TargetName,
};
use hydra_hydrator::{
    BoxError, CommitRequest, CommitService, Dependencies, HydrationQueueKey, RenderedManifests,
};

pub const REPO: &str = "https://git.example.com/platform.git";

pub fn hydrator(path: &str, branch: &str) -> SourceHydrator {
    SourceHydrator {
        dry_source: DrySource {
            repo_url: REPO.to_string(),
            target_revision: "main".to_string(),
            path: format!("apps/{path}"),
        },
        sync_source: SyncSource {
            target_branch: branch.to_string(),
            path: path.to_string(),
        },
        hydrate_to: None,
    }
}

pub fn staged(path: &str, branch: &str, hydrate_to: &str) -> SourceHydrator {
    let mut h = hydrator(path, branch);
    h.hydrate_to = Some(HydrateTo {
        target_branch: hydrate_to.to_string(),
    });
    h
}

pub fn target(project: &str, name: &str, hydrator: SourceHydrator) -> Target {
    let now = Utc::now();
    Target {
        name: TargetName::from(name),
        project: ProjectName::from(project),
        source_hydrator: Some(hydrator),
        hydrate_requested: false,
        status: HydratorStatus::default(),
        created_at: now,
        updated_at: now,
    }
}

pub fn project(name: &str, patterns: &[&str]) -> Project {
    Project {
        name: ProjectName::from(name),
        source_repos: patterns.iter().map(|p| p.to_string()).collect(),
        created_at: Utc::now(),
    }
}

pub fn key(branch: &str) -> HydrationQueueKey {
    HydrationQueueKey {
        source_repo_url: REPO.to_string(),
        source_target_revision: "main".to_string(),
        destination_branch: branch.to_string(),
    }
}

fn err(message: &str) -> BoxError {
    message.to_string().into()
}

#[derive(Default)]
struct State {
    targets: Vec<Target>,
    projects: HashMap<ProjectName, Project>,
    revision: Option<String>,
    revision_error: Option<String>,
    list_error: Option<String>,
    objects_error: HashSet<QualifiedName>,
    persist_error: HashSet<QualifiedName>,
    credentials: Option<RepoCredentials>,
    credentials_error: Option<String>,
    writes: Vec<(QualifiedName, HydratorStatus)>,
    refreshes: Vec<QualifiedName>,
    enqueued: Vec<HydrationQueueKey>,
    fetched: Vec<(QualifiedName, ManifestSource, String)>,
}

/// Records every side effect; persistence is idempotent like the real store.
#[derive(Default)]
pub struct FakeDeps {
    state: Mutex<State>,
}

impl FakeDeps {
    pub fn new(revision: &str) -> Self {
        let deps = Self::default();
        deps.set_revision(revision);
        deps.add_project(project("platform", &["*"]));
        deps
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn add_target(&self, target: Target) {
        self.with(|s| s.targets.push(target));
    }

    pub fn add_project(&self, project: Project) {
        self.with(|s| {
            s.projects.insert(project.name.clone(), project);
        });
    }

    pub fn set_revision(&self, revision: &str) {
        self.with(|s| s.revision = Some(revision.to_string()));
    }

    pub fn fail_revision(&self, message: &str) {
        self.with(|s| s.revision_error = Some(message.to_string()));
    }

    pub fn fail_listing(&self, message: &str) {
        self.with(|s| s.list_error = Some(message.to_string()));
    }

    pub fn fail_objects_for(&self, name: QualifiedName) {
        self.with(|s| {
            s.objects_error.insert(name);
        });
    }

    pub fn fail_persist_for(&self, name: QualifiedName) {
        self.with(|s| {
            s.persist_error.insert(name);
        });
    }

    pub fn set_credentials(&self, credentials: RepoCredentials) {
        self.with(|s| s.credentials = Some(credentials));
    }

    pub fn fail_credentials(&self, message: &str) {
        self.with(|s| s.credentials_error = Some(message.to_string()));
    }

    pub fn target(&self, name: &QualifiedName) -> Target {
        self.with(|s| {
            s.targets
                .iter()
                .find(|t| &t.qualified_name() == name)
                .cloned()
                .expect("target registered")
        })
    }

    pub fn writes(&self) -> Vec<(QualifiedName, HydratorStatus)> {
        self.with(|s| s.writes.clone())
    }

    pub fn refreshes(&self) -> Vec<QualifiedName> {
        self.with(|s| s.refreshes.clone())
    }

    pub fn enqueued(&self) -> Vec<HydrationQueueKey> {
        self.with(|s| s.enqueued.clone())
    }

    pub fn fetched(&self) -> Vec<(QualifiedName, ManifestSource, String)> {
        self.with(|s| s.fetched.clone())
    }

    pub fn clear_log(&self) {
        self.with(|s| {
            s.writes.clear();
            s.refreshes.clear();
            s.enqueued.clear();
            s.fetched.clear();
        });
    }
}

impl Dependencies for FakeDeps {
    fn processable_project(&self, target: &Target) -> Result<Project, BoxError> {
        self.with(|s| {
            s.projects
                .get(&target.project)
                .cloned()
                .ok_or_else(|| err("project not found"))
        })
    }

    fn processable_targets(&self) -> Result<Vec<Target>, BoxError> {
        self.with(|s| match &s.list_error {
            Some(message) => Err(err(message)),
            None => Ok(s.targets.clone()),
        })
    }

    fn repo_objects(
        &self,
        target: &Target,
        source: &ManifestSource,
        revision: &str,
        _project: &Project,
    ) -> Result<RenderedManifests, BoxError> {
        let name = target.qualified_name();
        self.with(|s| {
            s.fetched.push((name.clone(), source.clone(), revision.to_string()));
            if s.objects_error.contains(&name) {
                return Err(err("manifest generation failed"));
            }
            Ok(RenderedManifests {
                objects: vec![json!({
                    "kind": "ConfigMap",
                    "apiVersion": "v1",
                    "metadata": {"name": name.name.0},
                })],
                commands: vec![format!("render {}", source.path)],
            })
        })
    }

    fn write_credentials(&self, _repo_url: &str) -> Result<Option<RepoCredentials>, BoxError> {
        self.with(|s| match &s.credentials_error {
            Some(message) => Err(err(message)),
            None => Ok(s.credentials.clone()),
        })
    }

    fn resolve_revision(&self, _repo_url: &str, _target_revision: &str) -> Result<String, BoxError> {
        self.with(|s| match &s.revision_error {
            Some(message) => Err(err(message)),
            None => Ok(s.revision.clone().unwrap_or_default()),
        })
    }

    fn request_refresh(&self, name: &QualifiedName) {
        self.with(|s| s.refreshes.push(name.clone()));
    }

    fn persist_hydrator_status(
        &self,
        orig: &Target,
        new_status: &HydratorStatus,
    ) -> Result<(), BoxError> {
        let name = orig.qualified_name();
        self.with(|s| {
            if s.persist_error.contains(&name) {
                return Err(err("store unavailable"));
            }
            let Some(stored) = s.targets.iter_mut().find(|t| t.qualified_name() == name) else {
                return Err(err("target not found"));
            };
            if stored.status == *new_status {
                return Ok(());
            }
            let starts = new_status
                .current_operation
                .as_ref()
                .is_some_and(|op| op.phase == HydrationPhase::Hydrating);
            if starts {
                stored.hydrate_requested = false;
            }
            stored.status = new_status.clone();
            s.writes.push((name, new_status.clone()));
            Ok(())
        })
    }

    fn add_hydration_queue_item(&self, key: HydrationQueueKey) {
        self.with(|s| s.enqueued.push(key));
    }
}

/// Commit service that records requests and answers with a fixed result.
pub struct FakeCommit {
    requests: Mutex<Vec<CommitRequest>>,
    result: Mutex<Result<String, String>>,
}

impl FakeCommit {
    pub fn succeeding(sha: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            result: Mutex::new(Ok(sha.to_string())),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            result: Mutex::new(Err(message.to_string())),
        }
    }

    pub fn set_result(&self, result: Result<&str, &str>) {
        *self.result.lock().unwrap() = result.map(str::to_string).map_err(str::to_string);
    }

    pub fn requests(&self) -> Vec<CommitRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CommitService for FakeCommit {
    fn commit_hydrated_manifests(&self, request: &CommitRequest) -> Result<String, BoxError> {
        self.requests.lock().unwrap().push(request.clone());
        self.result.lock().unwrap().clone().map_err(|m| err(&m))
    }
}
