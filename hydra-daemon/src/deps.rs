//! [`Dependencies`] over the local store, dry sources and config.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use hydra_core::{
    store, HydratorConfig, HydratorStatus, ManifestSource, Project, QualifiedName,
    RepoCredentials, Target,
};
use hydra_hydrator::{BoxError, Dependencies, HydrationQueueKey, RenderedManifests};

use crate::queue::HydrationQueue;

pub struct LocalDependencies {
    home: PathBuf,
    config: HydratorConfig,
    queue: Arc<HydrationQueue<HydrationQueueKey>>,
    refresh_tx: UnboundedSender<QualifiedName>,
}

impl LocalDependencies {
    pub fn new(
        home: impl Into<PathBuf>,
        config: HydratorConfig,
        queue: Arc<HydrationQueue<HydrationQueueKey>>,
        refresh_tx: UnboundedSender<QualifiedName>,
    ) -> Self {
        Self {
            home: home.into(),
            config,
            queue,
            refresh_tx,
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn config(&self) -> &HydratorConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<HydrationQueue<HydrationQueueKey>> {
        &self.queue
    }
}

impl Dependencies for LocalDependencies {
    fn processable_project(&self, target: &Target) -> Result<Project, BoxError> {
        Ok(store::load_project_at(&self.home, &target.project)?)
    }

    fn processable_targets(&self) -> Result<Vec<Target>, BoxError> {
        Ok(store::list_targets_at(&self.home)?)
    }

    fn repo_objects(
        &self,
        target: &Target,
        source: &ManifestSource,
        revision: &str,
        _project: &Project,
    ) -> Result<RenderedManifests, BoxError> {
        // A directory source only has its working tree; the revision is
        // informational.
        tracing::debug!(target = %target.qualified_name(), revision, source = %source, "loading manifests");
        let objects = hydra_source::load_manifests(&source.repo_url, &source.path)?;
        Ok(RenderedManifests {
            objects,
            commands: Vec::new(),
        })
    }

    fn write_credentials(&self, repo_url: &str) -> Result<Option<RepoCredentials>, BoxError> {
        Ok(self.config.credentials_for(repo_url).cloned())
    }

    fn resolve_revision(&self, repo_url: &str, target_revision: &str) -> Result<String, BoxError> {
        Ok(hydra_source::resolve_revision(repo_url, target_revision)?)
    }

    fn request_refresh(&self, name: &QualifiedName) {
        if self.refresh_tx.send(name.clone()).is_err() {
            tracing::warn!(target = %name, "refresh recorder is gone; dropping refresh request");
        }
    }

    fn persist_hydrator_status(
        &self,
        orig: &Target,
        new_status: &HydratorStatus,
    ) -> Result<(), BoxError> {
        store::persist_status_at(&self.home, orig, new_status)?;
        Ok(())
    }

    fn add_hydration_queue_item(&self, key: HydrationQueueKey) {
        self.queue.add(key);
    }
}
