//! The two-stage pipeline: per-target trigger, per-key batch.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use hydra_core::{HydratorStatus, QualifiedName, Target};

use crate::batch;
use crate::deps::{CommitService, Dependencies};
use crate::error::HydrationError;
use crate::grouping::{hydration_queue_key, HydrationQueueKey};
use crate::policy::{needs_hydration, HydrationReason};
use crate::resolver::{relevant_targets, RelevantTarget};
use crate::status;

/// What the trigger step did for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    NotConfigured,
    /// The upstream revision could not be resolved; nothing changed.
    RevisionUnresolved,
    UpToDate,
    /// Hydration is due but the upstream revision resolved to nothing.
    MissingRevision,
    Enqueued {
        reason: HydrationReason,
        key: HydrationQueueKey,
    },
}

/// What the batch step did for one grouping key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Membership could not be resolved; no status was changed.
    ResolutionFailed { message: String },
    /// No live target belongs to the key; nothing was written.
    Empty,
    Hydrated {
        targets: Vec<QualifiedName>,
        dry_sha: String,
        hydrated_sha: String,
    },
    Failed {
        targets: Vec<QualifiedName>,
        dry_sha: String,
        message: String,
    },
}

pub struct Hydrator<D, C> {
    dependencies: D,
    commit_service: C,
    status_refresh_timeout: Duration,
}

impl<D: Dependencies, C: CommitService> Hydrator<D, C> {
    pub fn new(dependencies: D, commit_service: C, status_refresh_timeout: Duration) -> Self {
        Self {
            dependencies,
            commit_service,
            status_refresh_timeout,
        }
    }

    pub fn dependencies(&self) -> &D {
        &self.dependencies
    }

    pub fn commit_service(&self) -> &C {
        &self.commit_service
    }

    /// Decide whether `target` needs hydrating and, if so, record a new
    /// `Hydrating` operation and schedule its grouping key.
    pub fn process_target_trigger(&self, target: &Target) -> TriggerOutcome {
        let Some(hydrator) = target.source_hydrator.as_ref() else {
            return TriggerOutcome::NotConfigured;
        };
        let name = target.qualified_name();
        debug!(target = %name, "processing hydrate trigger");

        let latest_revision = match self
            .dependencies
            .resolve_revision(&hydrator.dry_source.repo_url, &hydrator.dry_source.target_revision)
        {
            Ok(revision) => revision,
            Err(err) => {
                error!(target = %name, error = %err, "failed to check whether dry source has changed; skipping");
                return TriggerOutcome::RevisionUnresolved;
            }
        };

        let Some(reason) = needs_hydration(target, self.status_refresh_timeout, &latest_revision)
        else {
            return TriggerOutcome::UpToDate;
        };
        if latest_revision.is_empty() {
            error!(target = %name, "dry source has not been resolved; skipping");
            return TriggerOutcome::MissingRevision;
        }

        info!(target = %name, reason = %reason, dry_sha = %latest_revision, "hydrating target");

        let new_status = status::start_operation(&target.status, hydrator, &latest_revision, Utc::now());
        self.persist(target, &new_status);

        let key = hydration_queue_key(hydrator);
        self.dependencies.add_hydration_queue_item(key.clone());
        TriggerOutcome::Enqueued { reason, key }
    }

    /// Hydrate every live target for `key` as one commit and record the
    /// shared outcome on each of them.
    pub fn process_hydration_queue_item(&self, key: &HydrationQueueKey) -> BatchOutcome {
        let span = tracing::info_span!(
            "hydrate_batch",
            source_repo_url = %key.source_repo_url,
            source_target_revision = %key.source_target_revision,
            destination_branch = %key.destination_branch,
        );
        let _enter = span.enter();

        let targets = match relevant_targets(&self.dependencies, key) {
            Ok(targets) => targets,
            Err(err) => {
                error!(error = %err, "failed to get relevant targets for hydration");
                return BatchOutcome::ResolutionFailed {
                    message: err.to_string(),
                };
            }
        };
        if targets.is_empty() {
            debug!("no targets to hydrate");
            return BatchOutcome::Empty;
        }
        let names: Vec<QualifiedName> = targets.iter().map(|r| r.target.qualified_name()).collect();

        let dry_sha = match self
            .dependencies
            .resolve_revision(&key.source_repo_url, &key.source_target_revision)
        {
            Ok(revision) => revision,
            Err(err) => {
                let message = HydrationError::ResolveRevision(err).to_string();
                return self.fail_batch(&targets, names, String::new(), message);
            }
        };

        match batch::hydrate(&self.dependencies, &self.commit_service, &targets, &dry_sha) {
            Ok(hydrated_sha) => {
                debug!(target_count = targets.len(), hydrated_sha = %hydrated_sha, "hydrated targets");
                self.complete_batch(&targets, &dry_sha, &hydrated_sha);
                BatchOutcome::Hydrated {
                    targets: names,
                    dry_sha,
                    hydrated_sha,
                }
            }
            Err(err) => self.fail_batch(&targets, names, dry_sha, err.to_string()),
        }
    }

    fn fail_batch(
        &self,
        targets: &[RelevantTarget],
        names: Vec<QualifiedName>,
        dry_sha: String,
        error: String,
    ) -> BatchOutcome {
        error!(target_count = targets.len(), error = %error, "failed to hydrate targets");
        let message = status::failure_message(&dry_sha, &error);
        let now = Utc::now();
        for relevant in targets {
            let new_status = status::fail_operation(
                &relevant.target.status,
                &relevant.hydrator,
                &dry_sha,
                message.clone(),
                now,
            );
            self.persist(&relevant.target, &new_status);
        }
        BatchOutcome::Failed {
            targets: names,
            dry_sha,
            message,
        }
    }

    fn complete_batch(&self, targets: &[RelevantTarget], dry_sha: &str, hydrated_sha: &str) {
        let now = Utc::now();
        for relevant in targets {
            let new_status = status::complete_operation(
                &relevant.target.status,
                &relevant.hydrator,
                dry_sha,
                hydrated_sha,
                now,
            );
            self.persist(&relevant.target, &new_status);
            self.dependencies
                .request_refresh(&relevant.target.qualified_name());
        }
    }

    fn persist(&self, orig: &Target, new_status: &HydratorStatus) {
        if let Err(err) = self.dependencies.persist_hydrator_status(orig, new_status) {
            warn!(target = %orig.qualified_name(), error = %err, "failed to persist hydrator status");
        }
    }
}
