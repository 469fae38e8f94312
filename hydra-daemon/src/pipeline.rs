//! Wiring of the hydration engine over local collaborators, plus the
//! one-shot run used by `hydra run` and the tests.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::mpsc;

use hydra_commit::LocalCommitService;
use hydra_core::{config, store, HydratorConfig, QualifiedName, Target};
use hydra_hydrator::{BatchOutcome, HydrationQueueKey, Hydrator, TriggerOutcome};

use crate::deps::LocalDependencies;
use crate::error::DaemonError;
use crate::queue::HydrationQueue;

pub type LocalHydrator = Hydrator<LocalDependencies, LocalCommitService>;
pub type KeyQueue = HydrationQueue<HydrationQueueKey>;

/// A target the trigger step scheduled.
#[derive(Debug, Clone, Serialize)]
pub struct EnqueuedTarget {
    pub target: String,
    pub reason: String,
    pub key: String,
}

/// Result of one batch, flattened for logs and the socket.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub key: String,
    pub outcome: &'static str,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hydrated_sha: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BatchReport {
    pub fn new(key: &HydrationQueueKey, outcome: BatchOutcome) -> Self {
        let key = key.to_string();
        match outcome {
            BatchOutcome::ResolutionFailed { message } => Self {
                key,
                outcome: "resolution_failed",
                targets: Vec::new(),
                dry_sha: None,
                hydrated_sha: None,
                message: Some(message),
            },
            BatchOutcome::Empty => Self {
                key,
                outcome: "empty",
                targets: Vec::new(),
                dry_sha: None,
                hydrated_sha: None,
                message: None,
            },
            BatchOutcome::Hydrated {
                targets,
                dry_sha,
                hydrated_sha,
            } => Self {
                key,
                outcome: "hydrated",
                targets: names(&targets),
                dry_sha: Some(dry_sha),
                hydrated_sha: Some(hydrated_sha),
                message: None,
            },
            BatchOutcome::Failed {
                targets,
                dry_sha,
                message,
            } => Self {
                key,
                outcome: "failed",
                targets: names(&targets),
                dry_sha: Some(dry_sha),
                hydrated_sha: None,
                message: Some(message),
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, "failed" | "resolution_failed")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub enqueued: Vec<EnqueuedTarget>,
    pub batches: Vec<BatchReport>,
    pub refreshed: Vec<String>,
    pub duration_ms: u128,
}

impl RunSummary {
    pub fn failed_batches(&self) -> usize {
        self.batches.iter().filter(|b| b.is_failure()).count()
    }
}

/// Build the engine over the store under `home` and the configured
/// destination root.
pub fn build_hydrator(
    home: &Path,
    config: HydratorConfig,
    queue: Arc<KeyQueue>,
    refresh_tx: mpsc::UnboundedSender<QualifiedName>,
) -> LocalHydrator {
    let commit = LocalCommitService::new(config.destination_root(home));
    let timeout = config.status_timeout();
    let deps = LocalDependencies::new(home, config, queue, refresh_tx);
    Hydrator::new(deps, commit, timeout)
}

/// Run the trigger step for one target. `None` when nothing was scheduled.
pub fn trigger_target(hydrator: &LocalHydrator, target: &Target) -> Option<EnqueuedTarget> {
    match hydrator.process_target_trigger(target) {
        TriggerOutcome::Enqueued { reason, key } => Some(EnqueuedTarget {
            target: target.qualified_name().to_string(),
            reason: reason.to_string(),
            key: key.to_string(),
        }),
        _ => None,
    }
}

/// Run the trigger step for every stored target.
pub fn trigger_sweep(hydrator: &LocalHydrator) -> Result<Vec<EnqueuedTarget>, DaemonError> {
    let targets = store::list_targets_at(hydrator.dependencies().home())?;
    Ok(targets
        .iter()
        .filter_map(|target| trigger_target(hydrator, target))
        .collect())
}

/// Process one key taken from the queue and release it.
pub fn process_key(
    hydrator: &LocalHydrator,
    queue: &KeyQueue,
    key: HydrationQueueKey,
) -> BatchReport {
    let outcome = hydrator.process_hydration_queue_item(&key);
    queue.done(&key);
    let report = BatchReport::new(&key, outcome);
    if report.is_failure() {
        tracing::warn!(key = %report.key, outcome = report.outcome, "batch did not hydrate");
    } else {
        tracing::info!(
            key = %report.key,
            outcome = report.outcome,
            targets = report.targets.len(),
            "batch processed"
        );
    }
    report
}

/// Process queued keys on the current thread until the queue is empty.
pub fn drain(hydrator: &LocalHydrator, queue: &KeyQueue) -> Vec<BatchReport> {
    let mut reports = Vec::new();
    while let Some(key) = queue.try_get() {
        reports.push(process_key(hydrator, queue, key));
    }
    reports
}

/// One trigger sweep followed by a synchronous drain of every scheduled
/// batch.
pub fn run_once(home: &Path) -> Result<RunSummary, DaemonError> {
    let started = Instant::now();
    let config = config::load_at(home)?;
    let queue = Arc::new(KeyQueue::new());
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    let hydrator = build_hydrator(home, config, queue.clone(), refresh_tx);

    let enqueued = trigger_sweep(&hydrator)?;
    let batches = drain(&hydrator, &queue);

    let mut refreshed = Vec::new();
    while let Ok(name) = refresh_rx.try_recv() {
        refreshed.push(name.to_string());
    }

    Ok(RunSummary {
        enqueued,
        batches,
        refreshed,
        duration_ms: started.elapsed().as_millis(),
    })
}

fn names(targets: &[QualifiedName]) -> Vec<String> {
    targets.iter().map(ToString::to_string).collect()
}
