//! Phase transitions of a target's hydrator status. Pure; callers persist.

use chrono::{DateTime, Utc};

use hydra_core::{
    HydrationOperation, HydrationPhase, HydratorStatus, SourceHydrator,
    SuccessfulHydrationOperation,
};

/// A fresh `Hydrating` operation replacing whatever was current.
pub fn start_operation(
    status: &HydratorStatus,
    hydrator: &SourceHydrator,
    dry_sha: &str,
    now: DateTime<Utc>,
) -> HydratorStatus {
    HydratorStatus {
        current_operation: Some(HydrationOperation {
            phase: HydrationPhase::Hydrating,
            started_at: now,
            finished_at: None,
            dry_sha: dry_sha.to_string(),
            hydrated_sha: None,
            message: String::new(),
            source_hydrator: hydrator.clone(),
        }),
        last_successful_operation: status.last_successful_operation.clone(),
    }
}

pub fn failure_message(attempted_sha: &str, error: &dyn std::fmt::Display) -> String {
    format!("Failed to hydrate revision {attempted_sha}: {error}")
}

/// Mark the current operation `Failed`. The recorded dry SHA and the last
/// successful operation are left untouched.
pub fn fail_operation(
    status: &HydratorStatus,
    hydrator: &SourceHydrator,
    attempted_sha: &str,
    message: String,
    now: DateTime<Utc>,
) -> HydratorStatus {
    let mut operation = current_or_synthesized(status, hydrator, attempted_sha, now);
    operation.phase = HydrationPhase::Failed;
    operation.finished_at = Some(now);
    operation.hydrated_sha = None;
    operation.message = message;

    HydratorStatus {
        current_operation: Some(operation),
        last_successful_operation: status.last_successful_operation.clone(),
    }
}

/// Mark the current operation `Hydrated` and record it as the last success.
/// The start time and configuration snapshot are carried over.
pub fn complete_operation(
    status: &HydratorStatus,
    hydrator: &SourceHydrator,
    dry_sha: &str,
    hydrated_sha: &str,
    now: DateTime<Utc>,
) -> HydratorStatus {
    let previous = current_or_synthesized(status, hydrator, dry_sha, now);
    let operation = HydrationOperation {
        phase: HydrationPhase::Hydrated,
        started_at: previous.started_at,
        finished_at: Some(now),
        dry_sha: dry_sha.to_string(),
        hydrated_sha: Some(hydrated_sha.to_string()),
        message: String::new(),
        source_hydrator: previous.source_hydrator,
    };
    let last_success = SuccessfulHydrationOperation {
        dry_sha: operation.dry_sha.clone(),
        hydrated_sha: hydrated_sha.to_string(),
        source_hydrator: operation.source_hydrator.clone(),
    };

    HydratorStatus {
        current_operation: Some(operation),
        last_successful_operation: Some(last_success),
    }
}

// A target can join a batch before its own trigger step ran; it then has no
// current operation to finish.
fn current_or_synthesized(
    status: &HydratorStatus,
    hydrator: &SourceHydrator,
    dry_sha: &str,
    now: DateTime<Utc>,
) -> HydrationOperation {
    match &status.current_operation {
        Some(operation) => operation.clone(),
        None => HydrationOperation {
            phase: HydrationPhase::Hydrating,
            started_at: now,
            finished_at: None,
            dry_sha: dry_sha.to_string(),
            hydrated_sha: None,
            message: String::new(),
            source_hydrator: hydrator.clone(),
        },
    }
}
