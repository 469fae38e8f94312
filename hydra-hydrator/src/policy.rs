//! Trigger policy: does a target need hydrating?
//!
//! Reason precedence (first match wins):
//! 1. `NotConfigured` (no source hydrator on the target)
//! 2. `Requested` (manual hydration request pending)
//! 3. `NoPreviousOperation`
//! 4. `SpecChanged` (live configuration differs from the operation snapshot)
//! 5. `RevisionChanged` (upstream advanced past the operation's dry SHA)
//! 6. `RetryFailed` (failed strictly more than [`FAILURE_BACKOFF`] ago)
//! 7. `Expired` (operation started more than the status timeout ago)
//!
//! `None` means no hydration is needed.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use hydra_core::{HydrationPhase, Target};

/// Failures younger than this are not retried.
pub const FAILURE_BACKOFF: Duration = Duration::from_secs(2 * 60);

/// Why a target needs hydrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationReason {
    NotConfigured,
    Requested,
    NoPreviousOperation,
    SpecChanged,
    RevisionChanged,
    RetryFailed,
    Expired,
}

impl HydrationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HydrationReason::NotConfigured => "source hydrator not configured",
            HydrationReason::Requested => "hydrate requested",
            HydrationReason::NoPreviousOperation => "no previous hydrate operation",
            HydrationReason::SpecChanged => "spec.sourceHydrator differs",
            HydrationReason::RevisionChanged => "revision differs",
            HydrationReason::RetryFailed => {
                "previous hydrate operation failed more than 2 minutes ago"
            }
            HydrationReason::Expired => "hydration expired",
        }
    }
}

impl fmt::Display for HydrationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`needs_hydration_at`] evaluated at the current time.
pub fn needs_hydration(
    target: &Target,
    status_timeout: Duration,
    latest_revision: &str,
) -> Option<HydrationReason> {
    needs_hydration_at(target, status_timeout, latest_revision, Utc::now())
}

/// Decide whether `target` needs hydrating at `now`. Pure.
pub fn needs_hydration_at(
    target: &Target,
    status_timeout: Duration,
    latest_revision: &str,
    now: DateTime<Utc>,
) -> Option<HydrationReason> {
    let Some(hydrator) = target.source_hydrator.as_ref() else {
        return Some(HydrationReason::NotConfigured);
    };

    if target.hydrate_requested {
        return Some(HydrationReason::Requested);
    }

    let Some(operation) = target.status.current_operation.as_ref() else {
        return Some(HydrationReason::NoPreviousOperation);
    };

    if operation.source_hydrator != *hydrator {
        return Some(HydrationReason::SpecChanged);
    }

    if operation.dry_sha != latest_revision {
        return Some(HydrationReason::RevisionChanged);
    }

    if operation.phase == HydrationPhase::Failed {
        // A failed operation without a finish time cannot be aged; the
        // expiry rule below still covers it.
        if let Some(finished_at) = operation.finished_at {
            if elapsed_beyond(finished_at, FAILURE_BACKOFF, now) {
                return Some(HydrationReason::RetryFailed);
            }
        }
    }

    if elapsed_beyond(operation.started_at, status_timeout, now) {
        return Some(HydrationReason::Expired);
    }

    None
}

/// `now - since > window`, exclusive at the boundary. A window too large to
/// represent never elapses.
fn elapsed_beyond(since: DateTime<Utc>, window: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| since.checked_add_signed(window))
    {
        Some(deadline) => deadline < now,
        None => false,
    }
}
