//! Relevant-set resolution for one grouping key.

use std::collections::HashSet;

use tracing::warn;

use hydra_core::{Project, SourceHydrator, Target};

use crate::deps::Dependencies;
use crate::error::HydrationError;
use crate::grouping::{dedup_fingerprint, HydrationQueueKey};

/// A target admitted into a batch, with the configuration and project it was
/// admitted under.
#[derive(Debug, Clone)]
pub struct RelevantTarget {
    pub target: Target,
    pub hydrator: SourceHydrator,
    pub project: Project,
}

/// Re-derive the live set of targets for `key`.
///
/// Targets whose project does not permit their source are skipped. A project
/// lookup failure or two targets sharing a destination path abort the whole
/// resolution.
pub fn relevant_targets<D: Dependencies + ?Sized>(
    deps: &D,
    key: &HydrationQueueKey,
) -> Result<Vec<RelevantTarget>, HydrationError> {
    let targets = deps
        .processable_targets()
        .map_err(HydrationError::ListTargets)?;

    let mut seen = HashSet::with_capacity(targets.len());
    let mut relevant = Vec::new();

    for target in targets {
        let Some(hydrator) = target.source_hydrator.clone() else {
            continue;
        };
        if !key.matches(&hydrator) {
            continue;
        }

        let project =
            deps.processable_project(&target)
                .map_err(|source| HydrationError::Project {
                    project: target.project.to_string(),
                    target: target.qualified_name().to_string(),
                    source,
                })?;

        let permitted = target
            .source()
            .is_some_and(|source| project.is_source_permitted(&source));
        if !permitted {
            warn!(
                target = %target.qualified_name(),
                repo = %hydrator.dry_source.repo_url,
                "target is not permitted to use its source; skipping"
            );
            continue;
        }

        let fingerprint = dedup_fingerprint(&hydrator);
        if !seen.insert(fingerprint.clone()) {
            return Err(HydrationError::DuplicateDestination(fingerprint));
        }

        relevant.push(RelevantTarget {
            target,
            hydrator,
            project,
        });
    }

    Ok(relevant)
}
