//! Grouping keys and destination fingerprints.
//!
//! Targets that read the same dry source and write the same destination
//! branch are hydrated together in one commit. Within such a group every
//! target must write a distinct path.

use std::fmt;

use serde::{Deserialize, Serialize};

use hydra_core::SourceHydrator;

/// Identifies one unit of batched work. The queue carries only this value;
/// membership and revision are re-derived when the key is processed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HydrationQueueKey {
    pub source_repo_url: String,
    pub source_target_revision: String,
    pub destination_branch: String,
}

impl HydrationQueueKey {
    /// Whether a target's configuration belongs to this group.
    pub fn matches(&self, hydrator: &SourceHydrator) -> bool {
        hydrator.dry_source.repo_url == self.source_repo_url
            && hydrator.dry_source.target_revision == self.source_target_revision
            && hydrator.destination_branch() == self.destination_branch
    }
}

impl fmt::Display for HydrationQueueKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} -> {}",
            self.source_repo_url, self.source_target_revision, self.destination_branch
        )
    }
}

/// A grouping key plus the destination path; unique within a resolved group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupFingerprint {
    pub source_repo_url: String,
    pub source_target_revision: String,
    pub destination_branch: String,
    pub destination_path: String,
}

impl fmt::Display for DedupFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{} -> {}:{}",
            self.source_repo_url,
            self.source_target_revision,
            self.destination_branch,
            self.destination_path
        )
    }
}

pub fn hydration_queue_key(hydrator: &SourceHydrator) -> HydrationQueueKey {
    HydrationQueueKey {
        source_repo_url: hydrator.dry_source.repo_url.clone(),
        source_target_revision: hydrator.dry_source.target_revision.clone(),
        destination_branch: hydrator.destination_branch().to_string(),
    }
}

pub fn dedup_fingerprint(hydrator: &SourceHydrator) -> DedupFingerprint {
    DedupFingerprint {
        source_repo_url: hydrator.dry_source.repo_url.clone(),
        source_target_revision: hydrator.dry_source.target_revision.clone(),
        destination_branch: hydrator.destination_branch().to_string(),
        destination_path: hydrator.sync_source.path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydra_core::{DrySource, HydrateTo, SyncSource};

    fn hydrator(branch: &str, path: &str, hydrate_to: Option<&str>) -> SourceHydrator {
        SourceHydrator {
            dry_source: DrySource {
                repo_url: "https://git.example.com/platform.git".to_string(),
                target_revision: "main".to_string(),
                path: "apps".to_string(),
            },
            sync_source: SyncSource {
                target_branch: branch.to_string(),
                path: path.to_string(),
            },
            hydrate_to: hydrate_to.map(|b| HydrateTo {
                target_branch: b.to_string(),
            }),
        }
    }

    #[test]
    fn key_uses_sync_branch_without_override() {
        let key = hydration_queue_key(&hydrator("env/prod", "guestbook", None));
        assert_eq!(key.destination_branch, "env/prod");
        assert_eq!(key.source_target_revision, "main");
    }

    #[test]
    fn key_uses_hydrate_to_branch_when_declared() {
        let key = hydration_queue_key(&hydrator("env/prod", "guestbook", Some("env/prod-next")));
        assert_eq!(key.destination_branch, "env/prod-next");
        let fingerprint = dedup_fingerprint(&hydrator("env/prod", "guestbook", Some("env/prod-next")));
        assert_eq!(fingerprint.destination_branch, "env/prod-next");
        assert_eq!(fingerprint.destination_path, "guestbook");
    }

    #[test]
    fn same_key_different_paths_have_distinct_fingerprints() {
        let a = hydrator("env/prod", "guestbook", None);
        let b = hydrator("env/prod", "ledger", None);
        assert_eq!(hydration_queue_key(&a), hydration_queue_key(&b));
        assert_ne!(dedup_fingerprint(&a), dedup_fingerprint(&b));
    }

    #[test]
    fn matches_ignores_dry_path() {
        let a = hydrator("env/prod", "guestbook", None);
        let mut b = a.clone();
        b.dry_source.path = "other".to_string();
        assert!(hydration_queue_key(&a).matches(&b));

        b.dry_source.target_revision = "release-1".to_string();
        assert!(!hydration_queue_key(&a).matches(&b));
    }

    #[test]
    fn display_is_readable() {
        let key = hydration_queue_key(&hydrator("env/prod", "guestbook", None));
        assert_eq!(
            key.to_string(),
            "https://git.example.com/platform.git@main -> env/prod"
        );
    }
}
