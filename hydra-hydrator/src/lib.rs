//! # hydra-hydrator
//!
//! The hydration engine: decides when a target's manifests must be
//! regenerated, groups targets that share a destination, and records one
//! shared outcome per batch.
//!
//! Entry points live on [`Hydrator`]:
//! - [`Hydrator::process_target_trigger`] evaluates one target and schedules
//!   its grouping key.
//! - [`Hydrator::process_hydration_queue_item`] hydrates every live target of
//!   one grouping key as a single commit.
//!
//! All I/O goes through the [`Dependencies`] and [`CommitService`] traits.

pub mod batch;
pub mod deps;
pub mod error;
pub mod grouping;
pub mod hydrator;
pub mod policy;
pub mod resolver;
pub mod status;

pub use deps::{
    CommitRequest, CommitService, Dependencies, HydratedManifest, PathDetails, RenderedManifests,
};
pub use error::{BoxError, HydrationError};
pub use grouping::{dedup_fingerprint, hydration_queue_key, DedupFingerprint, HydrationQueueKey};
pub use hydrator::{BatchOutcome, Hydrator, TriggerOutcome};
pub use policy::{needs_hydration, needs_hydration_at, HydrationReason, FAILURE_BACKOFF};
pub use resolver::{relevant_targets, RelevantTarget};
