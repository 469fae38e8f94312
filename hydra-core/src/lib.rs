//! Hydra core library: domain types, target store persistence, config, errors.
//!
//! - [`types`]: newtypes, targets, projects and hydration status
//! - [`error`]: [`StoreError`]
//! - [`store`]: load / save / list targets and projects, status persistence
//! - [`config`]: daemon configuration

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::HydratorConfig;
pub use error::StoreError;
pub use types::{
    DrySource, HydrateTo, HydrationOperation, HydrationPhase, HydratorStatus, ManifestSource,
    Project, ProjectName, QualifiedName, RepoCredentials, SourceHydrator,
    SuccessfulHydrationOperation, SyncSource, Target, TargetName,
};
