//! `hydra target add <project>/<name>` and `hydra target list`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use hydra_core::{store, DrySource, HydrateTo, QualifiedName, SourceHydrator, SyncSource};

use super::home_dir;

/// Manage targets.
#[derive(Subcommand, Debug)]
pub enum TargetCommand {
    /// List targets and where they hydrate to.
    List,

    /// Register a target, or replace the hydrator configuration of an
    /// existing one.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// `<project>/<name>`; the project must exist.
    pub target: QualifiedName,

    /// Dry source repository (a local directory).
    #[arg(long)]
    pub repo: String,

    /// Directory inside the dry repository holding the manifests.
    #[arg(long, default_value = "")]
    pub path: String,

    /// Revision reference to track.
    #[arg(long, default_value = "HEAD")]
    pub revision: String,

    /// Branch the sync engine reads hydrated manifests from.
    #[arg(long)]
    pub sync_branch: String,

    /// Directory inside the branch the manifests are written to.
    #[arg(long)]
    pub sync_path: String,

    /// Write to this staging branch instead of the sync branch.
    #[arg(long)]
    pub hydrate_to: Option<String>,
}

impl AddArgs {
    fn source_hydrator(&self) -> SourceHydrator {
        SourceHydrator {
            dry_source: DrySource {
                repo_url: self.repo.clone(),
                target_revision: self.revision.clone(),
                path: self.path.clone(),
            },
            sync_source: SyncSource {
                target_branch: self.sync_branch.clone(),
                path: self.sync_path.clone(),
            },
            hydrate_to: self.hydrate_to.clone().map(|target_branch| HydrateTo { target_branch }),
        }
    }
}

pub fn run(cmd: TargetCommand) -> Result<()> {
    match cmd {
        TargetCommand::List => list(),
        TargetCommand::Add(args) => add(args),
    }
}

fn list() -> Result<()> {
    let home = home_dir()?;
    let targets = store::list_targets_at(&home).context("failed to load targets")?;

    if targets.is_empty() {
        println!("No targets registered.");
        return Ok(());
    }

    for target in targets {
        match &target.source_hydrator {
            Some(hydrator) => println!(
                "{}  {}/{}@{} -> {}:{}",
                target.qualified_name(),
                hydrator.dry_source.repo_url,
                hydrator.dry_source.path,
                hydrator.dry_source.target_revision,
                hydrator.destination_branch(),
                hydrator.sync_source.path,
            ),
            None => println!("{}  (no hydrator)", target.qualified_name()),
        }
    }
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let home = home_dir()?;
    let hydrator = args.source_hydrator();
    let target = store::add_target_at(&home, &args.target, hydrator)
        .with_context(|| format!("failed to add target '{}'", args.target))?;

    println!("✓ Registered target '{}'", target.qualified_name());
    if let Some(hydrator) = &target.source_hydrator {
        println!(
            "  Hydrates to: {}:{}",
            hydrator.destination_branch(),
            hydrator.sync_source.path
        );
    }
    Ok(())
}
