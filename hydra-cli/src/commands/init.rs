//! `hydra init`

use anyhow::{Context, Result};
use clap::Args;

use hydra_core::{config, store, HydratorConfig};

use super::home_dir;

/// Create `~/.hydra/` with a default `config.yaml`.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Seconds between trigger sweeps written to the new config.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Number of batch workers written to the new config.
    #[arg(long)]
    pub workers: Option<usize>,
}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let mut defaults = HydratorConfig::default();
        if let Some(interval) = self.interval {
            defaults.trigger_interval_secs = interval;
        }
        if let Some(workers) = self.workers {
            defaults.workers = workers;
        }

        let projects = store::projects_root(&home);
        std::fs::create_dir_all(&projects)
            .with_context(|| format!("failed to create {}", projects.display()))?;

        let path = config::config_path_at(&home);
        if config::init_at(&home, &defaults).context("failed to write config")? {
            println!("✓ Initialized Hydra home");
        } else {
            println!("Hydra home already initialized");
        }
        println!("  Config: {}", path.display());
        Ok(())
    }
}
