//! `hydra hydrate <project>/<name>`

use anyhow::{Context, Result};
use clap::Args;

use hydra_core::{store, QualifiedName};
use hydra_daemon::{request_hydrate, DaemonError};

use super::home_dir;

/// Request hydration of one target.
///
/// With a running daemon the target is evaluated immediately; otherwise the
/// request is recorded and honoured by the next `hydra run` or daemon sweep.
#[derive(Args, Debug)]
pub struct HydrateArgs {
    /// `<project>/<name>`
    pub target: QualifiedName,
}

impl HydrateArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let name = self.target.to_string();

        match request_hydrate(&home, &name) {
            Ok(response) => {
                match response.get("enqueued").filter(|v| !v.is_null()) {
                    Some(enqueued) => println!(
                        "✓ Scheduled '{}' ({})",
                        name,
                        enqueued["reason"].as_str().unwrap_or("requested")
                    ),
                    None => println!("Hydration of '{name}' was not scheduled; see `hydra status`"),
                }
                Ok(())
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                store::request_hydration_at(&home, &self.target)
                    .with_context(|| format!("failed to request hydration of '{name}'"))?;
                println!("✓ Requested hydration of '{name}'");
                println!("  Daemon not running; run `hydra run` to hydrate now.");
                Ok(())
            }
            Err(err) => Err(err).with_context(|| format!("failed to request hydration of '{name}'")),
        }
    }
}
