//! `hydra run` — one trigger sweep and a synchronous drain.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use hydra_daemon::{init_tracing, run_once, RunSummary};

use super::home_dir;

/// Evaluate every target once and hydrate everything that is due.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Emit the run summary as JSON.
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        init_tracing();
        let home = home_dir()?;
        let summary = run_once(&home).context("hydration run failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).context("failed to serialize run summary")?
            );
        } else {
            print_summary(&summary);
        }

        let failed = summary.failed_batches();
        if failed > 0 {
            bail!("{failed} batch(es) failed to hydrate");
        }
        Ok(())
    }
}

fn print_summary(summary: &RunSummary) {
    if summary.enqueued.is_empty() {
        println!("All targets up to date.");
        return;
    }

    for enqueued in &summary.enqueued {
        println!("→ {} ({})", enqueued.target, enqueued.reason);
    }
    for batch in &summary.batches {
        let label = match batch.outcome {
            "hydrated" => "✓".green().to_string(),
            "empty" => "·".bright_black().to_string(),
            _ => "✗".red().to_string(),
        };
        println!("{label} {} [{}]", batch.key, batch.targets.join(", "));
        if let Some(sha) = &batch.hydrated_sha {
            println!("  commit {sha}");
        }
        if let Some(message) = &batch.message {
            println!("  {message}");
        }
    }
    println!(
        "{} batch(es), {} refreshed in {}ms",
        summary.batches.len(),
        summary.refreshed.len(),
        summary.duration_ms
    );
}
