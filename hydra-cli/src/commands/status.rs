//! `hydra status` — per-target hydration phase and what is due.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use hydra_core::{config, store, HydratorConfig, Target};
use hydra_hydrator::needs_hydration;

use super::home_dir;

/// Arguments for `hydra status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Filter to one project.
    #[arg(long)]
    pub project: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home_dir()?;
        let config = config::load_at(&home).context("failed to load config")?;

        let mut targets = store::list_targets_at(&home)
            .context("failed to load targets — run `hydra init` first")?;
        if let Some(project) = self.project.as_ref() {
            targets.retain(|target| target.project.0 == *project);
        }

        let report = build_report(&config, &targets);
        if self.json {
            return print_json(report);
        }
        print_table(report);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
struct TargetStatus {
    project: String,
    target: String,
    phase: String,
    destination: String,
    dry_sha: Option<String>,
    hydrated_sha: Option<String>,
    /// Why the next evaluation would hydrate, if it would.
    due: Option<String>,
    message: Option<String>,
    hydrate_requested: bool,
}

#[derive(Debug, Clone, Serialize)]
struct StatusSummary {
    projects: usize,
    targets: usize,
    hydrated: usize,
    hydrating: usize,
    failed: usize,
    due: usize,
}

#[derive(Debug, Clone, Serialize)]
struct StatusReport {
    summary: StatusSummary,
    targets: Vec<TargetStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "target")]
    target: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "destination")]
    destination: String,
    #[tabled(rename = "dry")]
    dry_sha: String,
    #[tabled(rename = "hydrated")]
    hydrated_sha: String,
    #[tabled(rename = "detail")]
    detail: String,
}

fn build_report(config: &HydratorConfig, targets: &[Target]) -> StatusReport {
    let rows: Vec<TargetStatus> = targets
        .iter()
        .map(|target| target_status(config, target))
        .collect();

    let count = |phase: &str| rows.iter().filter(|row| row.phase == phase).count();
    let summary = StatusSummary {
        projects: rows
            .iter()
            .map(|row| row.project.as_str())
            .collect::<BTreeSet<_>>()
            .len(),
        targets: rows.len(),
        hydrated: count("hydrated"),
        hydrating: count("hydrating"),
        failed: count("failed"),
        due: rows.iter().filter(|row| row.due.is_some()).count(),
    };

    StatusReport {
        summary,
        targets: rows,
    }
}

fn target_status(config: &HydratorConfig, target: &Target) -> TargetStatus {
    let operation = target.status.current_operation.as_ref();
    let hydrator = target.source_hydrator.as_ref();

    let due = hydrator.map(|hydrator| {
        match hydra_source::resolve_revision(
            &hydrator.dry_source.repo_url,
            &hydrator.dry_source.target_revision,
        ) {
            Ok(latest) => needs_hydration(target, config.status_timeout(), &latest)
                .map(|reason| reason.to_string()),
            Err(err) => Some(format!("dry source unavailable: {err}")),
        }
    });

    TargetStatus {
        project: target.project.0.clone(),
        target: target.name.0.clone(),
        phase: match (hydrator, operation) {
            (None, _) => "unconfigured".to_string(),
            (Some(_), None) => "never".to_string(),
            (Some(_), Some(op)) => op.phase.to_string(),
        },
        destination: hydrator
            .map(|h| format!("{}:{}", h.destination_branch(), h.sync_source.path))
            .unwrap_or_default(),
        dry_sha: operation.map(|op| op.dry_sha.clone()).filter(|sha| !sha.is_empty()),
        hydrated_sha: operation.and_then(|op| op.hydrated_sha.clone()),
        due: due.flatten(),
        message: operation
            .map(|op| op.message.clone())
            .filter(|message| !message.is_empty()),
        hydrate_requested: target.hydrate_requested,
    }
}

fn print_json(report: StatusReport) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(report: StatusReport) {
    let summary = &report.summary;
    println!(
        "Hydra v{} | {} projects | {} targets | {} failed | {} due",
        env!("CARGO_PKG_VERSION"),
        summary.projects,
        summary.targets,
        summary.failed,
        summary.due,
    );

    if report.targets.is_empty() {
        println!("No targets registered.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    let due = summary.due;
    let mut grouped = BTreeMap::<String, Vec<TargetStatus>>::new();
    for row in report.targets {
        grouped.entry(row.project.clone()).or_default().push(row);
    }

    println!("{separator}");
    for (project, rows) in grouped {
        println!("{}", project.to_uppercase().bold());
        let table_rows: Vec<StatusTableRow> = rows
            .into_iter()
            .map(|row| StatusTableRow {
                phase: phase_label(&row.phase),
                target: row.target,
                destination: row.destination,
                dry_sha: short(row.dry_sha.as_deref()),
                hydrated_sha: short(row.hydrated_sha.as_deref()),
                detail: row
                    .message
                    .or(row.due)
                    .unwrap_or_else(|| "up to date".to_string()),
            })
            .collect();
        let mut table = Table::new(table_rows);
        table.with(Style::rounded());
        println!("{table}");
        println!("{separator}");
    }

    if due > 0 {
        println!("Run 'hydra run' to hydrate due targets.");
    }
}

fn phase_label(phase: &str) -> String {
    let label = phase.to_uppercase();
    match phase {
        "hydrated" => label.green().to_string(),
        "hydrating" => label.yellow().to_string(),
        "failed" => label.red().to_string(),
        _ => label.bright_black().to_string(),
    }
}

fn short(sha: Option<&str>) -> String {
    match sha {
        Some(sha) => sha.chars().take(12).collect(),
        None => "-".to_string(),
    }
}
