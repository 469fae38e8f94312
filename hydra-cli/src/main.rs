//! Hydra — manifest hydration CLI.
//!
//! # Usage
//!
//! ```text
//! hydra init
//! hydra project add <name> --source-repo <pattern>...
//! hydra project list
//! hydra target add <project>/<name> --repo <url> --path <dir> --sync-branch <branch> --sync-path <dir>
//! hydra status [--project <name>] [--json]
//! hydra hydrate <project>/<name>
//! hydra run [--json]
//! hydra daemon start|stop|status
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, hydrate::HydrateArgs, init::InitArgs, project::ProjectCommand,
    run::RunArgs, status::StatusArgs, target::TargetCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "hydra",
    version,
    about = "Hydrate deployment manifests from dry sources into destination branches",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the Hydra home and a default config.
    Init(InitArgs),

    /// Manage projects and their permitted source repositories.
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },

    /// Register targets and their hydrator configuration.
    Target {
        #[command(subcommand)]
        command: TargetCommand,
    },

    /// Show the hydration phase of every target.
    Status(StatusArgs),

    /// Request hydration of one target on its next evaluation.
    Hydrate(HydrateArgs),

    /// Evaluate every target once and hydrate what is due.
    Run(RunArgs),

    /// Manage the background hydration daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Project { command } => commands::project::run(command),
        Commands::Target { command } => commands::target::run(command),
        Commands::Status(args) => args.run(),
        Commands::Hydrate(args) => args.run(),
        Commands::Run(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
