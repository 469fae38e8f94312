//! `hydra project list` and `hydra project add <name>`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use hydra_core::{store, ProjectName};

use super::home_dir;

/// Manage projects.
#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// List projects with their source repo patterns.
    List,

    /// Create a project.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Project name (e.g. "platform").
    pub name: String,

    /// Repo URL pattern targets of this project may hydrate from. `*`
    /// matches any run of characters; a leading `!` denies. Repeatable.
    #[arg(long = "source-repo", short = 's', value_name = "PATTERN", default_value = "*")]
    pub source_repos: Vec<String>,
}

pub fn run(cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::List => list(),
        ProjectCommand::Add(args) => add(args),
    }
}

fn list() -> Result<()> {
    let home = home_dir()?;
    let names = store::list_project_names_at(&home).context("failed to read project list")?;

    if names.is_empty() {
        println!("No projects registered.");
        println!("Run: hydra project add <name>");
        return Ok(());
    }

    for name in names {
        let project = store::load_project_at(&home, &name)
            .with_context(|| format!("failed to load project '{name}'"))?;
        println!("{} [{}]", project.name, project.source_repos.join(", "));
    }
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let home = home_dir()?;
    let project = store::add_project_at(
        &home,
        ProjectName::from(args.name.clone()),
        args.source_repos,
    )
    .with_context(|| format!("failed to add project '{}'", args.name))?;

    println!(
        "✓ Project '{}' permits: {}",
        project.name,
        project.source_repos.join(", ")
    );
    Ok(())
}
