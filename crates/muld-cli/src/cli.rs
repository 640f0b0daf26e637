use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "muld",
    about = "Mirror repositories from upstream, through a local mirror, to downstreams",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sync every repository in the manifest
    Run(RunArgs),
    /// Show what a run would do without changing anything
    Plan(PlanArgs),
    /// Show the recorded state of each repository
    Status(StatusArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the manifest (TOML, or YAML for .yaml/.yml)
    pub manifest: PathBuf,
    /// Repositories synced at the same time (overrides the manifest)
    #[arg(short = 'j', long, value_parser = clap::value_parser!(u16).range(1..))]
    pub concurrency: Option<u16>,
    /// Plan only, same as `muld plan`
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct PlanArgs {
    /// Path to the manifest (TOML, or YAML for .yaml/.yml)
    pub manifest: PathBuf,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Path to the manifest (TOML, or YAML for .yaml/.yml)
    pub manifest: PathBuf,
}
