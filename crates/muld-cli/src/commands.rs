use std::collections::BTreeMap;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use muld_manifest::Manifest;
use muld_state::{FileStateStore, StateStore, SyncRecord};
use muld_sync::{Orchestrator, PlanReport, RunReport, RunStatus};
use muld_transport::{GitTransport, TransportRegistry};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::cli::*;

/// Exit code for errors that stop the run before any repository is synced.
pub const EXIT_FATAL: u8 = 2;

pub async fn run_command(cli: Cli) -> anyhow::Result<ExitCode> {
    let format = cli.format;
    match cli.command {
        Command::Run(args) if args.dry_run => cmd_plan(&args.manifest, format).await,
        Command::Run(args) => cmd_run(args, format).await,
        Command::Plan(args) => cmd_plan(&args.manifest, format).await,
        Command::Status(args) => cmd_status(&args.manifest, format),
    }
}

fn load_manifest(path: &Path) -> anyhow::Result<Manifest> {
    Manifest::load(path).with_context(|| format!("loading manifest {}", path.display()))
}

fn open_store(manifest: &Manifest) -> anyhow::Result<FileStateStore> {
    FileStateStore::open(&manifest.settings.state_dir).with_context(|| {
        format!(
            "opening state directory {}",
            manifest.settings.state_dir.display()
        )
    })
}

fn orchestrator(manifest: &Manifest) -> anyhow::Result<Orchestrator> {
    let git = GitTransport::new().with_timeout(manifest.settings.command_timeout());
    let registry = TransportRegistry::with_git(git);
    let store = open_store(manifest)?;
    Ok(Orchestrator::new(registry, Arc::new(store)))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_run(args: RunArgs, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let manifest = load_manifest(&args.manifest)?;
    let mut orchestrator = orchestrator(&manifest)?;
    if let Some(limit) = args.concurrency {
        orchestrator = orchestrator.with_concurrency(usize::from(limit));
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, letting in-flight steps finish");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run(&manifest, cancel).await;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_run_report(&report),
    }
    Ok(ExitCode::from(u8::try_from(report.exit_code()).unwrap_or(1)))
}

fn status_label(status: RunStatus) -> colored::ColoredString {
    match status {
        RunStatus::Success => "success".green().bold(),
        RunStatus::Partial => "partial".yellow().bold(),
        RunStatus::Failed => "failed".red().bold(),
    }
}

fn print_run_report(report: &RunReport) {
    for result in &report.results {
        let applied = result.total_applied();
        println!(
            "{} {}  {}",
            status_label(result.status),
            result.repository.bold(),
            format!("{applied} ref update(s)").dimmed()
        );
        for error in &result.errors {
            println!("    {} {error}", "✗".red());
        }
    }
    println!(
        "\n{} repositories: {} succeeded, {} partial, {} failed  (run {})",
        report.results.len(),
        report.count(RunStatus::Success).to_string().green(),
        report.count(RunStatus::Partial).to_string().yellow(),
        report.count(RunStatus::Failed).to_string().red(),
        report.run_id.to_string().dimmed(),
    );
}

async fn cmd_plan(path: &Path, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let reports = orchestrator(&manifest)?.plan_all(&manifest).await;
    match format {
        OutputFormat::Json => print_json(&reports)?,
        OutputFormat::Text => print_plans(&reports),
    }
    Ok(if reports.iter().all(PlanReport::is_ok) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_plans(reports: &[PlanReport]) {
    for report in reports {
        println!("{}", report.repository.bold());
        for plan in &report.plans {
            println!("  {}", plan.stage.to_string().cyan());
            if !plan.has_changes() && plan.actions.iter().all(|a| !a.orphaned) {
                println!("    {}", "up to date".green());
                continue;
            }
            for action in plan.actions.iter().filter(|a| a.is_change() || a.orphaned) {
                println!("    {action}");
            }
        }
        for error in &report.errors {
            println!("  {} {error}", "✗".red());
        }
    }
}

fn cmd_status(path: &Path, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let store = open_store(&manifest)?;

    let mut records: BTreeMap<String, Option<SyncRecord>> = BTreeMap::new();
    for spec in &manifest.repositories {
        records.insert(spec.name.clone(), store.load(&spec.name)?);
    }
    let unknown: Vec<String> = store
        .list()?
        .into_iter()
        .filter(|name| manifest.repository(name).is_none())
        .collect();

    match format {
        OutputFormat::Json => print_json(&records)?,
        OutputFormat::Text => {
            for (name, record) in &records {
                print_record(name, record.as_ref());
            }
            for entry in &manifest.invalid {
                println!("{}  {} {}", entry.name.bold(), "invalid:".red(), entry.error);
            }
            for name in &unknown {
                println!("{}  {}", name.bold(), "recorded but not in manifest".dimmed());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_record(name: &str, record: Option<&SyncRecord>) {
    let Some(record) = record else {
        println!("{}  {}", name.bold(), "never synced".dimmed());
        return;
    };
    println!(
        "{}  updated {}",
        name.bold(),
        record.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("  local: {} refs", record.local.len());
    for (downstream, state) in &record.downstream {
        println!("  {}: {} refs", downstream.cyan(), state.len());
    }
    if let Some(error) = &record.last_error {
        println!("  {} {error}", "last error:".red());
    }
}
