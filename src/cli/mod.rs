//! Command-line interface for omniwire.
//!
//! Provides commands for planning and applying a wire config against a
//! chain snapshot, checking run status and listing runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::Snapshot;
use crate::config::{self, ResolvedConfig};
use crate::core::{Orchestrator, Plan, TransactionOutcome};
use crate::domain::{group_transactions_by_eid, RunState, Status};
use crate::protocol::WireConfig;

/// omniwire - Omnichain configuration reconciler
#[derive(Parser, Debug)]
#[command(name = "omniwire")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Inputs shared by `plan` and `apply`
#[derive(clap::Args, Debug)]
pub struct WireArgs {
    /// Wire config file (defaults to paths.wire from the config file)
    #[arg(short, long)]
    pub wire: Option<PathBuf>,

    /// Chain snapshot file (defaults to paths.snapshot from the config file)
    #[arg(short, long, env = "OMNIWIRE_SNAPSHOT")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the transactions needed to apply a wire config
    Plan {
        #[command(flatten)]
        wire: WireArgs,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute the plan and submit it
    Apply {
        #[command(flatten)]
        wire: WireArgs,

        /// Simulate every transaction before signing it
        #[arg(long)]
        simulate: bool,

        /// Stop submitting on every chain after the first failure
        #[arg(long)]
        abort_on_first_failure: bool,
    },

    /// Check the status of a run
    Status {
        /// Run ID (UUID)
        run_id: String,
    },

    /// List recent runs
    Runs {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Plan { wire, json } => show_plan(&wire, json).await,
            Commands::Apply {
                wire,
                simulate,
                abort_on_first_failure,
            } => apply(&wire, simulate, abort_on_first_failure).await,
            Commands::Status { run_id } => show_status(&run_id).await,
            Commands::Runs { limit } => list_runs(limit).await,
            Commands::Config => show_config().await,
        }
    }
}

fn pick(flag: &Option<PathBuf>, configured: &Option<PathBuf>, what: &str) -> Result<PathBuf> {
    flag.clone()
        .or_else(|| configured.clone())
        .with_context(|| format!("No {} file given. Use --{} <file> or set paths.{} in .omniwire/config.yaml", what, what, what))
}

/// Load the wire config and the snapshot, then compute the plan
async fn compute_plan(args: &WireArgs, cfg: &ResolvedConfig) -> Result<(Plan, Snapshot)> {
    let wire_path = pick(&args.wire, &cfg.wire, "wire")?;
    let snapshot_path = pick(&args.snapshot, &cfg.snapshot, "snapshot")?;

    let graphs = WireConfig::from_file(&wire_path)?.graphs()?;
    let snapshot = Snapshot::load(&snapshot_path)?;

    let plan = Orchestrator::new()
        .plan(&graphs, snapshot.factories(), &cfg.read_retry()?)
        .await
        .with_context(|| format!("Failed to plan {}", wire_path.display()))?;

    Ok((plan, snapshot))
}

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("Nothing to do: the chains match the wire config");
        return;
    }

    println!("{} transaction(s) planned", plan.len());
    for (eid, transactions) in group_transactions_by_eid(&plan.transactions) {
        println!();
        println!("Chain {}:", eid);
        for transaction in transactions {
            println!("  {}", transaction);
        }
    }

    println!();
    println!("Differences:");
    for diff in &plan.diffs {
        println!("  {}", diff);
    }
}

/// Show the plan of a wire config
async fn show_plan(args: &WireArgs, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let (plan, _) = compute_plan(args, cfg).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan).context("Failed to serialize plan")?);
    } else {
        print_plan(&plan);
    }

    Ok(())
}

/// Compute and submit the plan of a wire config
async fn apply(args: &WireArgs, simulate: bool, abort_on_first_failure: bool) -> Result<()> {
    let cfg = config::config()?;
    let (plan, snapshot) = compute_plan(args, cfg).await?;

    print_plan(&plan);
    if plan.is_empty() {
        return Ok(());
    }

    let mut options = cfg.execute_options()?;
    options.simulate |= simulate;
    options.abort_on_first_failure |= abort_on_first_failure;

    let outcome = Orchestrator::new()
        .apply(&plan, &snapshot, &options, &cfg.safety)
        .await?;

    if let Some(report) = &outcome.report {
        println!();
        for entry in &report.transactions {
            match &entry.outcome {
                TransactionOutcome::Confirmed { hash, nonce, .. } => {
                    println!("  [confirmed] {} (nonce {}, {})", entry.transaction, nonce, hash)
                }
                TransactionOutcome::Failed { stage, cause } => {
                    println!("  [failed]    {} ({} failed: {:#})", entry.transaction, stage, cause)
                }
                TransactionOutcome::Pending => println!("  [pending]   {}", entry.transaction),
            }
        }
    }

    let run = &outcome.run;
    match &run.state {
        RunState::Completed => {
            eprintln!("\n[Run {} completed successfully]", run.id);
        }
        RunState::PartiallyCompleted => {
            eprintln!(
                "\n[Run {} finished with {} failed and {} pending transaction(s)]",
                run.id,
                run.count(Status::Failed),
                run.count(Status::Skipped)
            );
            std::process::exit(1);
        }
        RunState::Failed { error } => {
            eprintln!("\n[Run {} failed: {}]", run.id, error);
            std::process::exit(1);
        }
        RunState::SafetyLimitReached { limit } => {
            eprintln!("\n[Run {} stopped: safety limit reached - {}]", run.id, limit);
            std::process::exit(1);
        }
        RunState::Running => {
            eprintln!("\n[Run {} in state: {:?}]", run.id, run.state);
        }
    }

    Ok(())
}

/// Show the status of a run
async fn show_status(run_id_str: &str) -> Result<()> {
    let run_id = Uuid::parse_str(run_id_str).with_context(|| format!("Invalid run ID: {}", run_id_str))?;

    let orchestrator = Orchestrator::new();
    let run = orchestrator.get_run_status(run_id).await?;

    println!("Run ID: {}", run.id);
    println!("State: {}", state_label(&run.state));
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    println!("Planned: {}", run.planned);
    println!(
        "Confirmed: {}  Failed: {}  Skipped: {}",
        run.count(Status::Completed),
        run.count(Status::Failed),
        run.count(Status::Skipped)
    );
    if let RunState::Failed { error } = &run.state {
        println!("Error: {}", error);
    }

    if !run.hashes.is_empty() {
        println!("\nConfirmed transactions:");
        let mut hashes: Vec<_> = run.hashes.iter().collect();
        hashes.sort();
        for (key, hash) in hashes {
            println!("  {}: {}", key, hash);
        }
    }

    Ok(())
}

fn state_label(state: &RunState) -> &'static str {
    match state {
        RunState::Running => "running",
        RunState::Completed => "completed",
        RunState::PartiallyCompleted => "partial",
        RunState::Failed { .. } => "failed",
        RunState::SafetyLimitReached { .. } => "safety-limit",
    }
}

/// List recent runs
async fn list_runs(limit: usize) -> Result<()> {
    let orchestrator = Orchestrator::new();
    let runs = orchestrator.list_runs(limit).await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<27} {:<10} {:<15}", "RUN ID", "STARTED", "PLANNED", "STATE");
    println!("{}", "-".repeat(90));

    for run in runs {
        println!(
            "{:<38} {:<27} {:<10} {:<15}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            run.planned,
            state_label(&run.state)
        );
    }

    Ok(())
}

fn display_path(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(not set)".to_string())
}

/// Show resolved configuration
async fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("omniwire configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:     {}", cfg.home.display());
    println!("  Runs:     {}", config::runs_dir()?.display());
    println!("  Wire:     {}", display_path(cfg.wire.as_deref()));
    println!("  Snapshot: {}", display_path(cfg.snapshot.as_deref()));
    println!();
    println!("Read retry:   {} attempt(s), {}ms initial delay", cfg.read_retry.max_attempts, cfg.read_retry.backoff.initial_delay_ms);
    println!("Submit retry: {} attempt(s), {}ms initial delay", cfg.submit_retry.max_attempts, cfg.submit_retry.backoff.initial_delay_ms);
    println!();
    println!("Pipeline:");
    println!("  Simulate:               {}", cfg.pipeline.simulate);
    println!("  Abort on first failure: {}", cfg.pipeline.abort_on_first_failure);
    println!();
    println!("Safety limits:");
    println!("  Max transactions:           {}", cfg.safety.max_transactions);
    println!("  Max transactions per chain: {}", cfg.safety.max_transactions_per_chain);
    println!("  Run timeout:                {}s", cfg.safety.run_timeout_seconds);
    println!("  Confirmation timeout:       {}s", cfg.safety.confirmation_timeout_seconds);

    Ok(())
}
