//! Main orchestrator: plan and apply runs.
//!
//! `plan` reconciles a wire config against the chains and returns the
//! transactions that would fix every divergence. `apply` checks the plan
//! against the safety limits, submits it through the transaction pipeline
//! and records the run in the event store.
//!
//! The run timeout is a scheduling deadline: once it passes no new
//! transaction is started, but everything already submitted is reported
//! and logged.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{Event, EventType, PendingTransaction, Run, Status};
use crate::protocol::{configure_all, ReadRetry, SdkFactories, WireContexts, WireError, WireGraphs};

use super::configure::{Changes, ConfigDiff};
use super::event_store::{transaction_key, EventStore};
use super::pipeline::{execute, ExecuteOptions, Report, SignerFactory, TransactionOutcome};
use super::safety::{SafetyLimits, SafetyTracker, SafetyViolation};

/// Transactions needed to bring the chains in line with a wire config
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub transactions: Vec<PendingTransaction>,
    pub diffs: Vec<ConfigDiff>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl From<Changes> for Plan {
    fn from(changes: Changes) -> Self {
        Self {
            transactions: changes.transactions,
            diffs: changes.diffs,
        }
    }
}

/// A finished apply run
#[derive(Debug)]
pub struct ApplyOutcome {
    pub run: Run,

    /// Pipeline report; `None` when the run stopped before submitting
    pub report: Option<Report>,
}

/// Main orchestrator
#[derive(Debug, Clone, Default)]
pub struct Orchestrator {
    /// Directory holding the run logs ($OMNIWIRE_HOME/runs when unset)
    runs_dir: Option<PathBuf>,
}

impl Orchestrator {
    /// Create an orchestrator logging below the configured home directory
    pub fn new() -> Self {
        Self { runs_dir: None }
    }

    /// Create an orchestrator logging below `runs_dir`
    pub fn with_runs_dir(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: Some(runs_dir.into()),
        }
    }

    async fn open_store(&self, run_id: Uuid) -> Result<EventStore> {
        match &self.runs_dir {
            Some(dir) => EventStore::open_in(dir, run_id).await,
            None => EventStore::open(run_id).await,
        }
    }

    /// Compute the plan for every declared graph
    #[instrument(skip_all, fields(entities = graphs.entities().len()))]
    pub async fn plan(&self, graphs: &WireGraphs, factories: SdkFactories, read_retry: &ReadRetry) -> Result<Plan, WireError> {
        let contexts = WireContexts::new(factories, read_retry);
        let plan = Plan::from(configure_all(graphs, &contexts).await?);

        info!(transactions = plan.len(), "Plan computed");
        Ok(plan)
    }

    /// Submit a plan and record the run
    #[instrument(skip_all, fields(transactions = plan.len()))]
    pub async fn apply(
        &self,
        plan: &Plan,
        signers: &dyn SignerFactory,
        options: &ExecuteOptions,
        limits: &SafetyLimits,
    ) -> Result<ApplyOutcome> {
        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting apply run");

        let store = self.open_store(run_id).await?;
        let mut run = Run::new(run_id);
        let mut tracker = SafetyTracker::new();

        record(
            &store,
            &mut run,
            Event::new(
                run_id,
                None,
                EventType::RunStarted,
                format!("{}:start", run_id),
                "Run started".to_string(),
                Status::Running,
            ),
        )
        .await?;

        if let Err(violation) = limits.validate_plan(&plan.transactions) {
            return self.handle_safety_violation(&store, run, violation).await;
        }

        record(
            &store,
            &mut run,
            Event::new(
                run_id,
                None,
                EventType::PlanComputed,
                format!("{}:plan", run_id),
                format!("{} transactions planned", plan.len()),
                Status::Running,
            ),
        )
        .await?;

        tracker.record_plan(plan.len());
        if let Err(violation) = limits.check(&tracker) {
            return self.handle_safety_violation(&store, run, violation).await;
        }

        let options = options.with_deadline(Instant::from_std(tracker.started_at) + limits.run_timeout());
        let report = match execute(&plan.transactions, signers, &options).await {
            Ok(report) => report,
            Err(setup) => {
                return self
                    .handle_run_failure(&store, run, anyhow::Error::new(setup))
                    .await;
            }
        };

        for entry in &report.transactions {
            record(&store, &mut run, transaction_event(run_id, &entry.transaction, &entry.outcome)).await?;
        }

        if report.deadline_reached {
            let violation = SafetyViolation::RunTimeout {
                elapsed_seconds: tracker.elapsed_seconds(),
                limit_seconds: limits.run_timeout_seconds,
            };
            let mut outcome = self.handle_safety_violation(&store, run, violation).await?;
            outcome.report = Some(report);
            return Ok(outcome);
        }

        let run = self.complete_run(&store, run, &report).await?;
        Ok(ApplyOutcome {
            run,
            report: Some(report),
        })
    }

    /// Handle a safety violation by logging and updating run state
    async fn handle_safety_violation(
        &self,
        store: &EventStore,
        mut run: Run,
        violation: SafetyViolation,
    ) -> Result<ApplyOutcome> {
        let error_msg = violation.to_string();
        error!(%error_msg, "Safety limit reached");

        let event = Event::new(
            run.id,
            None,
            EventType::SafetyLimitReached,
            format!("{}:safety", run.id),
            format!("Safety limit reached: {}", error_msg),
            Status::Failed,
        )
        .with_error(error_msg);
        record(store, &mut run, event).await?;

        Ok(ApplyOutcome { run, report: None })
    }

    /// Handle a run that failed before anything was submitted
    async fn handle_run_failure(
        &self,
        store: &EventStore,
        mut run: Run,
        error: anyhow::Error,
    ) -> Result<ApplyOutcome> {
        let error_msg = format!("{:#}", error);
        error!(%error_msg, "Run failed");

        let event = Event::new(
            run.id,
            None,
            EventType::RunFailed,
            format!("{}:complete", run.id),
            format!("Run failed: {}", error_msg),
            Status::Failed,
        )
        .with_error(error_msg);
        record(store, &mut run, event).await?;

        Ok(ApplyOutcome { run, report: None })
    }

    /// Complete a run that went through the pipeline
    async fn complete_run(&self, store: &EventStore, mut run: Run, report: &Report) -> Result<Run> {
        let confirmed = report.confirmed().count();
        if report.is_success() {
            info!(run_id = %run.id, confirmed, "Run completed successfully");
        } else {
            warn!(
                run_id = %run.id,
                confirmed,
                failed = report.failed().count(),
                pending = report.pending().count(),
                "Run completed with unconfirmed transactions"
            );
        }

        let status = if report.is_success() {
            Status::Completed
        } else {
            Status::Failed
        };
        let event = Event::new(
            run.id,
            None,
            EventType::RunCompleted,
            format!("{}:complete", run.id),
            format!("{} of {} transactions confirmed", confirmed, report.transactions.len()),
            status,
        );
        record(store, &mut run, event).await?;

        Ok(run)
    }

    /// Get status of a run by ID
    pub async fn get_run_status(&self, run_id: Uuid) -> Result<Run> {
        let store = self.open_store(run_id).await?;
        let events = store.replay().await?;

        if events.is_empty() {
            anyhow::bail!("Run {} not found", run_id);
        }

        Run::from_events(&events).context("Failed to reconstruct run state")
    }

    /// List recent runs
    pub async fn list_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let run_ids = match &self.runs_dir {
            Some(dir) => EventStore::list_runs_in(dir).await?,
            None => EventStore::list_runs().await?,
        };

        let mut runs = Vec::new();
        for run_id in run_ids {
            if let Ok(run) = self.get_run_status(run_id).await {
                runs.push(run);
            }
        }

        // Sort by start time (most recent first)
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);

        Ok(runs)
    }
}

/// Append an event and fold it into the run state
async fn record(store: &EventStore, run: &mut Run, event: Event) -> Result<()> {
    store.append(&event).await?;
    run.apply_event(&event);
    Ok(())
}

fn transaction_event(run_id: Uuid, transaction: &PendingTransaction, outcome: &TransactionOutcome) -> Event {
    let key = transaction_key(run_id, transaction);
    let eid = Some(transaction.eid());
    let summary = transaction.to_string();

    match outcome {
        TransactionOutcome::Confirmed { hash, .. } => {
            Event::new(run_id, eid, EventType::TransactionConfirmed, key, summary, Status::Completed)
                .with_hash(hash.to_string())
        }
        TransactionOutcome::Failed { stage, cause } => {
            Event::new(run_id, eid, EventType::TransactionFailed, key, summary, Status::Failed)
                .with_error(format!("{} failed: {:#}", stage, cause))
        }
        TransactionOutcome::Pending => {
            Event::new(run_id, eid, EventType::TransactionSkipped, key, summary, Status::Skipped)
        }
    }
}
