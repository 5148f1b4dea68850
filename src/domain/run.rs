//! Run state and reconstruction from events.
//!
//! A Run represents a single `apply` invocation: one plan submitted
//! through the transaction pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType, Status};

/// A recorded apply run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed (if applicable)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of transactions in the plan
    pub planned: usize,

    /// Status of each transaction (idempotency key -> status)
    pub transactions: HashMap<String, Status>,

    /// Hashes of confirmed transactions (idempotency key -> hash)
    pub hashes: HashMap<String, String>,
}

impl Run {
    /// Create a new run
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RunState::Running,
            started_at: Utc::now(),
            completed_at: None,
            planned: 0,
            transactions: HashMap::new(),
            hashes: HashMap::new(),
        }
    }

    /// Reconstruct run state from a sequence of events
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self::new(first_event.run_id);
        run.started_at = first_event.timestamp;

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            EventType::PlanComputed => {
                self.planned = event
                    .payload_summary
                    .split_whitespace()
                    .next()
                    .and_then(|count| count.parse().ok())
                    .unwrap_or(self.planned);
            }
            EventType::TransactionConfirmed => {
                self.transactions
                    .insert(event.idempotency_key.clone(), Status::Completed);
                if let Some(ref hash) = event.hash {
                    self.hashes.insert(event.idempotency_key.clone(), hash.clone());
                }
            }
            EventType::TransactionFailed => {
                self.transactions
                    .insert(event.idempotency_key.clone(), Status::Failed);
            }
            EventType::TransactionSkipped => {
                self.transactions
                    .insert(event.idempotency_key.clone(), Status::Skipped);
            }
            EventType::RunCompleted => {
                self.state = if self.count(Status::Completed) == self.transactions.len() {
                    RunState::Completed
                } else {
                    RunState::PartiallyCompleted
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::SafetyLimitReached => {
                self.state = RunState::SafetyLimitReached {
                    limit: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
        }
    }

    /// Number of transactions with the given status
    pub fn count(&self, status: Status) -> usize {
        self.transactions.values().filter(|s| **s == status).count()
    }

    /// Check if the run is still in progress
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Check if the run has completed (successfully or not)
    pub fn is_finished(&self) -> bool {
        !self.is_running()
    }
}

/// State of an apply run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing
    #[default]
    Running,

    /// Every transaction confirmed
    Completed,

    /// Finished with failed or skipped transactions
    PartiallyCompleted,

    /// Failed before any transaction was submitted
    Failed { error: String },

    /// Safety limit was reached
    SafetyLimitReached { limit: String },
}
