//! Event types for the run log.
//!
//! Every `apply` run records what it did as immutable events in an
//! append-only log, so an operator can see afterwards which transactions
//! landed and which did not.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::point::Eid;

/// A single event in the append-only run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Chain the event refers to (if applicable)
    pub eid: Option<Eid>,

    /// Type of event
    pub event_type: EventType,

    /// Idempotency key format: "{run_id}:{eid}:{data_hash}"
    pub idempotency_key: String,

    /// Human-readable summary
    pub payload_summary: String,

    /// Status of the transaction/run
    pub status: Status,

    /// Transaction hash (for submitted transactions)
    pub hash: Option<String>,

    /// Error message if failed
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        eid: Option<Eid>,
        event_type: EventType,
        idempotency_key: String,
        payload_summary: String,
        status: Status,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            eid,
            event_type,
            idempotency_key,
            payload_summary,
            status,
            hash: None,
            error: None,
        }
    }

    pub fn with_hash(mut self, hash: String) -> Self {
        self.hash = Some(hash);
        self
    }

    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events that can occur during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A new run has started
    RunStarted,

    /// Reconciliation finished and produced a plan
    PlanComputed,

    /// A transaction was submitted and confirmed
    TransactionConfirmed,

    /// A transaction failed (simulation, signing, submission or confirmation)
    TransactionFailed,

    /// A transaction was never attempted
    TransactionSkipped,

    /// A run completed (possibly with failed transactions)
    RunCompleted,

    /// A run failed before submitting
    RunFailed,

    /// A safety limit was reached, halting execution
    SafetyLimitReached,
}

/// Status of a transaction or run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Not yet started
    #[default]
    Pending,

    /// Currently executing
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Not attempted
    Skipped,
}
