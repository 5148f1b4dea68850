//! Core engine logic.
//!
//! This module contains:
//! - Promise/Retry: async combinators and the retry wrapper
//! - Configure: machinery shared by the entity reconcilers
//! - Pipeline: signing, submission and confirmation of transactions
//! - Safety: Safety limits and enforcement
//! - EventStore: Append-only run log
//! - Orchestrator: plan and apply runs

pub mod configure;
pub mod event_store;
pub mod orchestrator;
pub mod pipeline;
pub mod promise;
pub mod retry;
pub mod safety;

// Re-export commonly used types
pub use configure::{
    Changes, ConfigDiff, ConfigureContext, ConfigureError, ConfigureResult, HandleError, HandleFactory,
};
pub use event_store::{generate_idempotency_key, transaction_key, EventStore};
pub use orchestrator::{ApplyOutcome, Orchestrator, Plan};
pub use pipeline::{execute, ExecuteOptions, FailureStage, Report, Signer, SignerFactory, TransactionOutcome};
pub use retry::{Backoff, RetryDecision, RetryFactory, RetryStrategy, SimpleRetryStrategy};
pub use safety::{SafetyLimits, SafetyTracker, SafetyViolation};
