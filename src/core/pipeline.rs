//! The transaction pipeline: the only place where side effects happen.
//!
//! Transactions are grouped by chain. Every chain gets its signer and
//! nonce snapshot before anything is submitted. Chains then run
//! concurrently while the transactions of one chain run strictly in
//! order, each consuming the next nonce. A failure on a chain leaves the
//! rest of that chain pending, because later nonces would be stuck behind
//! the missing one anyway.
//!
//! An optional deadline stops scheduling in the same way: calls already in
//! flight finish, transactions not yet started stay pending.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use super::promise::parallel;
use super::retry::RetryFactory;
use crate::domain::{group_indices_by_eid, Eid, PendingTransaction, SignedTransaction, TransactionHash, TransactionReceipt};

/// Signs and submits transactions for one chain
#[async_trait]
pub trait Signer: Send + Sync {
    /// Next nonce of the signing account
    async fn nonce(&self) -> anyhow::Result<u64>;

    /// Dry-run a transaction without submitting it
    async fn simulate(&self, transaction: &PendingTransaction) -> anyhow::Result<()>;

    async fn sign(&self, transaction: &PendingTransaction, nonce: u64) -> anyhow::Result<SignedTransaction>;

    async fn submit(&self, signed: &SignedTransaction) -> anyhow::Result<TransactionHash>;

    /// Wait until the transaction is included
    async fn confirm(&self, hash: &TransactionHash) -> anyhow::Result<TransactionReceipt>;
}

/// Creates the signer of a chain
#[async_trait]
pub trait SignerFactory: Send + Sync {
    async fn create(&self, eid: Eid) -> anyhow::Result<Arc<dyn Signer>>;
}

/// Options for `execute`
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Simulate every transaction before signing it
    pub simulate: bool,

    /// Stop scheduling transactions on every chain after the first failure
    pub abort_on_first_failure: bool,

    /// How long to wait for each confirmation
    pub confirmation_timeout: Duration,

    /// Retry policy for submissions
    pub submit_retry: RetryFactory,

    /// No transaction is started after this instant
    pub deadline: Option<Instant>,
}

impl ExecuteOptions {
    /// Copy of these options whose deadline is at most `deadline`
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            ..self.clone()
        }
    }

    fn deadline_passed(&self) -> bool {
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            abort_on_first_failure: false,
            confirmation_timeout: Duration::from_secs(300),
            submit_retry: RetryFactory::default(),
            deadline: None,
        }
    }
}

/// Where a transaction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Simulate,
    Sign,
    Submit,
    Confirm,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage = match self {
            Self::Simulate => "simulate",
            Self::Sign => "sign",
            Self::Submit => "submit",
            Self::Confirm => "confirm",
        };
        f.write_str(stage)
    }
}

/// What happened to one transaction
#[derive(Debug)]
pub enum TransactionOutcome {
    Confirmed {
        hash: TransactionHash,
        nonce: u64,
        block: Option<u64>,
    },

    Failed {
        stage: FailureStage,
        cause: anyhow::Error,
    },

    /// Never attempted
    Pending,
}

impl TransactionOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[derive(Debug)]
pub struct TransactionReport {
    pub transaction: PendingTransaction,
    pub outcome: TransactionOutcome,
}

/// Result of `execute`, one entry per input transaction in input order
#[derive(Debug, Default)]
pub struct Report {
    pub transactions: Vec<TransactionReport>,

    /// Some transactions were left pending because the deadline passed
    pub deadline_reached: bool,
}

impl Report {
    pub fn confirmed(&self) -> impl Iterator<Item = &TransactionReport> {
        self.transactions.iter().filter(|r| r.outcome.is_confirmed())
    }

    pub fn failed(&self) -> impl Iterator<Item = &TransactionReport> {
        self.transactions.iter().filter(|r| r.outcome.is_failed())
    }

    pub fn pending(&self) -> impl Iterator<Item = &TransactionReport> {
        self.transactions.iter().filter(|r| r.outcome.is_pending())
    }

    /// Every transaction was confirmed
    pub fn is_success(&self) -> bool {
        self.transactions.iter().all(|r| r.outcome.is_confirmed())
    }
}

/// Errors that abort `execute` before anything is submitted
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to set up signer for chain {eid}: {source}")]
    Setup {
        eid: Eid,
        #[source]
        source: anyhow::Error,
    },
}

/// Why a chain stops scheduling transactions
#[derive(Default)]
struct StopFlags {
    aborted: AtomicBool,
    deadline_reached: AtomicBool,
}

struct ChainSigner {
    signer: Arc<dyn Signer>,
    nonce: u64,
}

/// Sign, submit and confirm transactions.
///
/// Per-transaction failures end up in the report; only setup failures
/// make this function fail.
#[instrument(skip_all, fields(transactions = transactions.len()))]
pub async fn execute(
    transactions: &[PendingTransaction],
    signers: &dyn SignerFactory,
    options: &ExecuteOptions,
) -> Result<Report, PipelineError> {
    let chains = group_indices_by_eid(transactions);

    let chain_signers = parallel(chains.iter().map(|&(eid, _)| {
        move || async move {
            let setup = |source| PipelineError::Setup { eid, source };
            let signer = signers.create(eid).await.map_err(setup)?;
            let nonce = signer.nonce().await.map_err(setup)?;
            debug!(eid = %eid, nonce, "Signer ready");
            Ok::<_, PipelineError>(ChainSigner { signer, nonce })
        }
    }))
    .await?;

    let flags = StopFlags::default();
    let chain_outcomes = join_all(
        chains
            .iter()
            .zip(chain_signers)
            .map(|((eid, indices), signer)| execute_chain(*eid, indices, transactions, signer, options, &flags)),
    )
    .await;

    let mut outcomes: Vec<Option<TransactionOutcome>> = transactions.iter().map(|_| None).collect();
    for (index, outcome) in chain_outcomes.into_iter().flatten() {
        outcomes[index] = Some(outcome);
    }

    let report = Report {
        transactions: transactions
            .iter()
            .zip(outcomes)
            .map(|(transaction, outcome)| TransactionReport {
                transaction: transaction.clone(),
                outcome: outcome.unwrap_or(TransactionOutcome::Pending),
            })
            .collect(),
        deadline_reached: flags.deadline_reached.load(Ordering::SeqCst),
    };

    info!(
        confirmed = report.confirmed().count(),
        failed = report.failed().count(),
        pending = report.pending().count(),
        deadline_reached = report.deadline_reached,
        "Pipeline finished"
    );

    Ok(report)
}

async fn execute_chain(
    eid: Eid,
    indices: &[usize],
    transactions: &[PendingTransaction],
    signer: ChainSigner,
    options: &ExecuteOptions,
    flags: &StopFlags,
) -> Vec<(usize, TransactionOutcome)> {
    let mut outcomes = Vec::with_capacity(indices.len());
    let mut next_nonce = signer.nonce;
    let mut halted = false;

    for &index in indices {
        if halted || flags.aborted.load(Ordering::SeqCst) {
            outcomes.push((index, TransactionOutcome::Pending));
            continue;
        }
        if options.deadline_passed() {
            flags.deadline_reached.store(true, Ordering::SeqCst);
            outcomes.push((index, TransactionOutcome::Pending));
            continue;
        }

        let transaction = &transactions[index];
        let nonce = next_nonce;
        next_nonce += 1;

        let outcome = match execute_transaction(signer.signer.as_ref(), transaction, nonce, options).await {
            Ok(receipt) => {
                info!(eid = %eid, nonce, hash = %receipt.hash, "{}", transaction.description);
                TransactionOutcome::Confirmed {
                    hash: receipt.hash,
                    nonce,
                    block: receipt.block,
                }
            }
            Err((stage, cause)) => {
                error!(eid = %eid, nonce, %stage, error = %cause, "Transaction failed: {}", transaction.description);
                halted = true;
                if options.abort_on_first_failure {
                    flags.aborted.store(true, Ordering::SeqCst);
                }
                TransactionOutcome::Failed { stage, cause }
            }
        };
        outcomes.push((index, outcome));
    }

    let pending = outcomes.iter().filter(|(_, o)| o.is_pending()).count();
    if pending > 0 {
        warn!(eid = %eid, pending, "Transactions left pending");
    }

    outcomes
}

async fn execute_transaction(
    signer: &dyn Signer,
    transaction: &PendingTransaction,
    nonce: u64,
    options: &ExecuteOptions,
) -> Result<TransactionReceipt, (FailureStage, anyhow::Error)> {
    if options.simulate {
        signer
            .simulate(transaction)
            .await
            .map_err(|e| (FailureStage::Simulate, e))?;
    }

    let signed = signer
        .sign(transaction, nonce)
        .await
        .map_err(|e| (FailureStage::Sign, e))?;

    let hash = options
        .submit_retry
        .call(|signed: SignedTransaction| async move { signer.submit(&signed).await }, signed)
        .await
        .map_err(|e| (FailureStage::Submit, e))?;

    match tokio::time::timeout(options.confirmation_timeout, signer.confirm(&hash)).await {
        Ok(receipt) => receipt.map_err(|e| (FailureStage::Confirm, e)),
        Err(_) => Err((
            FailureStage::Confirm,
            anyhow!(
                "Timed out after {}s waiting for {}",
                options.confirmation_timeout.as_secs(),
                hash
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_deadline_keeps_the_earliest() {
        let now = Instant::now();
        let early = now + Duration::from_secs(1);
        let late = now + Duration::from_secs(10);

        let options = ExecuteOptions::default().with_deadline(late);
        assert_eq!(options.deadline, Some(late));
        assert_eq!(options.with_deadline(early).deadline, Some(early));
        assert_eq!(options.with_deadline(early).with_deadline(late).deadline, Some(early));
    }

    #[test]
    fn test_report_without_transactions_is_success() {
        assert!(Report::default().is_success());
    }
}
