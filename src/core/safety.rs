//! Safety limits and enforcement for apply runs.
//!
//! Prevents runaway execution through configurable limits on:
//! - Number of transactions per plan and per chain
//! - Run and confirmation timeouts

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Eid, PendingTransaction};

/// Safety limits for an apply run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyLimits {
    /// Maximum number of transactions per plan (default: 200)
    #[serde(default = "default_max_transactions")]
    pub max_transactions: u32,

    /// Maximum number of transactions on a single chain (default: 100)
    #[serde(default = "default_max_transactions_per_chain")]
    pub max_transactions_per_chain: u32,

    /// Total run timeout in seconds (default: 3600 = 1 hour)
    #[serde(default = "default_run_timeout")]
    pub run_timeout_seconds: u64,

    /// Per-transaction confirmation timeout in seconds (default: 300 = 5 min)
    #[serde(default = "default_confirmation_timeout")]
    pub confirmation_timeout_seconds: u64,
}

fn default_max_transactions() -> u32 {
    200
}
fn default_max_transactions_per_chain() -> u32 {
    100
}
fn default_run_timeout() -> u64 {
    3600
} // 1 hour
fn default_confirmation_timeout() -> u64 {
    300
} // 5 min

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_transactions: default_max_transactions(),
            max_transactions_per_chain: default_max_transactions_per_chain(),
            run_timeout_seconds: default_run_timeout(),
            confirmation_timeout_seconds: default_confirmation_timeout(),
        }
    }
}

impl SafetyLimits {
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_seconds)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_seconds)
    }

    /// Validate a plan against the transaction limits
    pub fn validate_plan(&self, transactions: &[PendingTransaction]) -> Result<(), SafetyViolation> {
        let total = transactions.len() as u32;
        if total > self.max_transactions {
            return Err(SafetyViolation::MaxTransactions {
                actual: total,
                limit: self.max_transactions,
            });
        }

        let mut per_chain: HashMap<Eid, u32> = HashMap::new();
        for transaction in transactions {
            *per_chain.entry(transaction.eid()).or_default() += 1;
        }

        let busiest = per_chain.into_iter().max_by_key(|(eid, count)| (*count, std::cmp::Reverse(*eid)));
        if let Some((eid, count)) = busiest {
            if count > self.max_transactions_per_chain {
                return Err(SafetyViolation::MaxTransactionsPerChain {
                    eid,
                    actual: count,
                    limit: self.max_transactions_per_chain,
                });
            }
        }

        Ok(())
    }

    /// Check current tracker state against limits
    pub fn check(&self, tracker: &SafetyTracker) -> Result<(), SafetyViolation> {
        if tracker.transactions_planned > self.max_transactions {
            return Err(SafetyViolation::MaxTransactions {
                actual: tracker.transactions_planned,
                limit: self.max_transactions,
            });
        }

        let elapsed = tracker.started_at.elapsed().as_secs();
        if elapsed >= self.run_timeout_seconds {
            return Err(SafetyViolation::RunTimeout {
                elapsed_seconds: elapsed,
                limit_seconds: self.run_timeout_seconds,
            });
        }

        Ok(())
    }
}

/// Tracks resource usage during a run
#[derive(Debug, Clone)]
pub struct SafetyTracker {
    /// Number of transactions in the plan
    pub transactions_planned: u32,

    /// When the run started
    pub started_at: Instant,
}

impl Default for SafetyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self {
            transactions_planned: 0,
            started_at: Instant::now(),
        }
    }

    /// Record the size of the computed plan
    pub fn record_plan(&mut self, transactions: usize) {
        self.transactions_planned += transactions as u32;
    }

    /// Get elapsed time in seconds
    pub fn elapsed_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Safety violation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SafetyViolation {
    #[error("Maximum transactions exceeded: {actual} > {limit}")]
    MaxTransactions { actual: u32, limit: u32 },

    #[error("Maximum transactions on chain {eid} exceeded: {actual} > {limit}")]
    MaxTransactionsPerChain { eid: Eid, actual: u32, limit: u32 },

    #[error("Run timeout: {elapsed_seconds}s >= {limit_seconds}s")]
    RunTimeout {
        elapsed_seconds: u64,
        limit_seconds: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Point};

    fn tx(eid: u32) -> PendingTransaction {
        PendingTransaction::new(Point::new(Eid(eid), Address::parse("0x1").unwrap()), vec![1], "tx")
    }

    #[test]
    fn test_default_limits() {
        let limits = SafetyLimits::default();
        assert_eq!(limits.max_transactions, 200);
        assert_eq!(limits.run_timeout(), Duration::from_secs(3600));
        assert_eq!(limits.confirmation_timeout_seconds, 300);
    }

    #[test]
    fn test_validate_plan_per_chain() {
        let limits = SafetyLimits {
            max_transactions_per_chain: 2,
            ..Default::default()
        };

        assert!(limits.validate_plan(&[tx(1), tx(1), tx(2), tx(2)]).is_ok());
        assert_eq!(
            limits.validate_plan(&[tx(1), tx(2), tx(2), tx(2)]),
            Err(SafetyViolation::MaxTransactionsPerChain {
                eid: Eid(2),
                actual: 3,
                limit: 2
            })
        );
    }

    #[test]
    fn test_tracker_plan_counting() {
        let limits = SafetyLimits {
            max_transactions: 2,
            ..Default::default()
        };

        let mut tracker = SafetyTracker::new();
        tracker.record_plan(2);
        assert!(limits.check(&tracker).is_ok());

        tracker.record_plan(1);
        let result = limits.check(&tracker);
        assert!(matches!(result, Err(SafetyViolation::MaxTransactions { .. })));
    }
}
