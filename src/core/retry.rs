//! Retry strategies and the retry wrapper.
//!
//! A strategy is consulted after every failed attempt and decides whether
//! to stop, retry with the same input, or retry with a new input (for
//! example a transaction with a bumped fee). The wrapper remembers the
//! latest input it was given, while the original input handed to the
//! strategy never changes.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Outcome of a retry strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision<I> {
    /// Give up and return the last error
    Stop,

    /// Retry with the current input
    Continue,

    /// Retry with a new input, which becomes the current input
    ContinueWith(I),
}

/// Decides what happens after a failed attempt.
///
/// `attempt` is 1-based: the first failure is attempt 1.
pub trait RetryStrategy<I, E>: Send + Sync {
    fn decide(&self, attempt: u32, error: &E, current: &I, original: &I) -> RetryDecision<I>;
}

impl<I, E, F> RetryStrategy<I, E> for F
where
    F: Fn(u32, &E, &I, &I) -> RetryDecision<I> + Send + Sync,
{
    fn decide(&self, attempt: u32, error: &E, current: &I, original: &I) -> RetryDecision<I> {
        self(attempt, error, current, original)
    }
}

/// Strategy that always retries
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<I, E> RetryStrategy<I, E> for AlwaysRetry {
    fn decide(&self, _attempt: u32, _error: &E, _current: &I, _original: &I) -> RetryDecision<I> {
        RetryDecision::Continue
    }
}

/// Invalid retry configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryConfigError {
    #[error("Number of attempts for a strategy must be larger than 0, got {0}")]
    InvalidAttempts(u32),
}

/// Retries up to `max_attempts` times, delegating to a wrapped strategy
/// while within budget.
#[derive(Debug, Clone)]
pub struct SimpleRetryStrategy<S = AlwaysRetry> {
    max_attempts: u32,
    wrapped: S,
}

/// Three attempts, always retrying within budget
impl Default for SimpleRetryStrategy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            wrapped: AlwaysRetry,
        }
    }
}

impl SimpleRetryStrategy {
    pub fn new(max_attempts: u32) -> Result<Self, RetryConfigError> {
        Self::wrapping(max_attempts, AlwaysRetry)
    }
}

impl<S> SimpleRetryStrategy<S> {
    pub fn wrapping(max_attempts: u32, wrapped: S) -> Result<Self, RetryConfigError> {
        if max_attempts < 1 {
            return Err(RetryConfigError::InvalidAttempts(max_attempts));
        }
        Ok(Self { max_attempts, wrapped })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl<I, E, S> RetryStrategy<I, E> for SimpleRetryStrategy<S>
where
    S: RetryStrategy<I, E>,
{
    fn decide(&self, attempt: u32, error: &E, current: &I, original: &I) -> RetryDecision<I> {
        if attempt > self.max_attempts {
            return RetryDecision::Stop;
        }
        self.wrapped.decide(attempt, error, current, original)
    }
}

/// Delay between attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay after the first failure in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each retry)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10_000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl Backoff {
    /// Retry immediately
    pub fn none() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }
}

/// Wraps fallible async functions with a retry strategy
#[derive(Debug, Clone)]
pub struct RetryFactory<S = SimpleRetryStrategy> {
    strategy: S,
    backoff: Backoff,
}

impl Default for RetryFactory {
    fn default() -> Self {
        Self {
            strategy: SimpleRetryStrategy::default(),
            backoff: Backoff::default(),
        }
    }
}

impl RetryFactory {
    /// Simple strategy with the given number of attempts
    pub fn with_max_attempts(max_attempts: u32) -> Result<Self, RetryConfigError> {
        Ok(Self::new(SimpleRetryStrategy::new(max_attempts)?))
    }
}

impl<S> RetryFactory<S> {
    pub fn new(strategy: S) -> Self {
        Self {
            strategy,
            backoff: Backoff::default(),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Call `task` with `input`, retrying per the strategy.
    ///
    /// Returns the first success or the error of the last attempt.
    pub async fn call<I, T, E, F, Fut>(&self, mut task: F, input: I) -> Result<T, E>
    where
        S: RetryStrategy<I, E>,
        I: Clone,
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let original = input.clone();
        let mut current = input;
        let mut attempt = 0u32;

        loop {
            let error = match task(current.clone()).await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };
            attempt += 1;

            match self.strategy.decide(attempt, &error, &current, &original) {
                RetryDecision::Stop => return Err(error),
                RetryDecision::Continue => {}
                RetryDecision::ContinueWith(next) => current = next,
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Attempt failed, retrying");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delays() {
        let backoff = Backoff {
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
        };

        assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(backoff.delay_for_attempt(3), Duration::from_millis(4000));
        assert_eq!(backoff.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(backoff.delay_for_attempt(5), Duration::from_millis(10000)); // Capped
    }

    #[test]
    fn test_no_backoff() {
        assert!(Backoff::none().delay_for_attempt(7).is_zero());
    }

    #[test]
    fn test_simple_strategy_rejects_zero_attempts() {
        assert_eq!(
            SimpleRetryStrategy::new(0).unwrap_err(),
            RetryConfigError::InvalidAttempts(0)
        );
    }

    #[test]
    fn test_simple_strategy_budget() {
        let strategy = SimpleRetryStrategy::new(2).unwrap();
        let decide = |attempt| RetryStrategy::<(), ()>::decide(&strategy, attempt, &(), &(), &());

        assert_eq!(decide(1), RetryDecision::Continue);
        assert_eq!(decide(2), RetryDecision::Continue);
        assert_eq!(decide(3), RetryDecision::Stop);
    }
}
