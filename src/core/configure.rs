//! Shared machinery of the entity reconcilers.
//!
//! A reconciler walks a configuration graph, reads the actual state of
//! every contract through a remote handle and emits a transaction only
//! where the actual state differs from the declared one. This module owns
//! the pieces every reconciler needs:
//!
//! - `HandleFactory` / `SdkCache`: handle creation, memoized per point for one run
//! - `ConfigureContext`: the cache plus the read retry policy
//! - `Changes` / `ConfigDiff`: the produced transactions and their explanation
//! - `configure_nodes`, `configure_edges`, `configure_multiple`: the walks

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all, LocalBoxFuture};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use super::retry::{Backoff, RetryDecision, RetryFactory, RetryStrategy, SimpleRetryStrategy};
use crate::domain::{Edge, Graph, Node, PendingTransaction, Point};

/// Errors returned by remote handle reads
#[derive(Debug, Error)]
pub enum HandleError {
    /// The value was never configured on chain
    #[error("Value is not set")]
    NotSet,

    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl HandleError {
    pub fn is_not_set(&self) -> bool {
        matches!(self, Self::NotSet)
    }
}

/// Creates the remote handle of one contract
#[async_trait]
pub trait HandleFactory<H: ?Sized>: Send + Sync {
    async fn create(&self, point: &Point) -> anyhow::Result<Arc<H>>;
}

/// Per-run memoization of handles by point.
///
/// Owned by a single run; nothing is shared between runs. Each point has
/// its own cell, so concurrent lookups of one point call the factory once.
pub struct SdkCache<H: ?Sized> {
    factory: Arc<dyn HandleFactory<H>>,
    handles: Mutex<HashMap<Point, Arc<OnceCell<Arc<H>>>>>,
}

impl<H: ?Sized> SdkCache<H> {
    pub fn new(factory: Arc<dyn HandleFactory<H>>) -> Self {
        Self {
            factory,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Get the handle for a point, creating it on first use
    pub async fn get(&self, point: &Point) -> Result<Arc<H>, ConfigureError> {
        let cell = Arc::clone(self.handles.lock().await.entry(point.clone()).or_default());

        let handle = cell
            .get_or_try_init(|| async {
                debug!(%point, "Creating handle");
                self.factory
                    .create(point)
                    .await
                    .map_err(|source| ConfigureError::Setup {
                        point: point.clone(),
                        source,
                    })
            })
            .await?;

        Ok(Arc::clone(handle))
    }

    /// Number of handles created so far
    pub async fn len(&self) -> usize {
        self.handles
            .lock()
            .await
            .values()
            .filter(|cell| cell.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Retry strategy for remote reads.
///
/// `NotSet` is an answer, not a failure, so it is never retried.
#[derive(Debug, Clone)]
pub struct ReadRetryStrategy {
    inner: SimpleRetryStrategy,
}

impl ReadRetryStrategy {
    pub fn new(inner: SimpleRetryStrategy) -> Self {
        Self { inner }
    }
}

impl Default for ReadRetryStrategy {
    fn default() -> Self {
        Self {
            inner: SimpleRetryStrategy::default(),
        }
    }
}

impl<I> RetryStrategy<I, HandleError> for ReadRetryStrategy {
    fn decide(&self, attempt: u32, error: &HandleError, current: &I, original: &I) -> RetryDecision<I> {
        if error.is_not_set() {
            return RetryDecision::Stop;
        }
        self.inner.decide(attempt, error, current, original)
    }
}

/// Everything a reconciler needs for one run
pub struct ConfigureContext<H: ?Sized> {
    sdks: SdkCache<H>,
    read_retry: RetryFactory<ReadRetryStrategy>,
}

impl<H: ?Sized> ConfigureContext<H> {
    pub fn new(factory: Arc<dyn HandleFactory<H>>) -> Self {
        Self {
            sdks: SdkCache::new(factory),
            read_retry: RetryFactory::new(ReadRetryStrategy::default()),
        }
    }

    pub fn with_read_retry(mut self, read_retry: RetryFactory<ReadRetryStrategy>) -> Self {
        self.read_retry = read_retry;
        self
    }

    /// Read retry with the given attempts and backoff
    pub fn with_read_attempts(self, strategy: SimpleRetryStrategy, backoff: Backoff) -> Self {
        self.with_read_retry(RetryFactory::new(ReadRetryStrategy::new(strategy)).with_backoff(backoff))
    }

    pub fn sdks(&self) -> &SdkCache<H> {
        &self.sdks
    }

    pub async fn sdk(&self, point: &Point) -> Result<Arc<H>, ConfigureError> {
        self.sdks.get(point).await
    }

    /// Perform a remote read with retries.
    ///
    /// A value that was never configured comes back as `None`.
    pub async fn read<T, F, Fut>(&self, mut read: F) -> Result<Option<T>, HandleError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, HandleError>>,
    {
        match self.read_retry.call(|()| read(), ()).await {
            Ok(value) => Ok(Some(value)),
            Err(HandleError::NotSet) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

/// One divergence between declared and actual configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfigDiff {
    /// Point or vector label
    pub scope: String,

    /// Setting that differs
    pub field: String,

    /// Value from the configuration graph
    pub declared: serde_json::Value,

    /// Value read from chain (null when not set)
    pub actual: serde_json::Value,
}

impl fmt::Display for ConfigDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} (declared) != {} (actual)",
            self.scope, self.field, self.declared, self.actual
        )
    }
}

/// Output of a reconciler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub transactions: Vec<PendingTransaction>,
    pub diffs: Vec<ConfigDiff>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a transaction together with the divergence it fixes
    pub fn record<D, A>(
        &mut self,
        transaction: PendingTransaction,
        scope: impl fmt::Display,
        field: &str,
        declared: &D,
        actual: &A,
    ) where
        D: Serialize + ?Sized,
        A: Serialize + ?Sized,
    {
        self.diffs.push(ConfigDiff {
            scope: scope.to_string(),
            field: field.to_string(),
            declared: serde_json::to_value(declared).unwrap_or_default(),
            actual: serde_json::to_value(actual).unwrap_or_default(),
        });
        self.transactions.push(transaction);
    }

    pub fn extend(&mut self, other: Changes) {
        self.transactions.extend(other.transactions);
        self.diffs.extend(other.diffs);
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// A node or edge whose remote state could not be read
#[derive(Debug)]
pub struct ConfigureFailure {
    /// Point or vector label
    pub scope: String,

    pub error: HandleError,
}

impl fmt::Display for ConfigureFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.error)
    }
}

/// Errors returned by the reconcilers
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// A handle could not be created; nothing else was attempted
    #[error("Failed to create handle for {point}: {source}")]
    Setup {
        point: Point,
        #[source]
        source: anyhow::Error,
    },

    /// Some nodes or edges failed; `partial` holds everything else
    #[error("Failed to configure {} item(s): {}", .failures.len(), summarize(.failures))]
    Aggregate {
        failures: Vec<ConfigureFailure>,
        partial: Changes,
    },
}

fn summarize(failures: &[ConfigureFailure]) -> String {
    failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

pub type ConfigureResult = Result<Changes, ConfigureError>;

/// Merges the results of several configurators
#[derive(Debug, Default)]
pub struct ChangeCollector {
    changes: Changes,
    failures: Vec<ConfigureFailure>,
}

impl ChangeCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absorb a result; setup errors are passed through
    pub fn add(&mut self, result: ConfigureResult) -> Result<(), ConfigureError> {
        match result {
            Ok(changes) => self.changes.extend(changes),
            Err(ConfigureError::Aggregate { failures, partial }) => {
                self.changes.extend(partial);
                self.failures.extend(failures);
            }
            Err(setup @ ConfigureError::Setup { .. }) => return Err(setup),
        }
        Ok(())
    }

    /// Record the outcome of one node or edge
    fn add_item(&mut self, scope: String, outcome: Result<Changes, HandleError>) {
        match outcome {
            Ok(changes) => self.changes.extend(changes),
            Err(error) => {
                warn!(scope = %scope, error = %error, "Failed to read remote configuration, skipping");
                self.failures.push(ConfigureFailure { scope, error });
            }
        }
    }

    pub fn finish(self) -> ConfigureResult {
        if self.failures.is_empty() {
            Ok(self.changes)
        } else {
            Err(ConfigureError::Aggregate {
                failures: self.failures,
                partial: self.changes,
            })
        }
    }
}

/// Run a node-scoped configurator over every node of the graph.
///
/// Handles are created first; a factory failure aborts before any read.
/// Nodes are read concurrently and the output keeps graph order.
pub async fn configure_nodes<'a, N, E, H, F, Fut>(
    graph: &'a Graph<N, E>,
    ctx: &'a ConfigureContext<H>,
    configure: F,
) -> ConfigureResult
where
    H: ?Sized,
    F: Fn(Arc<H>, &'a Node<N>) -> Fut,
    Fut: Future<Output = Result<Changes, HandleError>>,
{
    let nodes: Vec<&Node<N>> = graph.nodes().collect();
    let sdks = try_join_all(nodes.iter().map(|node| ctx.sdk(&node.point))).await?;

    let configure = &configure;
    let outcomes = join_all(
        nodes
            .into_iter()
            .zip(sdks)
            .map(|(node, sdk)| async move { (node.point.to_string(), configure(sdk, node).await) }),
    )
    .await;

    let mut collector = ChangeCollector::new();
    for (scope, outcome) in outcomes {
        collector.add_item(scope, outcome);
    }
    collector.finish()
}

/// Run an edge-scoped configurator over every edge of the graph.
///
/// The handle is the one of the edge's `from` point.
pub async fn configure_edges<'a, N, E, H, F, Fut>(
    graph: &'a Graph<N, E>,
    ctx: &'a ConfigureContext<H>,
    configure: F,
) -> ConfigureResult
where
    H: ?Sized,
    F: Fn(Arc<H>, &'a Edge<E>) -> Fut,
    Fut: Future<Output = Result<Changes, HandleError>>,
{
    let edges: Vec<&Edge<E>> = graph.edges().collect();
    let sdks = try_join_all(edges.iter().map(|edge| ctx.sdk(&edge.vector.from))).await?;

    let configure = &configure;
    let outcomes = join_all(
        edges
            .into_iter()
            .zip(sdks)
            .map(|(edge, sdk)| async move { (edge.vector.to_string(), configure(sdk, edge).await) }),
    )
    .await;

    let mut collector = ChangeCollector::new();
    for (scope, outcome) in outcomes {
        collector.add_item(scope, outcome);
    }
    collector.finish()
}

/// Run configurators one after another and merge their output.
///
/// A setup error stops the remaining configurators.
pub async fn configure_multiple(configurators: Vec<LocalBoxFuture<'_, ConfigureResult>>) -> ConfigureResult {
    let mut collector = ChangeCollector::new();
    for configurator in configurators {
        collector.add(configurator.await)?;
    }
    collector.finish()
}
