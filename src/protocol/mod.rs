//! Entity reconcilers and the wire config that feeds them.
//!
//! A wire config file declares one optional graph per entity type:
//!
//! ```yaml
//! verifier:
//!   contracts:
//!     - point: { eid: 30101, address: "0x..." }
//!       config:
//!         signers: { signers: ["0x...", "0x..."], quorum: 2 }
//!   connections: []
//! ```
//!
//! `configure_all` reconciles every declared graph. Entities run in a
//! fixed order: price feeds and workers first, then the libraries, then
//! the endpoint, whose defaults point at those libraries.

pub mod endpoint;
pub mod executor;
pub mod message_lib;
pub mod price_feed;
pub mod read_lib;
pub mod verifier;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::core::configure::{configure_multiple, Changes, ConfigureContext, ConfigureError, HandleFactory};
use crate::core::retry::{Backoff, SimpleRetryStrategy};
use crate::domain::{Graph, GraphDefinition, GraphError};

pub use endpoint::{configure_endpoint, EndpointContext, EndpointGraph, EndpointSdk};
pub use executor::{configure_executor, ExecutorContext, ExecutorGraph, ExecutorSdk};
pub use message_lib::{configure_message_lib, MessageLibContext, MessageLibGraph, MessageLibSdk};
pub use price_feed::{configure_price_feed, PriceFeedContext, PriceFeedGraph, PriceFeedSdk};
pub use read_lib::{configure_read_lib, ReadLibContext, ReadLibGraph, ReadLibSdk};
pub use verifier::{configure_verifier, VerifierContext, VerifierGraph, VerifierSdk};

/// Entity types known to the wire config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    PriceFeed,
    Verifier,
    Executor,
    MessageLib,
    ReadLib,
    Endpoint,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::PriceFeed => "price_feed",
            Self::Verifier => "verifier",
            Self::Executor => "executor",
            Self::MessageLib => "message_lib",
            Self::ReadLib => "read_lib",
            Self::Endpoint => "endpoint",
        };
        f.write_str(name)
    }
}

/// Errors of the wire layer
#[derive(Debug, Error)]
pub enum WireError {
    #[error("Invalid {entity} graph: {source}")]
    Graph {
        entity: Entity,
        #[source]
        source: GraphError,
    },

    #[error("The {entity} graph is declared but no handle factory was provided for it")]
    MissingFactory { entity: Entity },

    #[error(transparent)]
    Configure(#[from] ConfigureError),
}

type Definition<N, E> = Option<GraphDefinition<N, E>>;

/// Declarative wire config, one optional graph per entity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_feed: Definition<price_feed::PriceFeedNodeConfig, price_feed::Price>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Definition<verifier::VerifierNodeConfig, verifier::VerifierDstConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Definition<executor::ExecutorNodeConfig, executor::ExecutorDstConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_lib: Definition<(), message_lib::MessageLibEdgeConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_lib: Definition<read_lib::ReadLibNodeConfig, ()>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Definition<endpoint::EndpointNodeConfig, endpoint::EndpointEdgeConfig>,
}

impl WireConfig {
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse wire config")
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read wire config: {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Invalid wire config: {}", path.display()))
    }

    /// Validate every declared graph through the graph builder
    pub fn graphs(self) -> Result<WireGraphs, WireError> {
        Ok(WireGraphs {
            price_feed: build(Entity::PriceFeed, self.price_feed)?,
            verifier: build(Entity::Verifier, self.verifier)?,
            executor: build(Entity::Executor, self.executor)?,
            message_lib: build(Entity::MessageLib, self.message_lib)?,
            read_lib: build(Entity::ReadLib, self.read_lib)?,
            endpoint: build(Entity::Endpoint, self.endpoint)?,
        })
    }
}

fn build<N, E>(entity: Entity, definition: Definition<N, E>) -> Result<Option<Graph<N, E>>, WireError> {
    definition
        .map(Graph::from_definition)
        .transpose()
        .map_err(|source| WireError::Graph { entity, source })
}

/// Validated graphs of a wire config
#[derive(Debug, Clone, Default)]
pub struct WireGraphs {
    pub price_feed: Option<PriceFeedGraph>,
    pub verifier: Option<VerifierGraph>,
    pub executor: Option<ExecutorGraph>,
    pub message_lib: Option<MessageLibGraph>,
    pub read_lib: Option<ReadLibGraph>,
    pub endpoint: Option<EndpointGraph>,
}

impl WireGraphs {
    /// Entities with a declared graph, in reconcile order
    pub fn entities(&self) -> Vec<Entity> {
        [
            (Entity::PriceFeed, self.price_feed.is_some()),
            (Entity::Verifier, self.verifier.is_some()),
            (Entity::Executor, self.executor.is_some()),
            (Entity::MessageLib, self.message_lib.is_some()),
            (Entity::ReadLib, self.read_lib.is_some()),
            (Entity::Endpoint, self.endpoint.is_some()),
        ]
        .into_iter()
        .filter_map(|(entity, declared)| declared.then_some(entity))
        .collect()
    }
}

/// Handle factories per entity; entities without a graph may be left out
#[derive(Clone, Default)]
pub struct SdkFactories {
    pub price_feed: Option<Arc<dyn HandleFactory<dyn PriceFeedSdk>>>,
    pub verifier: Option<Arc<dyn HandleFactory<dyn VerifierSdk>>>,
    pub executor: Option<Arc<dyn HandleFactory<dyn ExecutorSdk>>>,
    pub message_lib: Option<Arc<dyn HandleFactory<dyn MessageLibSdk>>>,
    pub read_lib: Option<Arc<dyn HandleFactory<dyn ReadLibSdk>>>,
    pub endpoint: Option<Arc<dyn HandleFactory<dyn EndpointSdk>>>,
}

/// Read retry shared by every reconciler context
#[derive(Debug, Clone, Default)]
pub struct ReadRetry {
    pub strategy: SimpleRetryStrategy,
    pub backoff: Backoff,
}

/// Per-run reconciler contexts, one per entity with a factory
pub struct WireContexts {
    price_feed: Option<PriceFeedContext>,
    verifier: Option<VerifierContext>,
    executor: Option<ExecutorContext>,
    message_lib: Option<MessageLibContext>,
    read_lib: Option<ReadLibContext>,
    endpoint: Option<EndpointContext>,
}

impl WireContexts {
    pub fn new(factories: SdkFactories, read_retry: &ReadRetry) -> Self {
        Self {
            price_feed: factories.price_feed.map(|f| context(f, read_retry)),
            verifier: factories.verifier.map(|f| context(f, read_retry)),
            executor: factories.executor.map(|f| context(f, read_retry)),
            message_lib: factories.message_lib.map(|f| context(f, read_retry)),
            read_lib: factories.read_lib.map(|f| context(f, read_retry)),
            endpoint: factories.endpoint.map(|f| context(f, read_retry)),
        }
    }
}

fn context<H: ?Sized>(factory: Arc<dyn HandleFactory<H>>, read_retry: &ReadRetry) -> ConfigureContext<H> {
    ConfigureContext::new(factory).with_read_attempts(read_retry.strategy.clone(), read_retry.backoff.clone())
}

fn require<'a, C>(entity: Entity, ctx: &'a Option<C>) -> Result<&'a C, WireError> {
    ctx.as_ref().ok_or(WireError::MissingFactory { entity })
}

/// Reconcile every declared graph.
///
/// Missing factories are reported before any remote read. Results and
/// per-item failures of all entities are merged as `configure_multiple`
/// does for the sub-configurators of one entity.
pub async fn configure_all(graphs: &WireGraphs, contexts: &WireContexts) -> Result<Changes, WireError> {
    let mut configurators: Vec<LocalBoxFuture<'_, _>> = Vec::new();

    if let Some(graph) = &graphs.price_feed {
        let ctx = require(Entity::PriceFeed, &contexts.price_feed)?;
        configurators.push(configure_price_feed(graph, ctx).boxed_local());
    }
    if let Some(graph) = &graphs.verifier {
        let ctx = require(Entity::Verifier, &contexts.verifier)?;
        configurators.push(configure_verifier(graph, ctx).boxed_local());
    }
    if let Some(graph) = &graphs.executor {
        let ctx = require(Entity::Executor, &contexts.executor)?;
        configurators.push(configure_executor(graph, ctx).boxed_local());
    }
    if let Some(graph) = &graphs.message_lib {
        let ctx = require(Entity::MessageLib, &contexts.message_lib)?;
        configurators.push(configure_message_lib(graph, ctx).boxed_local());
    }
    if let Some(graph) = &graphs.read_lib {
        let ctx = require(Entity::ReadLib, &contexts.read_lib)?;
        configurators.push(configure_read_lib(graph, ctx).boxed_local());
    }
    if let Some(graph) = &graphs.endpoint {
        let ctx = require(Entity::Endpoint, &contexts.endpoint)?;
        configurators.push(configure_endpoint(graph, ctx).boxed_local());
    }

    debug!(entities = configurators.len(), "Reconciling wire config");
    let changes = configure_multiple(configurators).await?;
    info!(transactions = changes.len(), "Reconciliation finished");
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_config_yaml() {
        let yaml = r#"
verifier:
  contracts:
    - point: { eid: 1, address: "0xd1" }
      config:
        signers: { signers: ["0x2", "0x1"], quorum: 1 }
endpoint:
  contracts:
    - point: { eid: 1, address: "0xe1" }
      config: {}
    - point: { eid: 2, address: "0xe2" }
      config: {}
  connections:
    - vector:
        from: { eid: 1, address: "0xe1" }
        to: { eid: 2, address: "0xe2" }
      config:
        default_send_library: "0x51"
        default_receive_library: "0x52"
"#;
        let graphs = WireConfig::from_yaml(yaml).unwrap().graphs().unwrap();

        assert_eq!(graphs.entities(), vec![Entity::Verifier, Entity::Endpoint]);
        assert_eq!(graphs.endpoint.as_ref().unwrap().edge_count(), 1);
        assert!(graphs.price_feed.is_none());
    }

    #[test]
    fn test_invalid_graph_names_entity() {
        let yaml = r#"
executor:
  contracts: []
  connections:
    - vector:
        from: { eid: 1, address: "0x1" }
        to: { eid: 2, address: "0x2" }
      config:
        lz_receive_base_gas: 1
        multiplier_bps: 1
        floor_margin_usd: 1
        native_cap: 1
        lz_compose_base_gas: 1
"#;
        let error = WireConfig::from_yaml(yaml).unwrap().graphs().unwrap_err();
        assert!(matches!(
            error,
            WireError::Graph {
                entity: Entity::Executor,
                source: GraphError::MissingFromNode { .. }
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_factory() {
        let graphs = WireGraphs {
            verifier: Some(VerifierGraph::default()),
            ..WireGraphs::default()
        };
        let contexts = WireContexts::new(SdkFactories::default(), &ReadRetry::default());

        let error = configure_all(&graphs, &contexts).await.unwrap_err();
        assert!(matches!(error, WireError::MissingFactory { entity: Entity::Verifier }));
    }
}
