//! Endpoint reconciler.
//!
//! An endpoint needs every library it routes through to be registered
//! and a default send and receive library per remote chain. Read
//! channels use a single read library for both directions.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::configure::{
    configure_edges, configure_multiple, configure_nodes, Changes, ConfigureContext, ConfigureResult, HandleError,
};
use crate::domain::{Address, Edge, Eid, Graph, Node, PendingTransaction};

/// Default read library of one read channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadChannelConfig {
    pub channel_id: Eid,
    pub default_read_library: Address,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointNodeConfig {
    #[serde(default)]
    pub read_channels: Vec<ReadChannelConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointEdgeConfig {
    pub default_send_library: Address,
    pub default_receive_library: Address,

    /// Seconds the previous receive library stays valid after a switch
    #[serde(default)]
    pub default_receive_library_grace_period: u64,
}

pub type EndpointGraph = Graph<EndpointNodeConfig, EndpointEdgeConfig>;

pub type EndpointContext = ConfigureContext<dyn EndpointSdk>;

/// Remote handle of an endpoint contract
#[async_trait]
pub trait EndpointSdk: Send + Sync {
    async fn is_registered_library(&self, library: &Address) -> Result<bool, HandleError>;

    async fn register_library(&self, library: &Address) -> anyhow::Result<PendingTransaction>;

    async fn get_default_send_library(&self, eid: Eid) -> Result<Address, HandleError>;

    async fn set_default_send_library(&self, eid: Eid, library: &Address) -> anyhow::Result<PendingTransaction>;

    async fn get_default_receive_library(&self, eid: Eid) -> Result<Address, HandleError>;

    async fn set_default_receive_library(
        &self,
        eid: Eid,
        library: &Address,
        grace_period: u64,
    ) -> anyhow::Result<PendingTransaction>;
}

/// Every library a node routes through, in order of first use
fn libraries_of(graph: &EndpointGraph, node: &Node<EndpointNodeConfig>) -> Vec<Address> {
    let mut libraries: Vec<Address> = Vec::new();
    let edge_libraries = graph
        .get_edges_from(&node.point)
        .into_iter()
        .flat_map(|edge| [&edge.config.default_receive_library, &edge.config.default_send_library]);
    let read_libraries = node.config.read_channels.iter().map(|c| &c.default_read_library);

    for library in edge_libraries.chain(read_libraries) {
        if !libraries.contains(library) {
            libraries.push(library.clone());
        }
    }
    libraries
}

async fn register_libraries(
    ctx: &EndpointContext,
    sdk: Arc<dyn EndpointSdk>,
    graph: &EndpointGraph,
    node: &Node<EndpointNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();

    for library in libraries_of(graph, node) {
        let registered = ctx.read(|| sdk.is_registered_library(&library)).await?;
        if registered == Some(true) {
            debug!(point = %node.point, %library, "Library already registered");
            continue;
        }

        info!(point = %node.point, %library, "Registering library");
        let transaction = sdk.register_library(&library).await?;
        changes.record(transaction, &node.point, "registered_library", &library, &registered);
    }

    Ok(changes)
}

async fn default_send_library(
    ctx: &EndpointContext,
    sdk: Arc<dyn EndpointSdk>,
    edge: &Edge<EndpointEdgeConfig>,
) -> Result<Changes, HandleError> {
    let eid = edge.vector.to.eid;
    let declared = &edge.config.default_send_library;
    let actual = ctx.read(|| sdk.get_default_send_library(eid)).await?;

    let mut changes = Changes::new();
    if actual.as_ref() == Some(declared) {
        debug!(vector = %edge.vector, library = %declared, "Default send library already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, library = %declared, "Setting default send library");
    let transaction = sdk.set_default_send_library(eid, declared).await?;
    changes.record(transaction, &edge.vector, "default_send_library", declared, &actual);
    Ok(changes)
}

async fn default_receive_library(
    ctx: &EndpointContext,
    sdk: Arc<dyn EndpointSdk>,
    edge: &Edge<EndpointEdgeConfig>,
) -> Result<Changes, HandleError> {
    let eid = edge.vector.to.eid;
    let declared = &edge.config.default_receive_library;
    let actual = ctx.read(|| sdk.get_default_receive_library(eid)).await?;

    let mut changes = Changes::new();
    if actual.as_ref() == Some(declared) {
        debug!(vector = %edge.vector, library = %declared, "Default receive library already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, library = %declared, "Setting default receive library");
    let transaction = sdk
        .set_default_receive_library(eid, declared, edge.config.default_receive_library_grace_period)
        .await?;
    changes.record(transaction, &edge.vector, "default_receive_library", declared, &actual);
    Ok(changes)
}

async fn default_read_libraries(
    ctx: &EndpointContext,
    sdk: Arc<dyn EndpointSdk>,
    node: &Node<EndpointNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();

    for channel in &node.config.read_channels {
        let eid = channel.channel_id;
        let declared = &channel.default_read_library;
        let scope = format!("{} channel {}", node.point, eid);

        let send = ctx.read(|| sdk.get_default_send_library(eid)).await?;
        if send.as_ref() != Some(declared) {
            info!(point = %node.point, channel = %eid, library = %declared, "Setting default read send library");
            let transaction = sdk.set_default_send_library(eid, declared).await?;
            changes.record(transaction, &scope, "default_send_library", declared, &send);
        }

        let receive = ctx.read(|| sdk.get_default_receive_library(eid)).await?;
        if receive.as_ref() != Some(declared) {
            info!(point = %node.point, channel = %eid, library = %declared, "Setting default read receive library");
            let transaction = sdk.set_default_receive_library(eid, declared, 0).await?;
            changes.record(transaction, &scope, "default_receive_library", declared, &receive);
        }
    }

    Ok(changes)
}

/// Register every library used by a node's edges and read channels
pub async fn configure_endpoint_register_libraries(graph: &EndpointGraph, ctx: &EndpointContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| register_libraries(ctx, sdk, graph, node)).await
}

pub async fn configure_endpoint_default_send_libraries(graph: &EndpointGraph, ctx: &EndpointContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| default_send_library(ctx, sdk, edge)).await
}

pub async fn configure_endpoint_default_receive_libraries(
    graph: &EndpointGraph,
    ctx: &EndpointContext,
) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| default_receive_library(ctx, sdk, edge)).await
}

pub async fn configure_endpoint_default_read_libraries(graph: &EndpointGraph, ctx: &EndpointContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| default_read_libraries(ctx, sdk, node)).await
}

/// Full endpoint reconciliation; registrations come before the defaults that need them
pub async fn configure_endpoint(graph: &EndpointGraph, ctx: &EndpointContext) -> ConfigureResult {
    configure_multiple(vec![
        configure_endpoint_register_libraries(graph, ctx).boxed_local(),
        configure_endpoint_default_receive_libraries(graph, ctx).boxed_local(),
        configure_endpoint_default_send_libraries(graph, ctx).boxed_local(),
        configure_endpoint_default_read_libraries(graph, ctx).boxed_local(),
    ])
    .await
}
