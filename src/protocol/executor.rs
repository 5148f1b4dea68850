//! Executor reconciler: price feed, default multiplier and the
//! destination table.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::configure::{
    configure_edges, configure_multiple, configure_nodes, Changes, ConfigureContext, ConfigureResult, HandleError,
};
use crate::domain::{Address, Edge, Eid, Graph, Node, PendingTransaction};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_feed: Option<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_multiplier_bps: Option<u16>,
}

/// Executor settings for one destination chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDstConfig {
    pub lz_receive_base_gas: u64,
    pub multiplier_bps: u16,
    pub floor_margin_usd: u128,
    pub native_cap: u128,
    pub lz_compose_base_gas: u64,
}

pub type ExecutorGraph = Graph<ExecutorNodeConfig, ExecutorDstConfig>;

pub type ExecutorContext = ConfigureContext<dyn ExecutorSdk>;

/// Remote handle of an executor contract
#[async_trait]
pub trait ExecutorSdk: Send + Sync {
    async fn get_price_feed(&self) -> Result<Address, HandleError>;

    async fn set_price_feed(&self, price_feed: &Address) -> anyhow::Result<PendingTransaction>;

    async fn get_default_multiplier_bps(&self) -> Result<u16, HandleError>;

    async fn set_default_multiplier_bps(&self, multiplier_bps: u16) -> anyhow::Result<PendingTransaction>;

    async fn get_dst_config(&self, eid: Eid) -> Result<ExecutorDstConfig, HandleError>;

    async fn set_dst_config(&self, eid: Eid, config: &ExecutorDstConfig) -> anyhow::Result<PendingTransaction>;
}

async fn node_settings(
    ctx: &ExecutorContext,
    sdk: Arc<dyn ExecutorSdk>,
    node: &Node<ExecutorNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();

    if let Some(declared) = &node.config.price_feed {
        let actual = ctx.read(|| sdk.get_price_feed()).await?;
        if actual.as_ref() != Some(declared) {
            info!(point = %node.point, price_feed = %declared, "Setting executor price feed");
            let transaction = sdk.set_price_feed(declared).await?;
            changes.record(transaction, &node.point, "price_feed", declared, &actual);
        }
    }

    if let Some(declared) = node.config.default_multiplier_bps {
        let actual = ctx.read(|| sdk.get_default_multiplier_bps()).await?;
        if actual != Some(declared) {
            info!(point = %node.point, multiplier_bps = declared, "Setting executor default multiplier");
            let transaction = sdk.set_default_multiplier_bps(declared).await?;
            changes.record(transaction, &node.point, "default_multiplier_bps", &declared, &actual);
        }
    }

    Ok(changes)
}

async fn dst_config(
    ctx: &ExecutorContext,
    sdk: Arc<dyn ExecutorSdk>,
    edge: &Edge<ExecutorDstConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let eid = edge.vector.to.eid;
    let actual = ctx.read(|| sdk.get_dst_config(eid)).await?;

    if actual.as_ref() == Some(&edge.config) {
        debug!(vector = %edge.vector, "Executor destination config already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, "Setting executor destination config");
    let transaction = sdk.set_dst_config(eid, &edge.config).await?;
    changes.record(transaction, &edge.vector, "dst_config", &edge.config, &actual);
    Ok(changes)
}

pub async fn configure_executor_node_settings(graph: &ExecutorGraph, ctx: &ExecutorContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| node_settings(ctx, sdk, node)).await
}

pub async fn configure_executor_dst_configs(graph: &ExecutorGraph, ctx: &ExecutorContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| dst_config(ctx, sdk, edge)).await
}

pub async fn configure_executor(graph: &ExecutorGraph, ctx: &ExecutorContext) -> ConfigureResult {
    configure_multiple(vec![
        configure_executor_node_settings(graph, ctx).boxed_local(),
        configure_executor_dst_configs(graph, ctx).boxed_local(),
    ])
    .await
}
