//! Price feed reconciler: price updaters, native token price and the
//! per-destination price table.
//!
//! Updaters are toggled one at a time, so the output holds one
//! transaction per updater that has to be added or removed.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::configure::{
    configure_edges, configure_multiple, configure_nodes, Changes, ConfigureContext, ConfigureResult, HandleError,
};
use crate::domain::{canonical_addresses, Address, Edge, Eid, Graph, Node, PendingTransaction};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedNodeConfig {
    /// The complete set of accounts allowed to push prices
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_updaters: Option<Vec<Address>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_token_price_usd: Option<u128>,
}

/// Price of a destination chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub price_ratio: u128,
    pub gas_price_in_unit: u64,
    pub gas_per_byte: u32,
}

pub type PriceFeedGraph = Graph<PriceFeedNodeConfig, Price>;

pub type PriceFeedContext = ConfigureContext<dyn PriceFeedSdk>;

/// Remote handle of a price feed contract
#[async_trait]
pub trait PriceFeedSdk: Send + Sync {
    async fn get_price_updaters(&self) -> Result<Vec<Address>, HandleError>;

    async fn set_price_updater(&self, updater: &Address, active: bool) -> anyhow::Result<PendingTransaction>;

    async fn get_native_token_price_usd(&self) -> Result<u128, HandleError>;

    async fn set_native_token_price_usd(&self, price: u128) -> anyhow::Result<PendingTransaction>;

    async fn get_price(&self, eid: Eid) -> Result<Price, HandleError>;

    async fn set_price(&self, eid: Eid, price: &Price) -> anyhow::Result<PendingTransaction>;
}

async fn price_updaters(
    ctx: &PriceFeedContext,
    sdk: Arc<dyn PriceFeedSdk>,
    node: &Node<PriceFeedNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let Some(declared) = &node.config.price_updaters else {
        return Ok(changes);
    };

    let declared = canonical_addresses(declared);
    let actual = canonical_addresses(&ctx.read(|| sdk.get_price_updaters()).await?.unwrap_or_default());

    for updater in declared.iter().filter(|u| !actual.contains(u)) {
        info!(point = %node.point, %updater, "Adding price updater");
        let transaction = sdk.set_price_updater(updater, true).await?;
        changes.record(transaction, &node.point, "price_updater", updater, &None::<Address>);
    }

    for updater in actual.iter().filter(|u| !declared.contains(u)) {
        info!(point = %node.point, %updater, "Removing price updater");
        let transaction = sdk.set_price_updater(updater, false).await?;
        changes.record(transaction, &node.point, "price_updater", &None::<Address>, updater);
    }

    if changes.is_empty() {
        debug!(point = %node.point, "Price updaters already set");
    }
    Ok(changes)
}

async fn native_token_price(
    ctx: &PriceFeedContext,
    sdk: Arc<dyn PriceFeedSdk>,
    node: &Node<PriceFeedNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let Some(declared) = node.config.native_token_price_usd else {
        return Ok(changes);
    };

    let actual = ctx.read(|| sdk.get_native_token_price_usd()).await?;
    if actual == Some(declared) {
        debug!(point = %node.point, "Native token price already set");
        return Ok(changes);
    }

    info!(point = %node.point, price = %declared, "Setting native token price");
    let transaction = sdk.set_native_token_price_usd(declared).await?;
    changes.record(transaction, &node.point, "native_token_price_usd", &declared, &actual);
    Ok(changes)
}

async fn price(ctx: &PriceFeedContext, sdk: Arc<dyn PriceFeedSdk>, edge: &Edge<Price>) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let eid = edge.vector.to.eid;
    let actual = ctx.read(|| sdk.get_price(eid)).await?;

    if actual.as_ref() == Some(&edge.config) {
        debug!(vector = %edge.vector, "Price already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, "Setting price");
    let transaction = sdk.set_price(eid, &edge.config).await?;
    changes.record(transaction, &edge.vector, "price", &edge.config, &actual);
    Ok(changes)
}

pub async fn configure_price_feed_updaters(graph: &PriceFeedGraph, ctx: &PriceFeedContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| price_updaters(ctx, sdk, node)).await
}

pub async fn configure_price_feed_native_token_prices(graph: &PriceFeedGraph, ctx: &PriceFeedContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| native_token_price(ctx, sdk, node)).await
}

pub async fn configure_price_feed_prices(graph: &PriceFeedGraph, ctx: &PriceFeedContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| price(ctx, sdk, edge)).await
}

pub async fn configure_price_feed(graph: &PriceFeedGraph, ctx: &PriceFeedContext) -> ConfigureResult {
    configure_multiple(vec![
        configure_price_feed_updaters(graph, ctx).boxed_local(),
        configure_price_feed_native_token_prices(graph, ctx).boxed_local(),
        configure_price_feed_prices(graph, ctx).boxed_local(),
    ])
    .await
}
