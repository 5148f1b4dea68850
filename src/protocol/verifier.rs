//! Verifier reconciler: signer set, quorum, price feed and the
//! destination table.
//!
//! Signers form a set. A differing set or quorum is fixed with a single
//! transaction carrying the whole canonical set.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::configure::{
    configure_edges, configure_multiple, configure_nodes, Changes, ConfigureContext, ConfigureResult, HandleError,
};
use crate::domain::{canonical_addresses, same_address_set, Address, Edge, Eid, Graph, Node, PendingTransaction};

/// Signers allowed to attest and how many of them must agree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerConfig {
    pub signers: Vec<Address>,
    pub quorum: u64,
}

impl SignerConfig {
    pub fn same_as(&self, other: &SignerConfig) -> bool {
        self.quorum == other.quorum && same_address_set(&self.signers, &other.signers)
    }

    pub fn canonical(&self) -> Self {
        Self {
            signers: canonical_addresses(&self.signers),
            quorum: self.quorum,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifierNodeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signers: Option<SignerConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_feed: Option<Address>,
}

/// Verifier settings for one destination chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierDstConfig {
    pub gas: u64,
    pub multiplier_bps: u16,
    pub floor_margin_usd: u128,
}

pub type VerifierGraph = Graph<VerifierNodeConfig, VerifierDstConfig>;

pub type VerifierContext = ConfigureContext<dyn VerifierSdk>;

/// Remote handle of a verifier contract
#[async_trait]
pub trait VerifierSdk: Send + Sync {
    async fn get_signers(&self) -> Result<SignerConfig, HandleError>;

    async fn set_signers(&self, config: &SignerConfig) -> anyhow::Result<PendingTransaction>;

    async fn get_price_feed(&self) -> Result<Address, HandleError>;

    async fn set_price_feed(&self, price_feed: &Address) -> anyhow::Result<PendingTransaction>;

    async fn get_dst_config(&self, eid: Eid) -> Result<VerifierDstConfig, HandleError>;

    async fn set_dst_config(&self, eid: Eid, config: &VerifierDstConfig) -> anyhow::Result<PendingTransaction>;
}

async fn signers(
    ctx: &VerifierContext,
    sdk: Arc<dyn VerifierSdk>,
    node: &Node<VerifierNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let Some(declared) = &node.config.signers else {
        return Ok(changes);
    };

    let actual = ctx.read(|| sdk.get_signers()).await?;
    if actual.as_ref().is_some_and(|actual| declared.same_as(actual)) {
        debug!(point = %node.point, "Verifier signers already set");
        return Ok(changes);
    }

    let config = declared.canonical();
    info!(point = %node.point, signers = config.signers.len(), quorum = config.quorum, "Setting verifier signers");
    let transaction = sdk.set_signers(&config).await?;
    changes.record(transaction, &node.point, "signers", &config, &actual);
    Ok(changes)
}

async fn price_feed(
    ctx: &VerifierContext,
    sdk: Arc<dyn VerifierSdk>,
    node: &Node<VerifierNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let Some(declared) = &node.config.price_feed else {
        return Ok(changes);
    };

    let actual = ctx.read(|| sdk.get_price_feed()).await?;
    if actual.as_ref() == Some(declared) {
        debug!(point = %node.point, "Verifier price feed already set");
        return Ok(changes);
    }

    info!(point = %node.point, price_feed = %declared, "Setting verifier price feed");
    let transaction = sdk.set_price_feed(declared).await?;
    changes.record(transaction, &node.point, "price_feed", declared, &actual);
    Ok(changes)
}

async fn dst_config(
    ctx: &VerifierContext,
    sdk: Arc<dyn VerifierSdk>,
    edge: &Edge<VerifierDstConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let eid = edge.vector.to.eid;
    let actual = ctx.read(|| sdk.get_dst_config(eid)).await?;

    if actual.as_ref() == Some(&edge.config) {
        debug!(vector = %edge.vector, "Verifier destination config already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, "Setting verifier destination config");
    let transaction = sdk.set_dst_config(eid, &edge.config).await?;
    changes.record(transaction, &edge.vector, "dst_config", &edge.config, &actual);
    Ok(changes)
}

pub async fn configure_verifier_signers(graph: &VerifierGraph, ctx: &VerifierContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| signers(ctx, sdk, node)).await
}

pub async fn configure_verifier_price_feeds(graph: &VerifierGraph, ctx: &VerifierContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| price_feed(ctx, sdk, node)).await
}

pub async fn configure_verifier_dst_configs(graph: &VerifierGraph, ctx: &VerifierContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| dst_config(ctx, sdk, edge)).await
}

pub async fn configure_verifier(graph: &VerifierGraph, ctx: &VerifierContext) -> ConfigureResult {
    configure_multiple(vec![
        configure_verifier_signers(graph, ctx).boxed_local(),
        configure_verifier_price_feeds(graph, ctx).boxed_local(),
        configure_verifier_dst_configs(graph, ctx).boxed_local(),
    ])
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer_config(signers: &[&str], quorum: u64) -> SignerConfig {
        SignerConfig {
            signers: signers.iter().map(|s| Address::parse(s).unwrap()).collect(),
            quorum,
        }
    }

    #[test]
    fn test_signer_sets_compare_unordered() {
        assert!(signer_config(&["0x2", "0x1"], 1).same_as(&signer_config(&["0x1", "0x2"], 1)));
        assert!(!signer_config(&["0x1", "0x2"], 2).same_as(&signer_config(&["0x1", "0x2"], 1)));
        assert!(!signer_config(&["0x1"], 1).same_as(&signer_config(&["0x1", "0x2"], 1)));
    }

    #[test]
    fn test_canonical_signers() {
        assert_eq!(
            signer_config(&["0xB", "0xa", "0xb"], 2).canonical(),
            signer_config(&["0xa", "0xb"], 2)
        );
    }
}
