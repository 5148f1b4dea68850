//! Message library (ULN) reconciler.
//!
//! Per pathway the library holds a default send ULN config, a default
//! receive ULN config and a default executor config. Verifier lists are
//! sets: the order they are declared in never causes a transaction, but
//! every emitted config carries them in canonical order.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::configure::{configure_edges, configure_multiple, Changes, ConfigureContext, ConfigureResult, HandleError};
use crate::domain::{canonical_addresses, same_address_set, Address, Edge, Eid, Graph, PendingTransaction};

/// Verifier requirements as stored on chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifierConfig {
    #[serde(default)]
    pub required_verifiers: Vec<Address>,

    #[serde(default)]
    pub optional_verifiers: Vec<Address>,

    #[serde(default)]
    pub optional_threshold: u8,
}

impl VerifierConfig {
    /// Same config with both verifier lists in canonical order
    pub fn canonical(&self) -> Self {
        Self {
            required_verifiers: canonical_addresses(&self.required_verifiers),
            optional_verifiers: canonical_addresses(&self.optional_verifiers),
            optional_threshold: self.optional_threshold,
        }
    }
}

/// Declared verifier requirements; unset fields keep their on-chain value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifierUserConfig {
    pub required_verifiers: Vec<Address>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_verifiers: Option<Vec<Address>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optional_threshold: Option<u8>,
}

impl VerifierUserConfig {
    /// Whether the on-chain config already satisfies this declaration
    pub fn matches(&self, actual: &VerifierConfig) -> bool {
        same_address_set(&self.required_verifiers, &actual.required_verifiers)
            && self
                .optional_verifiers
                .as_ref()
                .map_or(true, |optional| same_address_set(optional, &actual.optional_verifiers))
            && self
                .optional_threshold
                .map_or(true, |threshold| threshold == actual.optional_threshold)
    }

    /// The config to write: declared fields over the on-chain ones, canonical order
    pub fn resolve(&self, actual: Option<&VerifierConfig>) -> VerifierConfig {
        let fallback = actual.cloned().unwrap_or_default();
        VerifierConfig {
            required_verifiers: self.required_verifiers.clone(),
            optional_verifiers: self
                .optional_verifiers
                .clone()
                .unwrap_or(fallback.optional_verifiers),
            optional_threshold: self.optional_threshold.unwrap_or(fallback.optional_threshold),
        }
        .canonical()
    }
}

/// ULN config as stored on chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UlnConfig {
    /// Block confirmations required before verification
    #[serde(default)]
    pub confirmations: u64,

    #[serde(flatten)]
    pub verifiers: VerifierConfig,
}

/// Declared ULN config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UlnUserConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,

    #[serde(flatten)]
    pub verifiers: VerifierUserConfig,
}

impl UlnUserConfig {
    pub fn matches(&self, actual: &UlnConfig) -> bool {
        self.confirmations.map_or(true, |c| c == actual.confirmations) && self.verifiers.matches(&actual.verifiers)
    }

    pub fn resolve(&self, actual: Option<&UlnConfig>) -> UlnConfig {
        UlnConfig {
            confirmations: self
                .confirmations
                .or(actual.map(|a| a.confirmations))
                .unwrap_or_default(),
            verifiers: self.verifiers.resolve(actual.map(|a| &a.verifiers)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub executor: Address,
    pub max_message_size: u32,
}

/// Direction of a ULN config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UlnDirection {
    Send,
    Receive,
}

impl UlnDirection {
    fn field(self) -> &'static str {
        match self {
            Self::Send => "default_send_uln_config",
            Self::Receive => "default_receive_uln_config",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLibEdgeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_uln: Option<UlnUserConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_uln: Option<UlnUserConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorConfig>,
}

/// Message libraries carry no node-scoped settings
pub type MessageLibGraph = Graph<(), MessageLibEdgeConfig>;

pub type MessageLibContext = ConfigureContext<dyn MessageLibSdk>;

/// Remote handle of a message library contract
#[async_trait]
pub trait MessageLibSdk: Send + Sync {
    async fn get_default_uln_config(&self, eid: Eid, direction: UlnDirection) -> Result<UlnConfig, HandleError>;

    async fn set_default_uln_config(
        &self,
        eid: Eid,
        direction: UlnDirection,
        config: &UlnConfig,
    ) -> anyhow::Result<PendingTransaction>;

    async fn get_default_executor_config(&self, eid: Eid) -> Result<ExecutorConfig, HandleError>;

    async fn set_default_executor_config(&self, eid: Eid, config: &ExecutorConfig)
        -> anyhow::Result<PendingTransaction>;
}

async fn default_uln_config(
    ctx: &MessageLibContext,
    sdk: Arc<dyn MessageLibSdk>,
    edge: &Edge<MessageLibEdgeConfig>,
    direction: UlnDirection,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let declared = match direction {
        UlnDirection::Send => &edge.config.send_uln,
        UlnDirection::Receive => &edge.config.receive_uln,
    };
    let Some(declared) = declared else {
        return Ok(changes);
    };

    let eid = edge.vector.to.eid;
    let actual = ctx.read(|| sdk.get_default_uln_config(eid, direction)).await?;
    if actual.as_ref().is_some_and(|actual| declared.matches(actual)) {
        debug!(vector = %edge.vector, ?direction, "Default ULN config already set");
        return Ok(changes);
    }

    let config = declared.resolve(actual.as_ref());
    info!(vector = %edge.vector, ?direction, "Setting default ULN config");
    let transaction = sdk.set_default_uln_config(eid, direction, &config).await?;
    changes.record(transaction, &edge.vector, direction.field(), &config, &actual);
    Ok(changes)
}

async fn default_executor_config(
    ctx: &MessageLibContext,
    sdk: Arc<dyn MessageLibSdk>,
    edge: &Edge<MessageLibEdgeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();
    let Some(declared) = &edge.config.executor else {
        return Ok(changes);
    };

    let eid = edge.vector.to.eid;
    let actual = ctx.read(|| sdk.get_default_executor_config(eid)).await?;
    if actual.as_ref() == Some(declared) {
        debug!(vector = %edge.vector, "Default executor config already set");
        return Ok(changes);
    }

    info!(vector = %edge.vector, executor = %declared.executor, "Setting default executor config");
    let transaction = sdk.set_default_executor_config(eid, declared).await?;
    changes.record(transaction, &edge.vector, "default_executor_config", declared, &actual);
    Ok(changes)
}

pub async fn configure_message_lib_send_uln_configs(graph: &MessageLibGraph, ctx: &MessageLibContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| default_uln_config(ctx, sdk, edge, UlnDirection::Send)).await
}

pub async fn configure_message_lib_receive_uln_configs(
    graph: &MessageLibGraph,
    ctx: &MessageLibContext,
) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| default_uln_config(ctx, sdk, edge, UlnDirection::Receive)).await
}

pub async fn configure_message_lib_executor_configs(graph: &MessageLibGraph, ctx: &MessageLibContext) -> ConfigureResult {
    configure_edges(graph, ctx, |sdk, edge| default_executor_config(ctx, sdk, edge)).await
}

pub async fn configure_message_lib(graph: &MessageLibGraph, ctx: &MessageLibContext) -> ConfigureResult {
    configure_multiple(vec![
        configure_message_lib_send_uln_configs(graph, ctx).boxed_local(),
        configure_message_lib_receive_uln_configs(graph, ctx).boxed_local(),
        configure_message_lib_executor_configs(graph, ctx).boxed_local(),
    ])
    .await
}
