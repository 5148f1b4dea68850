//! Read library reconciler: the default read ULN config of every read
//! channel a node declares.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::message_lib::{VerifierConfig, VerifierUserConfig};
use crate::core::configure::{configure_nodes, Changes, ConfigureContext, ConfigureResult, HandleError};
use crate::domain::{Address, Eid, Graph, Node, PendingTransaction};

/// Read ULN config as stored on chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadUlnConfig {
    pub executor: Address,

    #[serde(flatten)]
    pub verifiers: VerifierConfig,
}

/// Declared read ULN config of one channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadChannelUlnConfig {
    pub channel_id: Eid,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<Address>,

    #[serde(flatten)]
    pub verifiers: VerifierUserConfig,
}

impl ReadChannelUlnConfig {
    pub fn matches(&self, actual: &ReadUlnConfig) -> bool {
        self.executor.as_ref().map_or(true, |e| e == &actual.executor) && self.verifiers.matches(&actual.verifiers)
    }

    pub fn resolve(&self, actual: Option<&ReadUlnConfig>) -> ReadUlnConfig {
        ReadUlnConfig {
            executor: self
                .executor
                .clone()
                .or_else(|| actual.map(|a| a.executor.clone()))
                .unwrap_or_else(Address::zero),
            verifiers: self.verifiers.resolve(actual.map(|a| &a.verifiers)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadLibNodeConfig {
    #[serde(default)]
    pub channels: Vec<ReadChannelUlnConfig>,
}

/// Read libraries carry no edge-scoped settings
pub type ReadLibGraph = Graph<ReadLibNodeConfig, ()>;

pub type ReadLibContext = ConfigureContext<dyn ReadLibSdk>;

/// Remote handle of a read library contract
#[async_trait]
pub trait ReadLibSdk: Send + Sync {
    async fn get_default_read_uln_config(&self, channel_id: Eid) -> Result<ReadUlnConfig, HandleError>;

    async fn set_default_read_uln_config(
        &self,
        channel_id: Eid,
        config: &ReadUlnConfig,
    ) -> anyhow::Result<PendingTransaction>;
}

async fn read_uln_configs(
    ctx: &ReadLibContext,
    sdk: Arc<dyn ReadLibSdk>,
    node: &Node<ReadLibNodeConfig>,
) -> Result<Changes, HandleError> {
    let mut changes = Changes::new();

    for channel in &node.config.channels {
        let channel_id = channel.channel_id;
        let actual = ctx.read(|| sdk.get_default_read_uln_config(channel_id)).await?;
        if actual.as_ref().is_some_and(|actual| channel.matches(actual)) {
            debug!(point = %node.point, channel = %channel_id, "Default read ULN config already set");
            continue;
        }

        let config = channel.resolve(actual.as_ref());
        info!(point = %node.point, channel = %channel_id, "Setting default read ULN config");
        let transaction = sdk.set_default_read_uln_config(channel_id, &config).await?;
        changes.record(
            transaction,
            format!("{} channel {}", node.point, channel_id),
            "default_read_uln_config",
            &config,
            &actual,
        );
    }

    Ok(changes)
}

pub async fn configure_read_lib(graph: &ReadLibGraph, ctx: &ReadLibContext) -> ConfigureResult {
    configure_nodes(graph, ctx, |sdk, node| read_uln_configs(ctx, sdk, node)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: &str) -> Address {
        Address::parse(value).unwrap()
    }

    #[test]
    fn test_channel_config_yaml() {
        let yaml = r#"
channels:
  - channel_id: 4294967295
    executor: "0xe"
    required_verifiers: ["0x2", "0x1"]
"#;
        let config: ReadLibNodeConfig = serde_yaml::from_str(yaml).unwrap();
        let channel = &config.channels[0];

        assert_eq!(channel.channel_id, Eid(4294967295));
        assert_eq!(channel.executor, Some(addr("0xe")));
        assert_eq!(channel.verifiers.required_verifiers.len(), 2);
    }

    #[test]
    fn test_missing_executor_keeps_actual() {
        let declared = ReadChannelUlnConfig {
            channel_id: Eid(1),
            executor: None,
            verifiers: VerifierUserConfig {
                required_verifiers: vec![addr("0x2"), addr("0x1")],
                optional_verifiers: None,
                optional_threshold: None,
            },
        };
        let actual = ReadUlnConfig {
            executor: addr("0xe"),
            verifiers: VerifierConfig {
                required_verifiers: vec![addr("0x1"), addr("0x2")],
                optional_verifiers: vec![],
                optional_threshold: 0,
            },
        };

        assert!(declared.matches(&actual));
        assert_eq!(declared.resolve(None).executor, Address::zero());
        assert_eq!(declared.resolve(Some(&actual)), actual);
    }
}
