//! Remote handles over a snapshot: one `SnapshotContract` per point,
//! implementing every entity handle trait.

use anyhow::anyhow;
use async_trait::async_trait;

use super::state::{ContractState, Operation};
use super::Snapshot;
use crate::core::configure::HandleError;
use crate::domain::{Address, Eid, PendingTransaction, Point};
use crate::protocol::endpoint::EndpointSdk;
use crate::protocol::executor::{ExecutorDstConfig, ExecutorSdk};
use crate::protocol::message_lib::{ExecutorConfig, MessageLibSdk, UlnConfig, UlnDirection};
use crate::protocol::price_feed::{Price, PriceFeedSdk};
use crate::protocol::read_lib::{ReadLibSdk, ReadUlnConfig};
use crate::protocol::verifier::{SignerConfig, VerifierDstConfig, VerifierSdk};

/// Handle of one contract in a snapshot
pub struct SnapshotContract {
    snapshot: Snapshot,
    point: Point,
}

impl SnapshotContract {
    pub(super) fn new(snapshot: Snapshot, point: Point) -> Self {
        Self { snapshot, point }
    }

    pub fn point(&self) -> &Point {
        &self.point
    }

    /// Read a value; `None` from `read` means it was never set
    async fn read<T>(&self, read: impl FnOnce(&ContractState) -> Option<T>) -> Result<T, HandleError> {
        self.snapshot
            .with_state(|state| -> Result<T, HandleError> {
                let contract = state
                    .contract(&self.point)
                    .ok_or_else(|| anyhow!("No contract at {}", self.point))?;
                read(contract).ok_or(HandleError::NotSet)
            })
            .await
    }

    fn transaction(&self, operation: Operation, description: String) -> anyhow::Result<PendingTransaction> {
        Ok(PendingTransaction::new(self.point.clone(), operation.encode()?, description))
    }
}

#[async_trait]
impl EndpointSdk for SnapshotContract {
    async fn is_registered_library(&self, library: &Address) -> Result<bool, HandleError> {
        self.read(|c| Some(c.endpoint.as_ref()?.registered_libraries.contains(library)))
            .await
    }

    async fn register_library(&self, library: &Address) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::RegisterLibrary {
                library: library.clone(),
            },
            format!("Register library {}", library),
        )
    }

    async fn get_default_send_library(&self, eid: Eid) -> Result<Address, HandleError> {
        self.read(|c| c.endpoint.as_ref()?.default_send_libraries.get(&eid).cloned())
            .await
    }

    async fn set_default_send_library(&self, eid: Eid, library: &Address) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultSendLibrary {
                eid,
                library: library.clone(),
            },
            format!("Set default send library for {} to {}", eid, library),
        )
    }

    async fn get_default_receive_library(&self, eid: Eid) -> Result<Address, HandleError> {
        self.read(|c| {
            c.endpoint
                .as_ref()?
                .default_receive_libraries
                .get(&eid)
                .map(|r| r.library.clone())
        })
        .await
    }

    async fn set_default_receive_library(
        &self,
        eid: Eid,
        library: &Address,
        grace_period: u64,
    ) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultReceiveLibrary {
                eid,
                library: library.clone(),
                grace_period,
            },
            format!("Set default receive library for {} to {} (grace period {})", eid, library, grace_period),
        )
    }
}

fn direction_name(direction: UlnDirection) -> &'static str {
    match direction {
        UlnDirection::Send => "send",
        UlnDirection::Receive => "receive",
    }
}

#[async_trait]
impl MessageLibSdk for SnapshotContract {
    async fn get_default_uln_config(&self, eid: Eid, direction: UlnDirection) -> Result<UlnConfig, HandleError> {
        self.read(|c| c.message_lib.as_ref()?.uln_configs(direction).get(&eid).cloned())
            .await
    }

    async fn set_default_uln_config(
        &self,
        eid: Eid,
        direction: UlnDirection,
        config: &UlnConfig,
    ) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultUlnConfig {
                eid,
                direction,
                config: config.clone(),
            },
            format!("Set default {} ULN config for {}", direction_name(direction), eid),
        )
    }

    async fn get_default_executor_config(&self, eid: Eid) -> Result<ExecutorConfig, HandleError> {
        self.read(|c| c.message_lib.as_ref()?.executor_configs.get(&eid).cloned())
            .await
    }

    async fn set_default_executor_config(
        &self,
        eid: Eid,
        config: &ExecutorConfig,
    ) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultExecutorConfig {
                eid,
                config: config.clone(),
            },
            format!("Set default executor config for {} to {}", eid, config.executor),
        )
    }
}

#[async_trait]
impl ExecutorSdk for SnapshotContract {
    async fn get_price_feed(&self) -> Result<Address, HandleError> {
        self.read(|c| c.executor.as_ref()?.price_feed.clone()).await
    }

    async fn set_price_feed(&self, price_feed: &Address) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetExecutorPriceFeed {
                price_feed: price_feed.clone(),
            },
            format!("Set executor price feed to {}", price_feed),
        )
    }

    async fn get_default_multiplier_bps(&self) -> Result<u16, HandleError> {
        self.read(|c| c.executor.as_ref()?.default_multiplier_bps).await
    }

    async fn set_default_multiplier_bps(&self, multiplier_bps: u16) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultMultiplierBps { multiplier_bps },
            format!("Set executor default multiplier to {} bps", multiplier_bps),
        )
    }

    async fn get_dst_config(&self, eid: Eid) -> Result<ExecutorDstConfig, HandleError> {
        self.read(|c| c.executor.as_ref()?.dst_configs.get(&eid).cloned()).await
    }

    async fn set_dst_config(&self, eid: Eid, config: &ExecutorDstConfig) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetExecutorDstConfig {
                eid,
                config: config.clone(),
            },
            format!("Set executor destination config for {}", eid),
        )
    }
}

#[async_trait]
impl VerifierSdk for SnapshotContract {
    async fn get_signers(&self) -> Result<SignerConfig, HandleError> {
        self.read(|c| c.verifier.as_ref()?.signers.clone()).await
    }

    async fn set_signers(&self, config: &SignerConfig) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetSigners { config: config.clone() },
            format!(
                "Set verifier signers to {} of {}",
                config.quorum,
                config.signers.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
            ),
        )
    }

    async fn get_price_feed(&self) -> Result<Address, HandleError> {
        self.read(|c| c.verifier.as_ref()?.price_feed.clone()).await
    }

    async fn set_price_feed(&self, price_feed: &Address) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetVerifierPriceFeed {
                price_feed: price_feed.clone(),
            },
            format!("Set verifier price feed to {}", price_feed),
        )
    }

    async fn get_dst_config(&self, eid: Eid) -> Result<VerifierDstConfig, HandleError> {
        self.read(|c| c.verifier.as_ref()?.dst_configs.get(&eid).cloned()).await
    }

    async fn set_dst_config(&self, eid: Eid, config: &VerifierDstConfig) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetVerifierDstConfig {
                eid,
                config: config.clone(),
            },
            format!("Set verifier destination config for {}", eid),
        )
    }
}

#[async_trait]
impl PriceFeedSdk for SnapshotContract {
    async fn get_price_updaters(&self) -> Result<Vec<Address>, HandleError> {
        self.read(|c| Some(c.price_feed.as_ref()?.price_updaters.clone())).await
    }

    async fn set_price_updater(&self, updater: &Address, active: bool) -> anyhow::Result<PendingTransaction> {
        let action = if active { "Add" } else { "Remove" };
        self.transaction(
            Operation::SetPriceUpdater {
                updater: updater.clone(),
                active,
            },
            format!("{} price updater {}", action, updater),
        )
    }

    async fn get_native_token_price_usd(&self) -> Result<u128, HandleError> {
        self.read(|c| c.price_feed.as_ref()?.native_token_price_usd).await
    }

    async fn set_native_token_price_usd(&self, price: u128) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetNativeTokenPrice { price },
            format!("Set native token price to {} USD", price),
        )
    }

    async fn get_price(&self, eid: Eid) -> Result<Price, HandleError> {
        self.read(|c| c.price_feed.as_ref()?.prices.get(&eid).cloned()).await
    }

    async fn set_price(&self, eid: Eid, price: &Price) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetPrice {
                eid,
                price: price.clone(),
            },
            format!("Set price for {}", eid),
        )
    }
}

#[async_trait]
impl ReadLibSdk for SnapshotContract {
    async fn get_default_read_uln_config(&self, channel_id: Eid) -> Result<ReadUlnConfig, HandleError> {
        self.read(|c| c.read_lib.as_ref()?.read_uln_configs.get(&channel_id).cloned())
            .await
    }

    async fn set_default_read_uln_config(
        &self,
        channel_id: Eid,
        config: &ReadUlnConfig,
    ) -> anyhow::Result<PendingTransaction> {
        self.transaction(
            Operation::SetDefaultReadUlnConfig {
                channel_id,
                config: config.clone(),
            },
            format!("Set default read ULN config for channel {}", channel_id),
        )
    }
}
