//! Chain state held by a snapshot and the operations that change it.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{Address, Eid, Point};
use crate::protocol::executor::ExecutorDstConfig;
use crate::protocol::message_lib::{ExecutorConfig, UlnConfig, UlnDirection};
use crate::protocol::price_feed::Price;
use crate::protocol::read_lib::ReadUlnConfig;
use crate::protocol::verifier::{SignerConfig, VerifierDstConfig};

/// State of every chain known to a snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotState {
    #[serde(default)]
    pub chains: BTreeMap<Eid, ChainState>,
}

impl SnapshotState {
    pub fn contract(&self, point: &Point) -> Option<&ContractState> {
        self.chains.get(&point.eid)?.contracts.get(&point.address)
    }

    pub fn contract_mut(&mut self, point: &Point) -> Option<&mut ContractState> {
        self.chains.get_mut(&point.eid)?.contracts.get_mut(&point.address)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainState {
    /// Next nonce of the deployer account
    #[serde(default)]
    pub nonce: u64,

    /// Latest block
    #[serde(default)]
    pub block: u64,

    #[serde(default)]
    pub contracts: BTreeMap<Address, ContractState>,
}

/// A deployed contract. Each section present makes the contract usable
/// as that entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContractState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<EndpointState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_lib: Option<MessageLibState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor: Option<ExecutorState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<VerifierState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_feed: Option<PriceFeedState>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_lib: Option<ReadLibState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveLibrary {
    pub library: Address,

    #[serde(default)]
    pub grace_period: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointState {
    #[serde(default)]
    pub registered_libraries: Vec<Address>,

    #[serde(default)]
    pub default_send_libraries: BTreeMap<Eid, Address>,

    #[serde(default)]
    pub default_receive_libraries: BTreeMap<Eid, ReceiveLibrary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageLibState {
    #[serde(default)]
    pub send_uln_configs: BTreeMap<Eid, UlnConfig>,

    #[serde(default)]
    pub receive_uln_configs: BTreeMap<Eid, UlnConfig>,

    #[serde(default)]
    pub executor_configs: BTreeMap<Eid, ExecutorConfig>,
}

impl MessageLibState {
    pub fn uln_configs(&self, direction: UlnDirection) -> &BTreeMap<Eid, UlnConfig> {
        match direction {
            UlnDirection::Send => &self.send_uln_configs,
            UlnDirection::Receive => &self.receive_uln_configs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorState {
    #[serde(default)]
    pub price_feed: Option<Address>,

    #[serde(default)]
    pub default_multiplier_bps: Option<u16>,

    #[serde(default)]
    pub dst_configs: BTreeMap<Eid, ExecutorDstConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerifierState {
    #[serde(default)]
    pub signers: Option<SignerConfig>,

    #[serde(default)]
    pub price_feed: Option<Address>,

    #[serde(default)]
    pub dst_configs: BTreeMap<Eid, VerifierDstConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceFeedState {
    #[serde(default)]
    pub price_updaters: Vec<Address>,

    #[serde(default)]
    pub native_token_price_usd: Option<u128>,

    #[serde(default)]
    pub prices: BTreeMap<Eid, Price>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadLibState {
    #[serde(default)]
    pub read_uln_configs: BTreeMap<Eid, ReadUlnConfig>,
}

/// Payload of a snapshot transaction, JSON encoded in `PendingTransaction::data`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    RegisterLibrary {
        library: Address,
    },
    SetDefaultSendLibrary {
        eid: Eid,
        library: Address,
    },
    SetDefaultReceiveLibrary {
        eid: Eid,
        library: Address,
        grace_period: u64,
    },
    SetDefaultUlnConfig {
        eid: Eid,
        direction: UlnDirection,
        config: UlnConfig,
    },
    SetDefaultExecutorConfig {
        eid: Eid,
        config: ExecutorConfig,
    },
    SetExecutorPriceFeed {
        price_feed: Address,
    },
    SetDefaultMultiplierBps {
        multiplier_bps: u16,
    },
    SetExecutorDstConfig {
        eid: Eid,
        config: ExecutorDstConfig,
    },
    SetSigners {
        config: SignerConfig,
    },
    SetVerifierPriceFeed {
        price_feed: Address,
    },
    SetVerifierDstConfig {
        eid: Eid,
        config: VerifierDstConfig,
    },
    SetPriceUpdater {
        updater: Address,
        active: bool,
    },
    SetNativeTokenPrice {
        price: u128,
    },
    SetPrice {
        eid: Eid,
        price: Price,
    },
    SetDefaultReadUlnConfig {
        channel_id: Eid,
        config: ReadUlnConfig,
    },
}

fn section<'a, T>(section: &'a mut Option<T>, entity: &str) -> Result<&'a mut T> {
    section
        .as_mut()
        .ok_or_else(|| anyhow!("Contract has no {} state", entity))
}

impl Operation {
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).context("Failed to encode operation")
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Failed to decode operation")
    }

    /// Apply the operation to the target contract
    pub fn apply(&self, contract: &mut ContractState) -> Result<()> {
        match self.clone() {
            Self::RegisterLibrary { library } => {
                let endpoint = section(&mut contract.endpoint, "endpoint")?;
                if endpoint.registered_libraries.contains(&library) {
                    bail!("Library {} is already registered", library);
                }
                endpoint.registered_libraries.push(library);
            }
            Self::SetDefaultSendLibrary { eid, library } => {
                let endpoint = section(&mut contract.endpoint, "endpoint")?;
                ensure_registered(endpoint, &library)?;
                endpoint.default_send_libraries.insert(eid, library);
            }
            Self::SetDefaultReceiveLibrary {
                eid,
                library,
                grace_period,
            } => {
                let endpoint = section(&mut contract.endpoint, "endpoint")?;
                ensure_registered(endpoint, &library)?;
                endpoint
                    .default_receive_libraries
                    .insert(eid, ReceiveLibrary { library, grace_period });
            }
            Self::SetDefaultUlnConfig { eid, direction, config } => {
                let message_lib = section(&mut contract.message_lib, "message library")?;
                match direction {
                    UlnDirection::Send => message_lib.send_uln_configs.insert(eid, config),
                    UlnDirection::Receive => message_lib.receive_uln_configs.insert(eid, config),
                };
            }
            Self::SetDefaultExecutorConfig { eid, config } => {
                section(&mut contract.message_lib, "message library")?
                    .executor_configs
                    .insert(eid, config);
            }
            Self::SetExecutorPriceFeed { price_feed } => {
                section(&mut contract.executor, "executor")?.price_feed = Some(price_feed);
            }
            Self::SetDefaultMultiplierBps { multiplier_bps } => {
                section(&mut contract.executor, "executor")?.default_multiplier_bps = Some(multiplier_bps);
            }
            Self::SetExecutorDstConfig { eid, config } => {
                section(&mut contract.executor, "executor")?.dst_configs.insert(eid, config);
            }
            Self::SetSigners { config } => {
                if config.quorum == 0 || config.quorum > config.signers.len() as u64 {
                    bail!("Quorum {} is invalid for {} signer(s)", config.quorum, config.signers.len());
                }
                section(&mut contract.verifier, "verifier")?.signers = Some(config);
            }
            Self::SetVerifierPriceFeed { price_feed } => {
                section(&mut contract.verifier, "verifier")?.price_feed = Some(price_feed);
            }
            Self::SetVerifierDstConfig { eid, config } => {
                section(&mut contract.verifier, "verifier")?.dst_configs.insert(eid, config);
            }
            Self::SetPriceUpdater { updater, active } => {
                let price_feed = section(&mut contract.price_feed, "price feed")?;
                price_feed.price_updaters.retain(|u| u != &updater);
                if active {
                    price_feed.price_updaters.push(updater);
                }
            }
            Self::SetNativeTokenPrice { price } => {
                section(&mut contract.price_feed, "price feed")?.native_token_price_usd = Some(price);
            }
            Self::SetPrice { eid, price } => {
                section(&mut contract.price_feed, "price feed")?.prices.insert(eid, price);
            }
            Self::SetDefaultReadUlnConfig { channel_id, config } => {
                section(&mut contract.read_lib, "read library")?
                    .read_uln_configs
                    .insert(channel_id, config);
            }
        }
        Ok(())
    }
}

fn ensure_registered(endpoint: &EndpointState, library: &Address) -> Result<()> {
    if !endpoint.registered_libraries.contains(library) {
        bail!("Library {} is not registered", library);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(value: &str) -> Address {
        Address::parse(value).unwrap()
    }

    fn endpoint() -> ContractState {
        ContractState {
            endpoint: Some(EndpointState::default()),
            ..ContractState::default()
        }
    }

    #[test]
    fn test_state_yaml() {
        let yaml = r#"
chains:
  1:
    nonce: 4
    contracts:
      "0xd1":
        verifier:
          signers: { signers: ["0x1"], quorum: 1 }
"#;
        let state: SnapshotState = serde_yaml::from_str(yaml).unwrap();
        let point = Point::new(Eid(1), addr("0xd1"));

        assert_eq!(state.chains[&Eid(1)].nonce, 4);
        let verifier = state.contract(&point).unwrap().verifier.as_ref().unwrap();
        assert_eq!(verifier.signers.as_ref().unwrap().quorum, 1);
        assert!(state.contract(&point).unwrap().endpoint.is_none());
    }

    #[test]
    fn test_default_library_must_be_registered() {
        let mut contract = endpoint();
        let set_send = Operation::SetDefaultSendLibrary {
            eid: Eid(2),
            library: addr("0x51"),
        };

        assert!(set_send.apply(&mut contract).is_err());

        Operation::RegisterLibrary { library: addr("0x51") }
            .apply(&mut contract)
            .unwrap();
        set_send.apply(&mut contract).unwrap();

        let endpoint = contract.endpoint.unwrap();
        assert_eq!(endpoint.default_send_libraries[&Eid(2)], addr("0x51"));
    }

    #[test]
    fn test_wrong_entity_is_rejected() {
        let mut contract = endpoint();
        let error = Operation::SetDefaultMultiplierBps { multiplier_bps: 1 }
            .apply(&mut contract)
            .unwrap_err();
        assert!(error.to_string().contains("has no executor state"));
    }

    #[test]
    fn test_operation_survives_encoding() {
        let operation = Operation::SetNativeTokenPrice { price: 1 << 70 };
        let decoded = Operation::decode(&operation.encode().unwrap()).unwrap();
        assert_eq!(decoded, operation);
    }
}
