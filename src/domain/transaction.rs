//! Transactions produced by the reconcilers and the results of submitting them.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::point::{Eid, Point};

/// An unsigned, chain-scoped change awaiting signing and submission.
///
/// `data` is an opaque payload produced by a remote handle; the engine
/// never looks inside it. `description` is for humans only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransaction {
    /// The contract this transaction targets
    pub point: Point,

    /// Chain-specific payload, hex encoded when serialized
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,

    /// Human-readable summary of the change
    pub description: String,
}

impl PendingTransaction {
    pub fn new(point: Point, data: Vec<u8>, description: impl Into<String>) -> Self {
        Self {
            point,
            data,
            description: description.into(),
        }
    }

    pub fn eid(&self) -> Eid {
        self.point.eid
    }

    /// Short content hash of the payload (first 8 bytes of SHA256, hex)
    pub fn data_hash(&self) -> String {
        let digest = Sha256::digest(&self.data);
        hex::encode(&digest[..8])
    }
}

impl fmt::Display for PendingTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.point, self.description)
    }
}

/// A transaction signed for a specific nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub transaction: PendingTransaction,
    pub nonce: u64,
    pub payload: Vec<u8>,
}

/// Hash of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionHash(pub String);

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Confirmation of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub hash: TransactionHash,
    pub block: Option<u64>,
}

/// Group transaction indices by chain, keeping their relative order.
///
/// Chains appear in the order of their first transaction.
pub fn group_indices_by_eid(transactions: &[PendingTransaction]) -> Vec<(Eid, Vec<usize>)> {
    let mut groups: Vec<(Eid, Vec<usize>)> = Vec::new();
    for (index, transaction) in transactions.iter().enumerate() {
        match groups.iter_mut().find(|(eid, _)| *eid == transaction.eid()) {
            Some((_, group)) => group.push(index),
            None => groups.push((transaction.eid(), vec![index])),
        }
    }
    groups
}

/// Group transactions by chain, same order as `group_indices_by_eid`
pub fn group_transactions_by_eid(transactions: &[PendingTransaction]) -> Vec<(Eid, Vec<&PendingTransaction>)> {
    group_indices_by_eid(transactions)
        .into_iter()
        .map(|(eid, indices)| (eid, indices.into_iter().map(|i| &transactions[i]).collect()))
        .collect()
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        let digits = value.strip_prefix("0x").unwrap_or(&value);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
