//! Offline chain state backed by a YAML snapshot file.
//!
//! A snapshot plays the part of every chain at once: it hands out remote
//! handles for the reconcilers and signers for the transaction pipeline.
//! Submitted transactions are applied to the in-memory state and, when
//! the snapshot was loaded from a file, written back to it.
//!
//! ```yaml
//! chains:
//!   30101:
//!     nonce: 0
//!     contracts:
//!       "0x...":
//!         verifier:
//!           signers: { signers: ["0x..."], quorum: 1 }
//! ```
//!
//! A contract without a section for an entity cannot be used as that
//! entity. A section without a value reads as never set.

mod handles;
mod state;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::configure::HandleFactory;
use crate::core::pipeline::{Signer, SignerFactory};
use crate::domain::{Eid, PendingTransaction, Point, SignedTransaction, TransactionHash, TransactionReceipt};
use crate::protocol::{EndpointSdk, ExecutorSdk, MessageLibSdk, PriceFeedSdk, ReadLibSdk, SdkFactories, VerifierSdk};

pub use handles::SnapshotContract;
pub use state::{
    ChainState, ContractState, EndpointState, ExecutorState, MessageLibState, Operation, PriceFeedState, ReadLibState,
    ReceiveLibrary, SnapshotState, VerifierState,
};

struct Inner {
    state: SnapshotState,

    /// Block of every transaction submitted through this snapshot
    receipts: HashMap<TransactionHash, u64>,
}

/// Shared handle to a snapshot; clones see the same state
#[derive(Clone)]
pub struct Snapshot {
    path: Option<PathBuf>,
    inner: Arc<Mutex<Inner>>,
}

impl Snapshot {
    /// In-memory snapshot, never written anywhere
    pub fn new(state: SnapshotState) -> Self {
        Self {
            path: None,
            inner: Arc::new(Mutex::new(Inner {
                state,
                receipts: HashMap::new(),
            })),
        }
    }

    /// Load a snapshot file; submissions are written back to it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
        let state: SnapshotState = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;

        debug!(path = %path.display(), chains = state.chains.len(), "Loaded snapshot");
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::new(state)
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current state
    pub async fn state(&self) -> SnapshotState {
        self.inner.lock().await.state.clone()
    }

    pub(crate) async fn with_state<T>(&self, read: impl FnOnce(&SnapshotState) -> T) -> T {
        read(&self.inner.lock().await.state)
    }

    /// Handle factories for every entity type
    pub fn factories(&self) -> SdkFactories {
        let factory = Arc::new(self.clone());
        SdkFactories {
            price_feed: Some(factory.clone()),
            verifier: Some(factory.clone()),
            executor: Some(factory.clone()),
            message_lib: Some(factory.clone()),
            read_lib: Some(factory.clone()),
            endpoint: Some(factory),
        }
    }

    /// Handle of a contract that has the given entity section
    async fn contract(&self, point: &Point, entity: &str, has: fn(&ContractState) -> bool) -> Result<SnapshotContract> {
        let found = self.with_state(|state| state.contract(point).map(has)).await;
        match found {
            Some(true) => Ok(SnapshotContract::new(self.clone(), point.clone())),
            Some(false) => bail!("Contract at {} is not a {}", point, entity),
            None => bail!("No contract at {}", point),
        }
    }

    fn save(&self, state: &SnapshotState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let yaml = serde_yaml::to_string(state).context("Failed to serialize snapshot")?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open snapshot: {}", path.display()))?;

        file.lock_exclusive()
            .context("Failed to acquire file lock on snapshot")?;
        write_locked(file, &yaml).with_context(|| format!("Failed to write snapshot: {}", path.display()))
    }
}

/// Lock is released when the file is dropped
fn write_locked(mut file: File, content: &str) -> Result<()> {
    file.set_len(0)?;
    file.write_all(content.as_bytes())?;
    file.flush()?;
    Ok(())
}

macro_rules! handle_factory {
    ($sdk:ident, $entity:literal, $section:ident) => {
        #[async_trait]
        impl HandleFactory<dyn $sdk> for Snapshot {
            async fn create(&self, point: &Point) -> Result<Arc<dyn $sdk>> {
                let contract = self.contract(point, $entity, |c| c.$section.is_some()).await?;
                Ok(Arc::new(contract))
            }
        }
    };
}

handle_factory!(EndpointSdk, "endpoint", endpoint);
handle_factory!(MessageLibSdk, "message library", message_lib);
handle_factory!(ExecutorSdk, "executor", executor);
handle_factory!(VerifierSdk, "verifier", verifier);
handle_factory!(PriceFeedSdk, "price feed", price_feed);
handle_factory!(ReadLibSdk, "read library", read_lib);

/// Signs for the deployer account of one chain
pub struct SnapshotSigner {
    snapshot: Snapshot,
    eid: Eid,
}

impl SnapshotSigner {
    fn transaction_hash(&self, signed: &SignedTransaction) -> TransactionHash {
        let mut hasher = Sha256::new();
        hasher.update(self.eid.0.to_be_bytes());
        hasher.update(signed.nonce.to_be_bytes());
        hasher.update(&signed.payload);
        TransactionHash(format!("0x{}", hex::encode(hasher.finalize())))
    }
}

#[async_trait]
impl Signer for SnapshotSigner {
    async fn nonce(&self) -> Result<u64> {
        self.snapshot
            .with_state(|state| state.chains.get(&self.eid).map(|chain| chain.nonce))
            .await
            .ok_or_else(|| anyhow!("Unknown chain {}", self.eid))
    }

    async fn simulate(&self, transaction: &PendingTransaction) -> Result<()> {
        let operation = Operation::decode(&transaction.data)?;
        let mut contract = self
            .snapshot
            .with_state(|state| state.contract(&transaction.point).cloned())
            .await
            .ok_or_else(|| anyhow!("No contract at {}", transaction.point))?;
        operation.apply(&mut contract)
    }

    async fn sign(&self, transaction: &PendingTransaction, nonce: u64) -> Result<SignedTransaction> {
        if transaction.eid() != self.eid {
            bail!("Cannot sign a transaction for chain {} with the signer of {}", transaction.eid(), self.eid);
        }
        Ok(SignedTransaction {
            transaction: transaction.clone(),
            nonce,
            payload: transaction.data.clone(),
        })
    }

    async fn submit(&self, signed: &SignedTransaction) -> Result<TransactionHash> {
        let operation = Operation::decode(&signed.payload)?;
        let hash = self.transaction_hash(signed);

        let mut inner = self.inner_lock().await;
        let mut state = inner.state.clone();

        let expected = state
            .chains
            .get(&self.eid)
            .map(|chain| chain.nonce)
            .ok_or_else(|| anyhow!("Unknown chain {}", self.eid))?;
        if signed.nonce != expected {
            bail!("Invalid nonce {}, expected {}", signed.nonce, expected);
        }

        let point = &signed.transaction.point;
        let contract = state
            .contract_mut(point)
            .ok_or_else(|| anyhow!("No contract at {}", point))?;
        operation.apply(contract)?;

        let block = match state.chains.get_mut(&self.eid) {
            Some(chain) => {
                chain.nonce += 1;
                chain.block += 1;
                chain.block
            }
            None => bail!("Unknown chain {}", self.eid),
        };

        self.snapshot.save(&state)?;
        inner.state = state;
        inner.receipts.insert(hash.clone(), block);

        info!(eid = %self.eid, nonce = signed.nonce, block, %hash, "Applied transaction to snapshot");
        Ok(hash)
    }

    async fn confirm(&self, hash: &TransactionHash) -> Result<TransactionReceipt> {
        let block = self
            .inner_lock()
            .await
            .receipts
            .get(hash)
            .copied()
            .ok_or_else(|| anyhow!("Unknown transaction {}", hash))?;
        Ok(TransactionReceipt {
            hash: hash.clone(),
            block: Some(block),
        })
    }
}

impl SnapshotSigner {
    async fn inner_lock(&self) -> tokio::sync::MutexGuard<'_, Inner> {
        self.snapshot.inner.lock().await
    }
}

#[async_trait]
impl SignerFactory for Snapshot {
    async fn create(&self, eid: Eid) -> Result<Arc<dyn Signer>> {
        let known = self.with_state(|state| state.chains.contains_key(&eid)).await;
        if !known {
            bail!("Unknown chain {}", eid);
        }
        Ok(Arc::new(SnapshotSigner {
            snapshot: self.clone(),
            eid,
        }))
    }
}
