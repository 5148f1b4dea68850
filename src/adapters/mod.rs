//! Chain adapters.
//!
//! An adapter provides the remote handles the reconcilers read through
//! and the signers the transaction pipeline submits with. The snapshot
//! adapter serves both from a local state file.

pub mod snapshot;

pub use snapshot::{Operation, Snapshot, SnapshotContract, SnapshotSigner, SnapshotState};
