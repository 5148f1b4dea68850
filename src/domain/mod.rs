//! Domain types for the omniwire engine.
//!
//! This module contains the core data structures:
//! - Point/Vector: coordinates of contracts and pathways
//! - Graph: desired configuration, with its builder
//! - Transactions: pending changes and submission results
//! - Events/Run: the run log

pub mod events;
pub mod graph;
pub mod point;
pub mod run;
pub mod transaction;

// Re-export commonly used types
pub use events::{Event, EventType, Status};
pub use graph::{Edge, Graph, GraphBuilder, GraphDefinition, GraphError, Node};
pub use point::{canonical_addresses, same_address_set, Address, AddressError, AddressFamily, Eid, Point, Vector};
pub use run::{Run, RunState};
pub use transaction::{
    group_indices_by_eid, group_transactions_by_eid, PendingTransaction, SignedTransaction, TransactionHash, TransactionReceipt,
};
