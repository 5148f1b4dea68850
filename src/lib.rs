//! omniwire - Desired-state reconciliation for omnichain messaging endpoints
//!
//! Reads a declared configuration graph (chains as nodes, pathways as
//! directed edges), compares it against what the deployed contracts
//! report, and produces the minimal set of transactions that brings the
//! chains in line.
//!
//! # Architecture
//!
//! - Reconcilers read current values through remote handles and emit one
//!   transaction per divergent setting
//! - The transaction pipeline signs, submits and confirms them per chain
//! - Every apply run is recorded as immutable events and can be inspected later
//!
//! # Modules
//!
//! - `adapters`: Chain backends (local snapshot file)
//! - `core`: Reconcile machinery, transaction pipeline, safety limits, run log
//! - `domain`: Data structures (Point, Graph, Transaction, Event, Run)
//! - `protocol`: Per-contract reconcilers (endpoint, libraries, workers)
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Show the transactions a wire config needs
//! omniwire plan --wire wire.yaml --snapshot chains.json
//!
//! # Submit them
//! omniwire apply --wire wire.yaml --snapshot chains.json
//!
//! # Check run status
//! omniwire status <run-id>
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod protocol;

// Re-export main types at crate root for convenience
pub use core::{Orchestrator, Plan};
pub use domain::{Event, EventType, Graph, PendingTransaction, Point, Run, RunState, Vector};
pub use protocol::{configure_all, WireConfig, WireError, WireGraphs};
