//! Phase 1: The Cartographer (Data Ingest)
//!
//! Responsible for:
//! - Mapping account addresses to dense integer ids
//! - Expanding trust relations and balances into capacitated edges
//! - Building the immutable capacity network queried by the solvers

mod graph;
mod loader;
mod records;

pub use graph::{hop_token, AccountId, Capacity, CapacityNetwork, EdgeData, Vertex};
pub use loader::{
    convert_balance, GraphLoader, LoaderOptions, BALANCE_SCALE, DEFAULT_CHUNK_SIZE, MAX_EDGE_CAPACITY,
};
pub use records::{load_balances_csv, load_trusts_csv, BalanceRecord, TrustRecord};
