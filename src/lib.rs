//! trustflow: max-flow and arbitrage analysis over trust networks
//!
//! Pipeline:
//! 1. `cartographer` ingests trust and balance snapshots into a capacity network
//! 2. `solver` computes bounded max flow behind a pluggable backend
//! 3. `brain` turns raw flow into paths, transfers and arbitrage cycles
//! 4. `coordinator` exposes the whole thing in address space

pub mod brain;
pub mod cartographer;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod solver;

pub use brain::{FlowAnalysis, FlowReport};
pub use config::Config;
pub use coordinator::{AddressFlowReport, AddressPath, Coordinator};
pub use error::{IngestionError, PathfinderError, SolverError};
pub use solver::{BackendKind, FlowAlgorithm, GraphBackend};
