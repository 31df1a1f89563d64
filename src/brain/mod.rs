//! Phase 3: The Brain
//!
//! Responsible for:
//! - Point-to-point flow queries with auditable path decomposition
//! - Arbitrage cycles closed back onto their start account

mod arbitrage;
mod flow;

pub use flow::{simplify_edge_flows, FlowAnalysis, FlowReport, TokenFlows};
