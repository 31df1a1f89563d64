//! Phase 4: The Coordinator
//!
//! Owns one ingestion result and one backend per snapshot. Callers speak
//! addresses; everything below this layer speaks dense ids.

use rand::seq::IteratorRandom;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::brain::{FlowAnalysis, FlowReport};
use crate::cartographer::{
    load_balances_csv, load_trusts_csv, AccountId, BalanceRecord, Capacity, GraphLoader, TrustRecord, Vertex,
};
use crate::config::Config;
use crate::error::{PathfinderError, Result};
use crate::solver::{create_backend, BackendKind, FlowAlgorithm, GraphBackend};

/// One route in address space
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddressPath {
    pub accounts: Vec<String>,
    pub tokens: Vec<String>,
    pub amount: Capacity,
}

/// A [`FlowReport`] translated back to addresses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFlowReport {
    pub flow_value: Capacity,
    pub paths: Vec<AddressPath>,
    /// (from, to) -> {token: amount}
    pub edge_flows: BTreeMap<(String, String), BTreeMap<String, Capacity>>,
    /// Per-edge flow keyed by internal vertex labels
    pub raw_edge_flows: BTreeMap<(String, String), Capacity>,
}

impl AddressFlowReport {
    pub fn to_json(&self) -> Value {
        let edge_flows: Vec<Value> = self
            .edge_flows
            .iter()
            .map(|((from, to), tokens)| json!({ "from": from, "to": to, "tokens": tokens }))
            .collect();
        let raw_edge_flows: Vec<Value> = self
            .raw_edge_flows
            .iter()
            .map(|((from, to), amount)| json!({ "from": from, "to": to, "amount": amount }))
            .collect();

        json!({
            "flow_value": self.flow_value,
            "paths": self.paths,
            "edge_flows": edge_flows,
            "raw_edge_flows": raw_edge_flows,
        })
    }
}

pub struct Coordinator {
    loader: GraphLoader,
    backend: Box<dyn GraphBackend>,
    config: Config,
}

impl Coordinator {
    pub fn new(trusts: &[TrustRecord], balances: &[BalanceRecord], config: &Config) -> Result<Self> {
        let loader = GraphLoader::with_options(trusts, balances, config.loader_options())?;
        let backend = create_backend(config.backend, &loader);
        info!(
            "Coordinator ready: {} backend, {} vertices, {} edges",
            backend.name(),
            backend.num_vertices(),
            backend.num_edges()
        );

        Ok(Self {
            loader,
            backend,
            config: config.clone(),
        })
    }

    pub fn from_csv<P: AsRef<Path>>(trusts_path: P, balances_path: P, config: &Config) -> Result<Self> {
        let trusts = load_trusts_csv(trusts_path)?;
        let balances = load_balances_csv(balances_path)?;
        Self::new(&trusts, &balances, config)
    }

    /// Replace the snapshot. On failure the previous snapshot stays in place.
    pub fn rebuild(&mut self, trusts: &[TrustRecord], balances: &[BalanceRecord]) -> Result<()> {
        let loader = GraphLoader::with_options(trusts, balances, self.config.loader_options())?;
        self.backend = create_backend(self.config.backend, &loader);
        self.loader = loader;
        info!(
            "Snapshot rebuilt: {} vertices, {} edges",
            self.backend.num_vertices(),
            self.backend.num_edges()
        );
        Ok(())
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.config.backend
    }

    pub fn num_vertices(&self) -> usize {
        self.backend.num_vertices()
    }

    pub fn num_edges(&self) -> usize {
        self.backend.num_edges()
    }

    pub fn num_accounts(&self) -> usize {
        self.loader.num_accounts()
    }

    pub fn analyze_flow(
        &self,
        source: &str,
        sink: &str,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<AddressFlowReport> {
        let source = Vertex::Account(self.resolve(source)?);
        let sink = Vertex::Account(self.resolve(sink)?);

        let report = FlowAnalysis::new(self.backend.as_ref()).analyze_flow(
            &source,
            &sink,
            algorithm.or(self.config.algorithm),
            cutoff.or(self.config.default_cutoff),
        )?;
        Ok(self.translate(report))
    }

    pub fn analyze_arbitrage(
        &self,
        start: &str,
        start_token: &str,
        end_token: &str,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<AddressFlowReport> {
        let start = self.resolve(start)?;
        let start_token = self.resolve(start_token)?;
        let end_token = self.resolve(end_token)?;

        let report = FlowAnalysis::new(self.backend.as_ref()).analyze_arbitrage(
            start,
            start_token,
            end_token,
            algorithm.or(self.config.algorithm),
            cutoff.or(self.config.default_cutoff),
        )?;
        Ok(self.translate(report))
    }

    /// Human-readable description of up to `sample` random vertices
    pub fn node_info(&self, sample: usize) -> Vec<String> {
        let mut rng = rand::thread_rng();
        let mut picked = self
            .backend
            .get_vertices()
            .into_iter()
            .choose_multiple(&mut rng, sample.min(self.num_vertices()));
        picked.sort();

        picked
            .into_iter()
            .map(|vertex| {
                let network = self.backend.network();
                let degree = format!(
                    "out {} / in {}",
                    network.out_edges(&vertex).len(),
                    network.in_edges(&vertex).len()
                );
                match vertex {
                    Vertex::Holding { holder, token } => format!(
                        "intermediate {} ({} holding {}): {}",
                        vertex,
                        self.address(holder),
                        self.address(token),
                        degree
                    ),
                    _ => format!("account {} ({}): {}", vertex, self.address(vertex.account()), degree),
                }
            })
            .collect()
    }

    /// Known addresses without an account vertex are rejected later, by the
    /// analysis layer, as unknown vertices
    fn resolve(&self, address: &str) -> Result<AccountId> {
        self.loader
            .get_id_for_address(address)
            .ok_or_else(|| PathfinderError::UnknownAddress(address.to_string()))
    }

    fn address(&self, id: AccountId) -> String {
        self.loader
            .get_address_for_id(id)
            .map_or_else(|| id.to_string(), str::to_string)
    }

    fn vertex_label(&self, vertex: &Vertex) -> String {
        match *vertex {
            Vertex::Account(id) => self.address(id),
            Vertex::Holding { holder, token } => format!("{}_{}", self.address(holder), self.address(token)),
            Vertex::VirtualSink(start) => format!("virtual_sink_{}", self.address(start)),
        }
    }

    fn translate(&self, report: FlowReport) -> AddressFlowReport {
        AddressFlowReport {
            flow_value: report.flow_value,
            paths: report
                .paths
                .iter()
                .map(|path| AddressPath {
                    accounts: path.accounts.iter().map(|&id| self.address(id)).collect(),
                    tokens: path.tokens.iter().map(|&id| self.address(id)).collect(),
                    amount: path.amount,
                })
                .collect(),
            edge_flows: report
                .edge_flows
                .iter()
                .map(|(&(from, to), tokens)| {
                    let tokens = tokens.iter().map(|(&t, &amount)| (self.address(t), amount)).collect();
                    ((self.address(from), self.address(to)), tokens)
                })
                .collect(),
            raw_edge_flows: report
                .raw_edge_flows
                .iter()
                .map(|((u, v), &amount)| ((self.vertex_label(u), self.vertex_label(v)), amount))
                .collect(),
        }
    }
}
