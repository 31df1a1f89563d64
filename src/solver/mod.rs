//! Phase 2: The Solver
//!
//! Responsible for:
//! - Max flow over the capacity network, optionally bounded by a cutoff
//! - Decomposing aggregate flow into concrete weighted paths
//! - The arbitrage overlay that turns cycle search into source -> sink flow
//!
//! Two interchangeable backends sit behind [`GraphBackend`]:
//! - [`GeneralBackend`]: preflow-push by default, Edmonds-Karp and Dinic on request
//! - [`CombinatorialBackend`]: capacity-scaling blocking flow on a pruned arc array

mod augmenting;
mod combinatorial;
mod decomposition;
mod general;
mod overlay;
mod push_relabel;
mod residual;

pub use combinatorial::CombinatorialBackend;
pub use decomposition::{decompose, simplify_paths};
pub use general::GeneralBackend;
pub use overlay::{interpret_flow, ArbitrageOverlay, GraphView};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::cartographer::{AccountId, Capacity, CapacityNetwork, GraphLoader, Vertex};
use crate::error::{PathfinderError, SolverError};

// ============================================
// TYPES
// ============================================

/// vertex -> {neighbor: flow}, positive entries only
pub type FlowDict = HashMap<Vertex, HashMap<Vertex, Capacity>>;

/// Per-edge flow keyed by internal vertices
pub type EdgeFlows = BTreeMap<(Vertex, Vertex), Capacity>;

/// One source-to-sink path through the flow network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowPath {
    pub nodes: Vec<Vertex>,
    /// Token moved on each hop
    pub tokens: Vec<AccountId>,
    pub amount: Capacity,
}

/// Account-level view of a path: one entry per transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimplifiedPath {
    pub accounts: Vec<AccountId>,
    pub tokens: Vec<AccountId>,
    pub amount: Capacity,
}

/// Max-flow algorithm requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowAlgorithm {
    PreflowPush,
    EdmondsKarp,
    Dinic,
}

impl FlowAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            FlowAlgorithm::PreflowPush => "preflow_push",
            FlowAlgorithm::EdmondsKarp => "edmonds_karp",
            FlowAlgorithm::Dinic => "dinic",
        }
    }
}

impl fmt::Display for FlowAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FlowAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "preflow_push" | "push_relabel" => Ok(FlowAlgorithm::PreflowPush),
            "edmonds_karp" => Ok(FlowAlgorithm::EdmondsKarp),
            "dinic" | "dinitz" => Ok(FlowAlgorithm::Dinic),
            other => Err(format!("unknown flow algorithm `{}`", other)),
        }
    }
}

/// Which solver implementation backs a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    #[default]
    General,
    Combinatorial,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::General => write!(f, "general"),
            BackendKind::Combinatorial => write!(f, "combinatorial"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "general" | "networkx" => Ok(BackendKind::General),
            "combinatorial" | "ortools" => Ok(BackendKind::Combinatorial),
            other => Err(format!("unknown graph backend `{}`", other)),
        }
    }
}

// ============================================
// BACKEND CONTRACT
// ============================================

/// A capacitated digraph with max-flow and arbitrage support.
///
/// Implementors supply the network and `compute_flow_in`; everything else has
/// a shared default.
pub trait GraphBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn network(&self) -> &CapacityNetwork;

    /// Max flow over `view`, never exceeding `cutoff`. The returned flow has
    /// no circulations.
    fn compute_flow_in(
        &self,
        view: &GraphView<'_>,
        source: &Vertex,
        sink: &Vertex,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<(Capacity, FlowDict), SolverError>;

    fn view(&self) -> GraphView<'_> {
        GraphView::base(self.network())
    }

    fn has_vertex(&self, vertex: &Vertex) -> bool {
        self.network().has_vertex(vertex)
    }

    fn num_vertices(&self) -> usize {
        self.network().node_count()
    }

    fn num_edges(&self) -> usize {
        self.network().edge_count()
    }

    fn get_vertices(&self) -> Vec<Vertex> {
        self.network().vertices().collect()
    }

    fn compute_flow(
        &self,
        source: &Vertex,
        sink: &Vertex,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<(Capacity, FlowDict), SolverError> {
        self.compute_flow_in(&self.view(), source, sink, algorithm, cutoff)
    }

    fn flow_decomposition(
        &self,
        flow: &FlowDict,
        source: &Vertex,
        sink: &Vertex,
        cutoff: Option<Capacity>,
    ) -> (Vec<FlowPath>, EdgeFlows) {
        decompose(flow, source, sink, cutoff)
    }

    fn simplified_flow_decomposition(&self, paths: &[FlowPath]) -> Vec<SimplifiedPath> {
        simplify_paths(paths)
    }

    fn prepare_arbitrage_graph(
        &self,
        start: AccountId,
        start_token: AccountId,
        end_token: AccountId,
    ) -> ArbitrageOverlay {
        ArbitrageOverlay::build(self.network(), start, start_token, end_token)
    }

    fn interpret_arbitrage_flow(
        &self,
        flow: &FlowDict,
        start: AccountId,
        sink: &Vertex,
        cutoff: Option<Capacity>,
    ) -> FlowDict {
        interpret_flow(flow, start, sink, cutoff)
    }

    /// Release an overlay and confirm the base network is unchanged
    fn cleanup_arbitrage_graph(&self, overlay: ArbitrageOverlay) -> Result<(), PathfinderError> {
        let (vertices, edges) = overlay.base_counts();
        let synthetic = overlay.synthetic_edges().len();
        drop(overlay);

        if self.num_vertices() != vertices || self.num_edges() != edges {
            return Err(PathfinderError::ResourceCleanup(format!(
                "base graph changed from {}/{} to {}/{} vertices/edges",
                vertices,
                edges,
                self.num_vertices(),
                self.num_edges()
            )));
        }

        debug!("Released arbitrage overlay ({} synthetic edges)", synthetic);
        Ok(())
    }
}

/// Build the capacity network from an ingestion result and wrap it in the
/// requested backend
pub fn create_backend(kind: BackendKind, loader: &GraphLoader) -> Box<dyn GraphBackend> {
    let network = CapacityNetwork::from_edges(&loader.edges, &loader.capacities, &loader.tokens);
    match kind {
        BackendKind::General => Box::new(GeneralBackend::new(network)),
        BackendKind::Combinatorial => Box::new(CombinatorialBackend::new(network)),
    }
}

/// Shared query validation
fn check_endpoints(view: &GraphView<'_>, source: &Vertex, sink: &Vertex) -> Result<(), SolverError> {
    if source == sink {
        return Err(SolverError::SourceIsSink(*source));
    }
    for vertex in [source, sink] {
        if !view.has_vertex(vertex) {
            return Err(SolverError::MissingVertex(*vertex));
        }
    }
    Ok(())
}
