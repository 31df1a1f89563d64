//! Point-to-point flow analysis
//!
//! Step 3.1: The Router
//!
//! Turns a raw max-flow assignment into auditable routes: concrete paths,
//! per-token transfers between real accounts, and the raw per-edge flow.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::cartographer::{AccountId, Capacity, Vertex};
use crate::error::{PathfinderError, Result};
use crate::solver::{EdgeFlows, FlowAlgorithm, FlowPath, GraphBackend, SimplifiedPath};

/// (from account, to account) -> {token: amount}
pub type TokenFlows = BTreeMap<(AccountId, AccountId), BTreeMap<AccountId, Capacity>>;

/// Result of a flow or arbitrage query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowReport {
    pub flow_value: Capacity,
    pub paths: Vec<SimplifiedPath>,
    pub edge_flows: TokenFlows,
    pub raw_edge_flows: EdgeFlows,
}

impl FlowReport {
    pub fn is_empty(&self) -> bool {
        self.flow_value == 0 && self.paths.is_empty()
    }

    pub(crate) fn from_paths(
        backend: &dyn GraphBackend,
        flow_value: Capacity,
        paths: &[FlowPath],
        raw_edge_flows: EdgeFlows,
    ) -> Self {
        Self {
            flow_value,
            paths: backend.simplified_flow_decomposition(paths),
            edge_flows: simplify_edge_flows(&raw_edge_flows),
            raw_edge_flows,
        }
    }
}

/// Query layer over one backend
pub struct FlowAnalysis<'a> {
    pub(crate) backend: &'a dyn GraphBackend,
}

impl<'a> FlowAnalysis<'a> {
    pub fn new(backend: &'a dyn GraphBackend) -> Self {
        Self { backend }
    }

    /// Max flow from `source` to `sink` with its decomposition.
    ///
    /// A vertex missing from the graph is an error. A solver failure is
    /// logged and yields an empty report.
    pub fn analyze_flow(
        &self,
        source: &Vertex,
        sink: &Vertex,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<FlowReport> {
        for vertex in [source, sink] {
            if !self.backend.has_vertex(vertex) {
                return Err(PathfinderError::UnknownVertex(*vertex));
            }
        }

        if source == sink {
            return Ok(self.self_flow(source, cutoff));
        }

        let (flow_value, flow) = match self.backend.compute_flow(source, sink, algorithm, cutoff) {
            Ok(result) => result,
            Err(e) => {
                warn!("Flow {} -> {} failed on {} backend: {}", source, sink, self.backend.name(), e);
                return Ok(FlowReport::default());
            }
        };

        let (paths, raw_edge_flows) = self.backend.flow_decomposition(&flow, source, sink, cutoff);
        let decomposed: Capacity = paths.iter().map(|p| p.amount).sum();
        if decomposed != flow_value {
            warn!(
                "Decomposition of {} -> {} covers {} of {} units",
                source, sink, decomposed, flow_value
            );
        }

        let report = FlowReport::from_paths(self.backend, flow_value, &paths, raw_edge_flows);
        info!(
            "Flow {} -> {}: {} via {} paths",
            source,
            sink,
            report.flow_value,
            report.paths.len()
        );

        Ok(report)
    }

    /// An account sending to itself delivers its own holdings: every
    /// `account -> (account, token)` edge becomes `[account, (account, token), account]`.
    ///
    /// The graph has no `(account, token) -> account` edge, so the closing hop
    /// appears only in the paths. `raw_edge_flows` holds just the real
    /// `account -> (account, token)` edges and `edge_flows` is empty.
    fn self_flow(&self, account: &Vertex, cutoff: Option<Capacity>) -> FlowReport {
        let mut holdings: Vec<(Vertex, Capacity)> = self
            .backend
            .network()
            .out_edges(account)
            .into_iter()
            .filter(|(to, _)| to.is_intermediate())
            .map(|(to, data)| (to, data.capacity))
            .collect();
        holdings.sort();

        let mut paths = Vec::new();
        let mut raw_edge_flows = EdgeFlows::new();
        let mut total: Capacity = 0;

        for (holding, capacity) in holdings {
            let allowance = cutoff.map_or(Capacity::MAX, |c| c.saturating_sub(total));
            let amount = capacity.min(allowance);
            if amount == 0 {
                continue;
            }
            let Some(token) = holding.token() else {
                continue;
            };

            *raw_edge_flows.entry((*account, holding)).or_default() += amount;
            paths.push(FlowPath {
                nodes: vec![*account, holding, *account],
                tokens: vec![token, token],
                amount,
            });
            total += amount;
        }

        debug!("Self flow for {}: {} across {} holdings", account, total, paths.len());
        FlowReport::from_paths(self.backend, total, &paths, raw_edge_flows)
    }
}

/// Regroup per-edge flow into per-token transfers between real accounts.
///
/// Only `(holder, token) -> receiver` edges carry a transfer; holder ->
/// holding edges and edges into a virtual sink are skipped.
pub fn simplify_edge_flows(raw: &EdgeFlows) -> TokenFlows {
    let mut simplified = TokenFlows::new();

    for (&(from, to), &amount) in raw {
        let Vertex::Holding { holder, token } = from else {
            continue;
        };
        if to.is_synthetic() || to.is_intermediate() || amount == 0 {
            continue;
        }
        *simplified
            .entry((holder, to.account()))
            .or_default()
            .entry(token)
            .or_default() += amount;
    }

    simplified
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::{BalanceRecord, CapacityNetwork, GraphLoader, TrustRecord};
    use crate::error::SolverError;
    use crate::solver::{create_backend, BackendKind, FlowDict, GraphView};

    /// 100.0 tokens in raw fixed-point
    const HUNDRED: &str = "100000000000000000000";

    /// A holds 100 A, B trusts A and holds 100 B, C trusts B
    fn chain() -> GraphLoader {
        let trusts = vec![TrustRecord::new("0xB", "0xA"), TrustRecord::new("0xC", "0xB")];
        let balances = vec![
            BalanceRecord::new("0xA", "0xA", HUNDRED),
            BalanceRecord::new("0xB", "0xB", HUNDRED),
        ];
        GraphLoader::new(&trusts, &balances).unwrap()
    }

    fn id(loader: &GraphLoader, address: &str) -> AccountId {
        loader.get_id_for_address(address).unwrap()
    }

    #[test]
    fn test_chain_flow() {
        let loader = chain();
        let (a, b, c) = (id(&loader, "0xa"), id(&loader, "0xb"), id(&loader, "0xc"));

        for kind in [BackendKind::General, BackendKind::Combinatorial] {
            let backend = create_backend(kind, &loader);
            let analysis = FlowAnalysis::new(backend.as_ref());
            let report = analysis
                .analyze_flow(&Vertex::Account(a), &Vertex::Account(c), None, None)
                .unwrap();

            assert_eq!(report.flow_value, 100_000);
            assert_eq!(
                report.paths,
                vec![SimplifiedPath { accounts: vec![a, b, c], tokens: vec![a, b], amount: 100_000 }]
            );
            assert_eq!(report.edge_flows[&(a, b)][&a], 100_000);
            assert_eq!(report.edge_flows[&(b, c)][&b], 100_000);
            assert_eq!(report.edge_flows.len(), 2);
            assert_eq!(report.raw_edge_flows.len(), 4);
        }
    }

    #[test]
    fn test_chain_flow_with_cutoff() {
        let loader = chain();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());
        let (a, c) = (Vertex::Account(id(&loader, "0xa")), Vertex::Account(id(&loader, "0xc")));

        let report = analysis.analyze_flow(&a, &c, None, Some(50)).unwrap();
        assert_eq!(report.flow_value, 50);
        assert_eq!(report.paths.iter().map(|p| p.amount).sum::<Capacity>(), 50);
    }

    #[test]
    fn test_unknown_vertex() {
        let loader = chain();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());
        let a = Vertex::Account(id(&loader, "0xa"));

        let err = analysis.analyze_flow(&a, &Vertex::Account(77), None, None).unwrap_err();
        assert!(matches!(err, PathfinderError::UnknownVertex(Vertex::Account(77))));
    }

    #[test]
    fn test_self_flow_delivers_own_holdings() {
        let loader = chain();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());
        let a = id(&loader, "0xa");

        let report = analysis.analyze_flow(&Vertex::Account(a), &Vertex::Account(a), None, None).unwrap();
        assert_eq!(report.flow_value, 100_000);
        assert_eq!(report.paths[0].accounts, vec![a, a]);
        assert!(report.edge_flows.is_empty());
        assert!(report
            .raw_edge_flows
            .keys()
            .all(|(u, v)| backend.network().capacity(u, v).is_some()));
        assert_eq!(report.raw_edge_flows[&(Vertex::Account(a), Vertex::holding(a, a))], 100_000);

        let clipped = analysis
            .analyze_flow(&Vertex::Account(a), &Vertex::Account(a), None, Some(10))
            .unwrap();
        assert_eq!(clipped.flow_value, 10);
    }

    #[test]
    fn test_simplify_edge_flows_skips_non_transfers() {
        let mut raw = EdgeFlows::new();
        raw.insert((Vertex::Account(0), Vertex::holding(0, 3)), 9);
        raw.insert((Vertex::holding(0, 3), Vertex::Account(1)), 5);
        raw.insert((Vertex::holding(0, 3), Vertex::Account(2)), 4);
        raw.insert((Vertex::holding(2, 3), Vertex::VirtualSink(0)), 4);

        let simplified = simplify_edge_flows(&raw);
        assert_eq!(simplified.len(), 2);
        assert_eq!(simplified[&(0, 1)][&3], 5);
        assert_eq!(simplified[&(0, 2)][&3], 4);
    }

    /// Knows the graph but every solve fails
    struct BrokenSolver {
        network: CapacityNetwork,
    }

    impl GraphBackend for BrokenSolver {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn network(&self) -> &CapacityNetwork {
            &self.network
        }

        fn compute_flow_in(
            &self,
            _view: &GraphView<'_>,
            _source: &Vertex,
            sink: &Vertex,
            _algorithm: Option<FlowAlgorithm>,
            _cutoff: Option<Capacity>,
        ) -> std::result::Result<(Capacity, FlowDict), SolverError> {
            Err(SolverError::MissingVertex(*sink))
        }
    }

    #[test]
    fn test_solver_failure_yields_empty_report() {
        let loader = chain();
        let (a, b, c) = (id(&loader, "0xa"), id(&loader, "0xb"), id(&loader, "0xc"));
        let network = CapacityNetwork::from_edges(&loader.edges, &loader.capacities, &loader.tokens);
        let backend = BrokenSolver { network };
        let analysis = FlowAnalysis::new(&backend);

        let flow = analysis
            .analyze_flow(&Vertex::Account(a), &Vertex::Account(c), None, None)
            .unwrap();
        assert_eq!(flow, FlowReport::default());

        let arbitrage = analysis.analyze_arbitrage(b, b, a, None, None).unwrap();
        assert_eq!(arbitrage, FlowReport::default());
    }
}
