//! Arbitrage cycle analysis
//!
//! Step 3.2: The Loop Finder
//!
//! A cycle `start -[start_token]-> ... -[end_token]-> start` is searched as
//! ordinary flow from `start` into a virtual sink fed by every foreign
//! holding of `end_token` that `start` accepts. Each flow path is then closed
//! back onto `start` over that real edge.

use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::cartographer::{hop_token, AccountId, Capacity, Vertex};
use crate::error::{PathfinderError, Result};
use crate::solver::{ArbitrageOverlay, EdgeFlows, FlowAlgorithm, FlowDict, FlowPath, GraphView};

use super::flow::{FlowAnalysis, FlowReport};

impl<'a> FlowAnalysis<'a> {
    /// Largest extractable round trip from `start` leaving with `start_token`
    /// and returning with `end_token`.
    ///
    /// An unknown start account is an error; "no opportunity" and solver
    /// failures are an empty report. The overlay is released on every path.
    pub fn analyze_arbitrage(
        &self,
        start: AccountId,
        start_token: AccountId,
        end_token: AccountId,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<FlowReport> {
        let source = Vertex::Account(start);
        if !self.backend.has_vertex(&source) {
            return Err(PathfinderError::UnknownVertex(source));
        }

        let overlay = self.backend.prepare_arbitrage_graph(start, start_token, end_token);
        let report = self.run_arbitrage(&overlay, algorithm, cutoff);

        // A cleanup failure must not discard a computed result
        if let Err(e) = self.backend.cleanup_arbitrage_graph(overlay) {
            warn!("{}", e);
        }

        info!(
            "Arbitrage {} [{} -> {}]: {} via {} paths",
            start,
            start_token,
            end_token,
            report.flow_value,
            report.paths.len()
        );
        Ok(report)
    }

    fn run_arbitrage(
        &self,
        overlay: &ArbitrageOverlay,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> FlowReport {
        let source = overlay.source();
        let sink = overlay.sink();
        let view = GraphView::with_overlay(self.backend.network(), overlay);

        let (flow_value, flow) = match self.backend.compute_flow_in(&view, &source, &sink, algorithm, cutoff) {
            Ok(result) => result,
            Err(e) => {
                warn!("Arbitrage flow from {} failed: {}", source, e);
                return FlowReport::default();
            }
        };
        if flow_value == 0 {
            return FlowReport::default();
        }
        debug!("Arbitrage max flow from {}: {}", source, flow_value);

        let real_flow = self.backend.interpret_arbitrage_flow(&flow, overlay.start(), &sink, cutoff);
        let closing: Capacity = real_flow.values().filter_map(|out| out.get(&source)).sum();
        debug!("{} units close back onto {}", closing, source);

        let mut paths = Vec::new();
        let mut raw_edge_flows = EdgeFlows::new();
        let mut total: Capacity = 0;

        for (mut nodes, amount) in find_all_flow_paths(&flow, &source, &sink) {
            let allowance = cutoff.map_or(Capacity::MAX, |c| c.saturating_sub(total));
            let amount = amount.min(allowance);
            if amount == 0 {
                break;
            }

            // (holder, end_token) -> sink becomes the base edge (holder, end_token) -> start
            if let Some(last) = nodes.last_mut() {
                *last = source;
            }
            for hop in nodes.windows(2) {
                *raw_edge_flows.entry((hop[0], hop[1])).or_default() += amount;
            }
            let tokens = nodes.windows(2).filter_map(|hop| hop_token(&hop[0], &hop[1])).collect();

            paths.push(FlowPath { nodes, tokens, amount });
            total += amount;
        }

        FlowReport::from_paths(self.backend, total, &paths, raw_edge_flows)
    }
}

/// Repeatedly search the remaining flow for a `source -> sink` path, subtract
/// its bottleneck and continue until none is left.
///
/// Iterative DFS with an explicit stack and a visited set per search.
/// Neighbors are tried in vertex order, so results are deterministic.
pub(crate) fn find_all_flow_paths(flow: &FlowDict, source: &Vertex, sink: &Vertex) -> Vec<(Vec<Vertex>, Capacity)> {
    let mut residual: HashMap<Vertex, BTreeMap<Vertex, Capacity>> = HashMap::new();
    for (u, out) in flow {
        for (v, &f) in out {
            if f > 0 {
                residual.entry(*u).or_default().insert(*v, f);
            }
        }
    }

    let candidates = |residual: &HashMap<Vertex, BTreeMap<Vertex, Capacity>>, node: &Vertex| -> Vec<(Vertex, Capacity)> {
        residual
            .get(node)
            .map(|out| out.iter().rev().map(|(v, f)| (*v, *f)).collect())
            .unwrap_or_default()
    };

    let mut paths = Vec::new();

    loop {
        let mut visited = HashSet::from([*source]);
        let mut stack: Vec<(Vertex, Capacity, Vec<(Vertex, Capacity)>)> =
            vec![(*source, Capacity::MAX, candidates(&residual, source))];
        let mut found: Option<(Vec<Vertex>, Capacity)> = None;

        while let Some((_, reach, pending)) = stack.last_mut() {
            let reach = *reach;
            let Some((next, f)) = pending.pop() else {
                stack.pop();
                continue;
            };
            if f == 0 || !visited.insert(next) {
                continue;
            }

            let bottleneck = reach.min(f);
            if next == *sink {
                let mut nodes: Vec<Vertex> = stack.iter().map(|(node, _, _)| *node).collect();
                nodes.push(next);
                found = Some((nodes, bottleneck));
                break;
            }
            let next_candidates = candidates(&residual, &next);
            stack.push((next, bottleneck, next_candidates));
        }

        let Some((nodes, amount)) = found else {
            break;
        };

        for hop in nodes.windows(2) {
            if let Some(out) = residual.get_mut(&hop[0]) {
                if let Some(f) = out.get_mut(&hop[1]) {
                    *f -= amount;
                    if *f == 0 {
                        out.remove(&hop[1]);
                    }
                }
            }
        }
        paths.push((nodes, amount));
    }

    paths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartographer::{BalanceRecord, GraphLoader, TrustRecord};
    use crate::solver::{create_backend, BackendKind, SimplifiedPath};

    const FIFTY: &str = "50000000000000000000";
    const THIRTY: &str = "30000000000000000000";

    /// S holds 50 S, X trusts S and holds 30 T, S trusts T
    fn round_trip() -> GraphLoader {
        let trusts = vec![TrustRecord::new("0xX", "0xS"), TrustRecord::new("0xS", "0xT")];
        let balances = vec![
            BalanceRecord::new("0xS", "0xS", FIFTY),
            BalanceRecord::new("0xX", "0xT", THIRTY),
        ];
        GraphLoader::new(&trusts, &balances).unwrap()
    }

    fn id(loader: &GraphLoader, address: &str) -> AccountId {
        loader.get_id_for_address(address).unwrap()
    }

    #[test]
    fn test_round_trip_closes_on_start() {
        let loader = round_trip();
        let (s, x, t) = (id(&loader, "0xs"), id(&loader, "0xx"), id(&loader, "0xt"));

        for kind in [BackendKind::General, BackendKind::Combinatorial] {
            let backend = create_backend(kind, &loader);
            let analysis = FlowAnalysis::new(backend.as_ref());
            let report = analysis.analyze_arbitrage(s, s, t, None, None).unwrap();

            assert_eq!(report.flow_value, 30_000);
            assert_eq!(
                report.paths,
                vec![SimplifiedPath { accounts: vec![s, x, s], tokens: vec![s, t], amount: 30_000 }]
            );
            assert_eq!(report.edge_flows[&(x, s)][&t], 30_000);
            assert!(report.raw_edge_flows.keys().all(|(u, v)| !u.is_synthetic() && !v.is_synthetic()));
            assert!(report
                .raw_edge_flows
                .keys()
                .all(|(u, v)| backend.network().capacity(u, v).is_some()));
        }
    }

    #[test]
    fn test_untrusted_end_token_cannot_close() {
        // X trusts S and holds 30 T, but S never trusts T
        let trusts = vec![TrustRecord::new("0xX", "0xS"), TrustRecord::new("0xT", "0xZ")];
        let balances = vec![
            BalanceRecord::new("0xS", "0xS", FIFTY),
            BalanceRecord::new("0xX", "0xT", THIRTY),
        ];
        let loader = GraphLoader::new(&trusts, &balances).unwrap();
        let (s, t) = (id(&loader, "0xs"), id(&loader, "0xt"));

        for kind in [BackendKind::General, BackendKind::Combinatorial] {
            let backend = create_backend(kind, &loader);
            let analysis = FlowAnalysis::new(backend.as_ref());

            let report = analysis.analyze_arbitrage(s, s, t, None, None).unwrap();
            assert!(report.is_empty());
            assert!(report.raw_edge_flows.is_empty());
        }
    }

    #[test]
    fn test_round_trip_respects_cutoff() {
        let loader = round_trip();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());
        let (s, t) = (id(&loader, "0xs"), id(&loader, "0xt"));

        let report = analysis.analyze_arbitrage(s, s, t, None, Some(1_234)).unwrap();
        assert_eq!(report.flow_value, 1_234);
        assert_eq!(report.paths.iter().map(|p| p.amount).sum::<Capacity>(), 1_234);
    }

    #[test]
    fn test_same_token_is_zero_and_leaves_graph_intact() {
        let loader = round_trip();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());
        let s = id(&loader, "0xs");
        let before = (backend.num_vertices(), backend.num_edges());

        let report = analysis.analyze_arbitrage(s, s, s, None, None).unwrap();
        assert!(report.is_empty());
        assert_eq!((backend.num_vertices(), backend.num_edges()), before);

        let t = id(&loader, "0xt");
        analysis.analyze_arbitrage(s, s, t, None, None).unwrap();
        assert_eq!((backend.num_vertices(), backend.num_edges()), before);
        assert!(!backend.has_vertex(&Vertex::VirtualSink(s)));
    }

    #[test]
    fn test_unknown_start() {
        let loader = round_trip();
        let backend = create_backend(BackendKind::General, &loader);
        let analysis = FlowAnalysis::new(backend.as_ref());

        let err = analysis.analyze_arbitrage(99, 0, 1, None, None).unwrap_err();
        assert!(matches!(err, PathfinderError::UnknownVertex(Vertex::Account(99))));
    }

    #[test]
    fn test_find_all_flow_paths_exhausts_flow() {
        let s = Vertex::Account(0);
        let t = Vertex::VirtualSink(0);
        let mut flow = FlowDict::new();
        flow.entry(s).or_default().insert(Vertex::holding(0, 0), 10);
        flow.entry(Vertex::holding(0, 0)).or_default().insert(Vertex::Account(1), 6);
        flow.entry(Vertex::holding(0, 0)).or_default().insert(Vertex::Account(2), 4);
        flow.entry(Vertex::Account(1)).or_default().insert(Vertex::holding(1, 5), 6);
        flow.entry(Vertex::Account(2)).or_default().insert(Vertex::holding(2, 5), 4);
        flow.entry(Vertex::holding(1, 5)).or_default().insert(t, 6);
        flow.entry(Vertex::holding(2, 5)).or_default().insert(t, 4);

        let paths = find_all_flow_paths(&flow, &s, &t);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths.iter().map(|(_, f)| f).sum::<Capacity>(), 10);
        assert!(paths.iter().all(|(nodes, _)| nodes.first() == Some(&s) && nodes.last() == Some(&t)));
    }
}
