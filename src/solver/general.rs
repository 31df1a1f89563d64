//! General-purpose backend
//!
//! Runs the requested algorithm over the full visible network. Preflow-push
//! is the default; Edmonds-Karp and Dinic are available for comparison.

use tracing::{debug, trace};

use crate::cartographer::{Capacity, CapacityNetwork, Vertex};
use crate::error::SolverError;

use super::augmenting::{dinic, edmonds_karp};
use super::push_relabel::preflow_push;
use super::residual::ResidualNetwork;
use super::{check_endpoints, FlowAlgorithm, FlowDict, GraphBackend, GraphView};

pub struct GeneralBackend {
    network: CapacityNetwork,
}

impl GeneralBackend {
    pub fn new(network: CapacityNetwork) -> Self {
        Self { network }
    }
}

impl GraphBackend for GeneralBackend {
    fn name(&self) -> &'static str {
        "general"
    }

    fn network(&self) -> &CapacityNetwork {
        &self.network
    }

    fn compute_flow_in(
        &self,
        view: &GraphView<'_>,
        source: &Vertex,
        sink: &Vertex,
        algorithm: Option<FlowAlgorithm>,
        cutoff: Option<Capacity>,
    ) -> Result<(Capacity, FlowDict), SolverError> {
        check_endpoints(view, source, sink)?;

        let algorithm = algorithm.unwrap_or(FlowAlgorithm::PreflowPush);
        let mut net = ResidualNetwork::from_edges(view.edges());
        let s = net.ensure_node(*source);
        let t = net.ensure_node(*sink);

        let value = match algorithm {
            FlowAlgorithm::PreflowPush => match cutoff {
                Some(limit) => {
                    let origin = net.add_supply_cap(s, limit);
                    preflow_push(&mut net, origin, t)
                }
                None => preflow_push(&mut net, s, t),
            },
            FlowAlgorithm::EdmondsKarp => edmonds_karp(&mut net, s, t, cutoff),
            FlowAlgorithm::Dinic => dinic(&mut net, s, t, cutoff, false),
        };

        let canceled = net.cancel_cycles();
        trace!("{} canceled {} circulations", algorithm, canceled);
        debug!(
            "Flow {} -> {} via {}: {} (cutoff {:?})",
            source, sink, algorithm, value, cutoff
        );

        Ok((value, net.into_flow_dict()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(id: u32) -> Vertex {
        Vertex::Account(id)
    }

    /// Two disjoint routes 0 -> 3 plus a loop 1 -> 2 -> 1 that can carry
    /// circulating flow
    fn backend() -> GeneralBackend {
        let edges = vec![(v(0), v(1)), (v(1), v(3)), (v(0), v(2)), (v(2), v(3)), (v(1), v(2)), (v(2), v(1))];
        let caps = [5, 5, 4, 4, 3, 3];
        GeneralBackend::new(CapacityNetwork::from_edges(&edges, &caps, &[0; 6]))
    }

    #[test]
    fn test_all_algorithms_reach_max() {
        let backend = backend();
        for algorithm in [FlowAlgorithm::PreflowPush, FlowAlgorithm::EdmondsKarp, FlowAlgorithm::Dinic] {
            let (value, flow) = backend.compute_flow(&v(0), &v(3), Some(algorithm), None).unwrap();
            assert_eq!(value, 9, "{}", algorithm);

            let into_sink: Capacity = flow.values().filter_map(|out| out.get(&v(3))).sum();
            assert_eq!(into_sink, 9);
        }
    }

    #[test]
    fn test_flow_is_acyclic() {
        let backend = backend();
        let (_, flow) = backend.compute_flow(&v(0), &v(3), None, None).unwrap();
        let forward = flow.get(&v(1)).and_then(|out| out.get(&v(2))).copied().unwrap_or(0);
        let backward = flow.get(&v(2)).and_then(|out| out.get(&v(1))).copied().unwrap_or(0);
        assert!(forward == 0 || backward == 0);
    }

    #[test]
    fn test_conservation_under_cutoff() {
        let backend = backend();
        let (value, flow) = backend.compute_flow(&v(0), &v(3), None, Some(6)).unwrap();
        assert_eq!(value, 6);

        for node in [v(1), v(2)] {
            let inflow: Capacity = flow.values().filter_map(|out| out.get(&node)).sum();
            let outflow: Capacity = flow.get(&node).map(|out| out.values().sum()).unwrap_or(0);
            assert_eq!(inflow, outflow);
        }
        let out_of_source: Capacity = flow[&v(0)].values().sum();
        assert_eq!(out_of_source, 6);
    }
}
