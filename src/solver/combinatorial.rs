//! Combinatorial backend
//!
//! Trims the visible network to edges that can lie on a source -> sink path,
//! packs them into a flat arc array and runs capacity-scaling Dinic. The
//! algorithm argument is accepted for interface parity and ignored.

use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::cartographer::{Capacity, CapacityNetwork, Vertex};
use crate::error::SolverError;

use super::augmenting::dinic;
use super::residual::ResidualNetwork;
use super::{check_endpoints, FlowAlgorithm, FlowDict, GraphBackend, GraphView};

pub struct CombinatorialBackend {
    network: CapacityNetwork,
}

impl CombinatorialBackend {
    pub fn new(network: CapacityNetwork) -> Self {
        Self { network }
    }
}

impl GraphBackend for CombinatorialBackend {
    fn name(&self) -> &'static str {
        "combinatorial"
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
        if let Some(algorithm) = algorithm {
            debug!("{} backend ignores requested algorithm {}", self.name(), algorithm);
        }

        let edges: Vec<(Vertex, Vertex, Capacity)> = view.edges().filter(|e| e.2 > 0).collect();
        let pruned = prune(&edges, source, sink);
        debug!(
            "Pruned {} -> {} edges for {} -> {}",
            edges.len(),
            pruned.len(),
            source,
            sink
        );

        let mut net = ResidualNetwork::from_edges(pruned);
        let s = net.ensure_node(*source);
        let t = net.ensure_node(*sink);

        let value = dinic(&mut net, s, t, cutoff, true);
        net.cancel_cycles();

        Ok((value, net.into_flow_dict()))
    }
}

/// Keep edges `(u, v)` with `u` reachable from `source` and `v` able to reach `sink`
fn prune(edges: &[(Vertex, Vertex, Capacity)], source: &Vertex, sink: &Vertex) -> Vec<(Vertex, Vertex, Capacity)> {
    let mut forward: HashMap<Vertex, Vec<Vertex>> = HashMap::new();
    let mut backward: HashMap<Vertex, Vec<Vertex>> = HashMap::new();
    for &(u, v, _) in edges {
        forward.entry(u).or_default().push(v);
        backward.entry(v).or_default().push(u);
    }

    let reachable = flood(&forward, *source);
    let coreachable = flood(&backward, *sink);

    edges
        .iter()
        .filter(|(u, v, _)| reachable.contains(u) && coreachable.contains(v))
        .copied()
        .collect()
}

fn flood(adjacency: &HashMap<Vertex, Vec<Vertex>>, start: Vertex) -> HashSet<Vertex> {
    let mut seen = HashSet::from([start]);
    let mut queue = VecDeque::from([start]);

    while let Some(u) = queue.pop_front() {
        for &v in adjacency.get(&u).into_iter().flatten() {
            if seen.insert(v) {
                queue.push_back(v);
            }
        }
    }

    seen
}
