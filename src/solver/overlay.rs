//! Arbitrage Overlay
//!
//! Cycle detection is turned into an ordinary source -> sink flow problem by
//! adding a virtual sink fed from every holding of the end token that can
//! actually be sent back to the start account. The base
//! network is never touched: the overlay carries only the synthetic edges and
//! the first-hop restriction, and is discarded after the query.

use std::collections::BTreeMap;
use tracing::{debug, trace};

use crate::cartographer::{AccountId, Capacity, CapacityNetwork, Vertex};

use super::FlowDict;

/// Synthetic structure for one arbitrage query
#[derive(Debug)]
pub struct ArbitrageOverlay {
    start: AccountId,
    first_hop: Vertex,
    synthetic_edges: Vec<(Vertex, Vertex, Capacity)>,
    base_vertices: usize,
    base_edges: usize,
}

impl ArbitrageOverlay {
    /// Build the overlay for a cycle `start -[start_token]-> ... -[end_token]-> start`.
    ///
    /// The sink is fed by every `(holder, end_token)` vertex with
    /// `holder != start` that has a real edge into `start`, capped by that
    /// edge's capacity. Holdings the start account does not accept cannot
    /// close a cycle and feed nothing. The start account may only leave
    /// through its own `start_token` holding. A same-token round trip feeds
    /// nothing.
    pub fn build(
        network: &CapacityNetwork,
        start: AccountId,
        start_token: AccountId,
        end_token: AccountId,
    ) -> Self {
        let sink = Vertex::VirtualSink(start);
        let mut synthetic_edges = Vec::new();

        if start_token == end_token {
            debug!("Same-token round trip from {}: no price difference to capture", start);
        } else {
            for (from, data) in network.in_edges(&Vertex::Account(start)) {
                let Vertex::Holding { holder, token } = from else {
                    continue;
                };
                if token == end_token && holder != start {
                    synthetic_edges.push((from, sink, data.capacity));
                }
            }
            synthetic_edges.sort_unstable();
        }

        debug!(
            "Arbitrage overlay for {}: {} sink feeds for token {}",
            start,
            synthetic_edges.len(),
            end_token
        );

        Self {
            start,
            first_hop: Vertex::holding(start, start_token),
            synthetic_edges,
            base_vertices: network.node_count(),
            base_edges: network.edge_count(),
        }
    }

    pub fn start(&self) -> AccountId {
        self.start
    }

    pub fn source(&self) -> Vertex {
        Vertex::Account(self.start)
    }

    pub fn sink(&self) -> Vertex {
        Vertex::VirtualSink(self.start)
    }

    pub fn synthetic_edges(&self) -> &[(Vertex, Vertex, Capacity)] {
        &self.synthetic_edges
    }

    /// Vertex and edge counts of the base network when the overlay was built
    pub fn base_counts(&self) -> (usize, usize) {
        (self.base_vertices, self.base_edges)
    }

    /// Whether a base edge is visible through the overlay
    pub fn allows(&self, from: &Vertex, to: &Vertex) -> bool {
        *from != self.source() || *to == self.first_hop
    }
}

impl Drop for ArbitrageOverlay {
    fn drop(&mut self) {
        trace!("Released arbitrage overlay for {}", self.start);
    }
}

/// Map flow into the virtual sink back onto real edges closing at `start`.
///
/// `(holder, end_token) -> sink` becomes `(holder, end_token) -> start`.
/// The re-routed total never exceeds `cutoff`.
pub fn interpret_flow(
    flow: &FlowDict,
    start: AccountId,
    sink: &Vertex,
    cutoff: Option<Capacity>,
) -> FlowDict {
    let target = Vertex::Account(start);
    let ordered: BTreeMap<&Vertex, BTreeMap<&Vertex, &Capacity>> = flow
        .iter()
        .map(|(u, out)| (u, out.iter().collect()))
        .collect();

    let mut real = FlowDict::new();
    let mut rerouted: Capacity = 0;

    for (u, out) in ordered {
        for (v, &amount) in out {
            if v == sink {
                let allowed = match cutoff {
                    Some(limit) => amount.min(limit.saturating_sub(rerouted)),
                    None => amount,
                };
                if allowed == 0 {
                    continue;
                }
                rerouted += allowed;
                *real.entry(*u).or_default().entry(target).or_default() += allowed;
            } else {
                *real.entry(*u).or_default().entry(*v).or_default() += amount;
            }
        }
    }

    real
}

/// Base network plus an optional arbitrage overlay
#[derive(Debug, Clone, Copy)]
pub struct GraphView<'a> {
    base: &'a CapacityNetwork,
    overlay: Option<&'a ArbitrageOverlay>,
}

impl<'a> GraphView<'a> {
    pub fn base(network: &'a CapacityNetwork) -> Self {
        Self { base: network, overlay: None }
    }

    pub fn with_overlay(network: &'a CapacityNetwork, overlay: &'a ArbitrageOverlay) -> Self {
        Self { base: network, overlay: Some(overlay) }
    }

    pub fn has_vertex(&self, vertex: &Vertex) -> bool {
        self.base.has_vertex(vertex) || self.overlay.is_some_and(|o| o.sink() == *vertex)
    }

    /// All visible edges as `(from, to, capacity)`
    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex, Capacity)> + 'a {
        let overlay = self.overlay;
        let synthetic: &'a [(Vertex, Vertex, Capacity)] =
            overlay.map(|o| o.synthetic_edges()).unwrap_or(&[]);

        self.base
            .edges()
            .filter(move |(from, to, _)| overlay.map_or(true, |o| o.allows(from, to)))
            .map(|(from, to, data)| (from, to, data.capacity))
            .chain(synthetic.iter().copied())
    }
}
