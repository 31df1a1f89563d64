//! Residual network shared by the max-flow algorithms.
//!
//! Arcs are stored in pairs: arc `2k` is the forward arc of the k-th edge and
//! `2k + 1` its reverse. A node without a vertex label (index past
//! `vertices.len()`) is solver-internal and never shows up in a flow dict.

use std::collections::HashMap;
use tracing::trace;

use crate::cartographer::{Capacity, Vertex};

use super::FlowDict;

#[derive(Debug, Default)]
pub(crate) struct ResidualNetwork {
    vertices: Vec<Vertex>,
    index: HashMap<Vertex, usize>,
    pub(crate) adj: Vec<Vec<usize>>,
    pub(crate) head: Vec<usize>,
    pub(crate) tail: Vec<usize>,
    pub(crate) residual: Vec<Capacity>,
    capacity: Vec<Capacity>,
    internal_nodes: usize,
}

impl ResidualNetwork {
    /// Build from `(from, to, capacity)` triples. Zero-capacity edges are dropped.
    pub(crate) fn from_edges(edges: impl IntoIterator<Item = (Vertex, Vertex, Capacity)>) -> Self {
        let mut network = Self::default();
        for (from, to, capacity) in edges {
            if capacity == 0 {
                continue;
            }
            let a = network.ensure_node(from);
            let b = network.ensure_node(to);
            network.add_arc(a, b, capacity);
        }
        network
    }

    pub(crate) fn ensure_node(&mut self, vertex: Vertex) -> usize {
        if let Some(&node) = self.index.get(&vertex) {
            return node;
        }
        debug_assert_eq!(self.internal_nodes, 0, "labelled nodes must precede internal ones");
        let node = self.adj.len();
        self.vertices.push(vertex);
        self.index.insert(vertex, node);
        self.adj.push(Vec::new());
        node
    }

    pub(crate) fn node(&self, vertex: &Vertex) -> Option<usize> {
        self.index.get(vertex).copied()
    }

    pub(crate) fn node_count(&self) -> usize {
        self.adj.len()
    }

    fn add_arc(&mut self, from: usize, to: usize, capacity: Capacity) -> usize {
        let arc = self.head.len();

        self.head.push(to);
        self.tail.push(from);
        self.residual.push(capacity);
        self.capacity.push(capacity);
        self.adj[from].push(arc);

        self.head.push(from);
        self.tail.push(to);
        self.residual.push(0);
        self.capacity.push(0);
        self.adj[to].push(arc + 1);

        arc
    }

    /// Add an unlabelled super-source whose only arc feeds `source` with
    /// `supply`. Running a solver from it bounds the total flow by `supply`.
    pub(crate) fn add_supply_cap(&mut self, source: usize, supply: Capacity) -> usize {
        let node = self.adj.len();
        self.adj.push(Vec::new());
        self.internal_nodes += 1;
        self.add_arc(node, source, supply);
        node
    }

    pub(crate) fn push(&mut self, arc: usize, amount: Capacity) {
        self.residual[arc] -= amount;
        self.residual[arc ^ 1] += amount;
    }

    /// Flow currently carried by a forward arc
    pub(crate) fn flow_on(&self, arc: usize) -> Capacity {
        if arc & 1 == 1 {
            return 0;
        }
        self.capacity[arc] - self.residual[arc]
    }

    pub(crate) fn max_capacity(&self) -> Capacity {
        self.capacity.iter().copied().max().unwrap_or(0)
    }

    /// Remove every circulation from the current flow.
    ///
    /// Circulations add nothing to the flow value but break path
    /// decomposition; afterwards every unit of flow lies on a source-sink path.
    pub(crate) fn cancel_cycles(&mut self) -> usize {
        let mut canceled = 0;

        while let Some(cycle) = self.find_flow_cycle() {
            let amount = cycle.iter().map(|&arc| self.flow_on(arc)).min().unwrap_or(0);
            if amount == 0 {
                break;
            }
            for &arc in &cycle {
                self.push(arc ^ 1, amount);
            }
            canceled += 1;
        }

        if canceled > 0 {
            trace!("Canceled {} flow cycles", canceled);
        }
        canceled
    }

    /// Iterative DFS over arcs carrying flow; returns the arcs of one cycle
    fn find_flow_cycle(&self) -> Option<Vec<usize>> {
        const UNSEEN: u8 = 0;
        const ON_STACK: u8 = 1;
        const DONE: u8 = 2;

        let n = self.node_count();
        let mut state = vec![UNSEEN; n];
        let mut next_arc = vec![0usize; n];
        let mut node_stack: Vec<usize> = Vec::new();
        let mut arc_stack: Vec<usize> = Vec::new();

        for root in 0..n {
            if state[root] != UNSEEN {
                continue;
            }
            state[root] = ON_STACK;
            node_stack.push(root);

            while let Some(&u) = node_stack.last() {
                if next_arc[u] == self.adj[u].len() {
                    state[u] = DONE;
                    node_stack.pop();
                    arc_stack.pop();
                    continue;
                }

                let arc = self.adj[u][next_arc[u]];
                next_arc[u] += 1;
                if self.flow_on(arc) == 0 {
                    continue;
                }

                let v = self.head[arc];
                match state[v] {
                    UNSEEN => {
                        state[v] = ON_STACK;
                        node_stack.push(v);
                        arc_stack.push(arc);
                    }
                    ON_STACK => {
                        let position = node_stack.iter().position(|&x| x == v)?;
                        let mut cycle = arc_stack[position..].to_vec();
                        cycle.push(arc);
                        return Some(cycle);
                    }
                    _ => {}
                }
            }
        }

        None
    }

    /// Positive flow on labelled edges
    pub(crate) fn into_flow_dict(self) -> FlowDict {
        let labelled = self.vertices.len();
        let mut flow = FlowDict::new();

        for arc in (0..self.head.len()).step_by(2) {
            let amount = self.flow_on(arc);
            let (from, to) = (self.tail[arc], self.head[arc]);
            if amount == 0 || from >= labelled || to >= labelled {
                continue;
            }
            *flow
                .entry(self.vertices[from])
                .or_default()
                .entry(self.vertices[to])
                .or_default() += amount;
        }

        flow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_cancellation() {
        let a = Vertex::Account(0);
        let b = Vertex::Account(1);
        let c = Vertex::Account(2);
        let mut net = ResidualNetwork::from_edges([(a, b, 5), (b, c, 5), (c, a, 5)]);

        // push 3 units around a -> b -> c -> a
        for arc in [0, 2, 4] {
            net.push(arc, 3);
        }
        assert_eq!(net.cancel_cycles(), 1);
        assert!(net.into_flow_dict().is_empty());
    }

    #[test]
    fn test_supply_cap_hidden_from_flow_dict() {
        let a = Vertex::Account(0);
        let b = Vertex::Account(1);
        let mut net = ResidualNetwork::from_edges([(a, b, 5), (a, b, 0)]);
        assert_eq!(net.head.len(), 2);

        let source = net.node(&a).unwrap();
        let origin = net.add_supply_cap(source, 2);
        let feed = net.adj[origin][0];
        net.push(feed, 2);
        net.push(0, 2);

        let flow = net.into_flow_dict();
        assert_eq!(flow.len(), 1);
        assert_eq!(flow[&a][&b], 2);
    }
}
