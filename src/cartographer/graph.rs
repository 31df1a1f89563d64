//! Capacity Network
//!
//! Step 1.2: The Map Maker
//!
//! Every trust-mediated transfer is split into two hops through an
//! intermediate "holding" vertex:
//!
//! holder -[balance]-> (holder, token) -[balance]-> truster
//!
//! The first hop is capped by the holder's balance of `token`; the second
//! exists once per account that trusts `token`, with the same cap.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Dense internal id of an account (tokens are identified by their issuing account)
pub type AccountId = u32;

/// Edge capacity in thousandths of a token
pub type Capacity = u64;

/// A vertex of the flow network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Vertex {
    /// A real account
    Account(AccountId),

    /// Balance of `token` held by `holder`, ready to flow to anyone trusting `token`
    Holding { holder: AccountId, token: AccountId },

    /// Arbitrage-only sink for the cycle starting at the given account.
    /// Never part of a base graph.
    VirtualSink(AccountId),
}

impl Vertex {
    pub fn holding(holder: AccountId, token: AccountId) -> Self {
        Vertex::Holding { holder, token }
    }

    pub fn is_intermediate(&self) -> bool {
        matches!(self, Vertex::Holding { .. })
    }

    pub fn is_synthetic(&self) -> bool {
        matches!(self, Vertex::VirtualSink(_))
    }

    /// The real account behind this vertex
    pub fn account(&self) -> AccountId {
        match *self {
            Vertex::Account(id) => id,
            Vertex::Holding { holder, .. } => holder,
            Vertex::VirtualSink(start) => start,
        }
    }

    pub fn token(&self) -> Option<AccountId> {
        match *self {
            Vertex::Holding { token, .. } => Some(token),
            _ => None,
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vertex::Account(id) => write!(f, "{}", id),
            Vertex::Holding { holder, token } => write!(f, "{}_{}", holder, token),
            Vertex::VirtualSink(start) => write!(f, "virtual_sink_{}", start),
        }
    }
}

/// Token moved along the hop `from -> to`.
///
/// Every hop touches exactly one holding vertex except account-to-account
/// hops, which do not occur in an ingested network.
pub fn hop_token(from: &Vertex, to: &Vertex) -> Option<AccountId> {
    from.token().or_else(|| to.token())
}

/// Edge data in the capacity network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeData {
    pub capacity: Capacity,
    pub token: AccountId,
}

/// The capacity network for one snapshot
#[derive(Debug, Clone, Default)]
pub struct CapacityNetwork {
    pub graph: DiGraph<Vertex, EdgeData>,
    vertex_to_node: HashMap<Vertex, NodeIndex>,
}

impl CapacityNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the parallel edge lists produced by ingestion
    pub fn from_edges(
        edges: &[(Vertex, Vertex)],
        capacities: &[Capacity],
        tokens: &[AccountId],
    ) -> Self {
        let mut network = Self::new();
        let mut merged = 0usize;

        for ((&(from, to), &capacity), &token) in edges.iter().zip(capacities).zip(tokens) {
            if !network.add_edge(from, to, capacity, token) {
                merged += 1;
            }
        }

        info!(
            "Graph built: {} Nodes, {} Edges",
            network.node_count(),
            network.edge_count()
        );
        if merged > 0 {
            debug!("  Merged {} duplicate edges (kept max capacity)", merged);
        }

        network
    }

    /// Add an edge. Returns false if `(from, to)` already existed, in which
    /// case the larger of the two capacities is kept.
    pub fn add_edge(&mut self, from: Vertex, to: Vertex, capacity: Capacity, token: AccountId) -> bool {
        let a = self.get_or_create_node(from);
        let b = self.get_or_create_node(to);

        if let Some(existing) = self.graph.find_edge(a, b) {
            let data = &mut self.graph[existing];
            data.capacity = data.capacity.max(capacity);
            return false;
        }

        self.graph.add_edge(a, b, EdgeData { capacity, token });
        true
    }

    fn get_or_create_node(&mut self, vertex: Vertex) -> NodeIndex {
        if let Some(&node) = self.vertex_to_node.get(&vertex) {
            return node;
        }

        let node = self.graph.add_node(vertex);
        self.vertex_to_node.insert(vertex, node);
        node
    }

    pub fn get_node(&self, vertex: &Vertex) -> Option<NodeIndex> {
        self.vertex_to_node.get(vertex).copied()
    }

    pub fn get_vertex(&self, node: NodeIndex) -> Option<Vertex> {
        self.graph.node_weight(node).copied()
    }

    pub fn has_vertex(&self, vertex: &Vertex) -> bool {
        self.vertex_to_node.contains_key(vertex)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn vertices(&self) -> impl Iterator<Item = Vertex> + '_ {
        self.graph.node_weights().copied()
    }

    /// All edges as `(from, to, data)`
    pub fn edges(&self) -> impl Iterator<Item = (Vertex, Vertex, EdgeData)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()], self.graph[e.target()], *e.weight()))
    }

    /// Outgoing edges of a vertex (empty if the vertex is unknown)
    pub fn out_edges(&self, vertex: &Vertex) -> Vec<(Vertex, EdgeData)> {
        self.neighbors(vertex, Direction::Outgoing)
    }

    /// Incoming edges of a vertex (empty if the vertex is unknown)
    pub fn in_edges(&self, vertex: &Vertex) -> Vec<(Vertex, EdgeData)> {
        self.neighbors(vertex, Direction::Incoming)
    }

    fn neighbors(&self, vertex: &Vertex, direction: Direction) -> Vec<(Vertex, EdgeData)> {
        let Some(node) = self.get_node(vertex) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(node, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (self.graph[other], *e.weight())
            })
            .collect()
    }

    pub fn capacity(&self, from: &Vertex, to: &Vertex) -> Option<Capacity> {
        let a = self.get_node(from)?;
        let b = self.get_node(to)?;
        self.graph.find_edge(a, b).map(|e| self.graph[e].capacity)
    }
}
