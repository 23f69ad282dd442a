//! A generic directed graph with dense-index adjacency lookup.
//!
//! The graph carries no domain knowledge; nodes and edges are arbitrary
//! payloads keyed by caller-assigned ids. Construction is two-phase:
//! a [`GraphBuilder`] accumulates mutations, and [`GraphBuilder::build`]
//! freezes them into an immutable [`Graph`]. A built graph is never
//! patched; any topology change means building a new graph.

use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Unique ID of a graph node. Opaque; supports equality and ordering only.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(u64);

/// Unique ID of a graph edge. Opaque; supports equality and ordering only.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeId(u64);

impl NodeId {
    /// Creates a node ID from its raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl EdgeId {
    /// Creates an edge ID from its raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node {}", self.0)
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge {}", self.0)
    }
}

/// A directed edge between two nodes, carrying a payload.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Edge<E> {
    source: NodeId,
    target: NodeId,
    payload: E,
}

impl<E> Edge<E> {
    /// The node this edge is sourced at.
    pub fn source(&self) -> NodeId {
        self.source
    }

    /// The node this edge points to.
    pub fn target(&self) -> NodeId {
        self.target
    }

    /// The edge's payload.
    pub fn payload(&self) -> &E {
        &self.payload
    }
}

/// A frozen directed graph.
///
/// Each node is assigned a dense index in ascending id order,
/// so indices are reproducible across runs for the same node set.
/// The adjacency matrix is keyed by `(source_index, target_index)`
/// and holds at most one edge per ordered node pair.
#[derive(Clone, Debug, Default)]
pub struct Graph<N, E> {
    /// The nodes, keyed by id.
    nodes: BTreeMap<NodeId, N>,
    /// The edges, keyed by id.
    edges: BTreeMap<EdgeId, Edge<E>>,
    /// The dense index of each node.
    index: BTreeMap<NodeId, usize>,
    /// Row-major adjacency matrix of optional edge ids.
    adjacency: Vec<Option<EdgeId>>,
}

impl<N, E> Graph<N, E> {
    /// The number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Gets the node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(&id)
    }

    /// Gets the edge with the given id.
    pub fn edge(&self, id: EdgeId) -> Option<&Edge<E>> {
        self.edges.get(&id)
    }

    /// Iterates over all nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &N)> {
        self.nodes.iter().map(|(id, n)| (*id, n))
    }

    /// Iterates over all edges in ascending id order.
    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.edges.iter().map(|(id, e)| (*id, e))
    }

    /// Gets the dense index assigned to a node.
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Looks up the edge between two dense node indices in O(1).
    pub fn adjacency(&self, source: usize, target: usize) -> Option<EdgeId> {
        let n = self.nodes.len();
        if source < n && target < n {
            self.adjacency[source * n + target]
        } else {
            None
        }
    }

    /// Looks up the edge between two nodes, if both exist.
    pub fn edge_between(&self, source: NodeId, target: NodeId) -> Option<EdgeId> {
        let src = self.index_of(source)?;
        let dst = self.index_of(target)?;
        self.adjacency(src, dst)
    }

    /// Iterates over the edges sourced at a node, in ascending edge id order.
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.edges().filter(move |(_, e)| e.source == id)
    }

    /// Iterates over the edges targeting a node, in ascending edge id order.
    pub fn edges_into(&self, id: NodeId) -> impl Iterator<Item = (EdgeId, &Edge<E>)> {
        self.edges().filter(move |(_, e)| e.target == id)
    }
}

/// Accumulates nodes and edges, then freezes them into a [`Graph`].
#[derive(Clone, Debug)]
pub struct GraphBuilder<N, E> {
    nodes: BTreeMap<NodeId, N>,
    edges: BTreeMap<EdgeId, Edge<E>>,
}

impl<N, E> Default for GraphBuilder<N, E> {
    fn default() -> Self {
        Self {
            nodes: BTreeMap::new(),
            edges: BTreeMap::new(),
        }
    }
}

impl<N, E> GraphBuilder<N, E> {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a node to the graph. A duplicate id replaces the previous node.
    pub fn add_vertex(&mut self, id: NodeId, node: N) -> &mut Self {
        self.nodes.insert(id, node);
        self
    }

    /// Adds a directed edge to the graph. A duplicate id replaces the previous edge.
    pub fn add_edge(&mut self, id: EdgeId, source: NodeId, target: NodeId, payload: E) -> &mut Self {
        self.edges.insert(
            id,
            Edge {
                source,
                target,
                payload,
            },
        );
        self
    }

    /// Freezes the accumulated nodes and edges into a [`Graph`].
    ///
    /// Dense indices are assigned in ascending node id order. Edges that
    /// reference a node id absent from the node set are dropped with a
    /// warning rather than failing the build. When several edges share an
    /// ordered `(source, target)` pair, the one with the highest id wins
    /// and the others are dropped.
    ///
    /// Runs in O(V + E + V²).
    pub fn build(self) -> Graph<N, E> {
        let index: BTreeMap<NodeId, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(idx, id)| (*id, idx))
            .collect();

        let n = index.len();
        let mut adjacency = vec![None; n * n];
        let mut edges = BTreeMap::new();

        for (id, edge) in self.edges {
            let (src, dst) = match (index.get(&edge.source), index.get(&edge.target)) {
                (Some(src), Some(dst)) => (*src, *dst),
                _ => {
                    log::warn!("dropping {id}: references a node not in the graph");
                    continue;
                }
            };
            let cell = &mut adjacency[src * n + dst];
            if let Some(prev) = cell.replace(id) {
                log::warn!("dropping {prev}: superseded between the same node pair");
                edges.remove(&prev);
            }
            edges.insert(id, edge);
        }

        Graph {
            nodes: self.nodes,
            edges,
            index,
            adjacency,
        }
    }
}
