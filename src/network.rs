//! The road network domain model built on the generic [`Graph`].
//!
//! An edge of the graph carries exactly one [`Road`] on a directed arc,
//! so multi-lane capacity lives inside one road rather than as parallel
//! edges. Lanes are identified by `(edge, ordinal)` composite keys and
//! junctions are directed lane-to-lane permissions scoped to one node.

use crate::graph::{Edge, EdgeId, Graph, GraphBuilder, NodeId};
use crate::signal::SignalConfig;
use crate::vehicle::DriverProfile;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Classification of a road, coarsest first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RoadClass {
    Motorway,
    Street,
    Residential,
}

/// A directed stretch of road. Immutable once created.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Road {
    /// A human readable label.
    label: String,
    /// The length in m.
    length: f64,
    /// The speed limit in m/s.
    speed_limit: f64,
    /// The road classification.
    class: RoadClass,
    /// The number of lanes.
    lane_count: u8,
}

impl Road {
    /// Creates a new road. `length` is in m, `speed_limit` in m/s.
    pub fn new(
        label: impl Into<String>,
        length: f64,
        speed_limit: f64,
        class: RoadClass,
        lane_count: u8,
    ) -> Self {
        Self {
            label: label.into(),
            length,
            speed_limit,
            class,
            lane_count,
        }
    }

    /// The road's label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The length of the road in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// The road classification.
    pub fn class(&self) -> RoadClass {
        self.class
    }

    /// The number of lanes.
    pub fn lane_count(&self) -> u8 {
        self.lane_count
    }
}

/// The ordinal of a lane within its road. Comparison only, no arithmetic.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneOrd(u8);

impl LaneOrd {
    /// Creates a lane ordinal.
    pub const fn new(ord: u8) -> Self {
        Self(ord)
    }
}

/// Composite key of a lane: the edge carrying its road, plus its ordinal.
///
/// Ordinals of a road with `n` lanes are contiguous `0..n`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaneId {
    pub edge: EdgeId,
    pub ord: LaneOrd,
}

impl LaneId {
    /// Creates a lane id.
    pub const fn new(edge: EdgeId, ord: u8) -> Self {
        Self {
            edge,
            ord: LaneOrd::new(ord),
        }
    }
}

impl fmt::Display for LaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} lane {}", self.edge, self.ord.0)
    }
}

/// A directed permitted path from one lane to another, scoped to one node.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Junction {
    pub from: LaneId,
    pub to: LaneId,
}

impl Junction {
    /// Creates a junction.
    pub const fn new(from: LaneId, to: LaneId) -> Self {
        Self { from, to }
    }
}

/// The control policy governing an intersection's junctions.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ControlPolicy {
    /// Every junction has right of way at all times.
    Uncontrolled,
    /// Every junction must yield to traffic already on its target lane.
    YieldSign,
    /// Every junction must stop at the line, then yield.
    StopSign,
    /// Junction flow states follow a timed signal program.
    TrafficSignal(SignalConfig),
}

/// Attributes of a boundary node that spawns vehicles.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SpawnAttributes {
    /// Expected vehicle arrivals per second.
    pub spawn_rate: f64,
    /// Weighted driver profile distribution. Weights need not sum to one;
    /// an empty distribution means the node never spawns.
    pub profiles: Vec<(DriverProfile, f64)>,
    /// Weighted destination distribution. When empty, destinations are
    /// drawn uniformly from the network's drain and sink nodes.
    pub destinations: Vec<(NodeId, f64)>,
}

/// Attributes of an intersection node.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IntersectionAttributes {
    /// The control policy.
    pub control: ControlPolicy,
    /// The permitted lane-to-lane movements through this node.
    pub junctions: Vec<Junction>,
}

/// A node of the road network.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Node {
    /// A boundary node with outgoing lanes that spawns vehicles.
    Emitter(SpawnAttributes),
    /// A boundary node with incoming lanes that consumes vehicles.
    Drain,
    /// A bidirectional terminus that both spawns and consumes vehicles.
    Sink(SpawnAttributes),
    /// An interior node joining incoming lanes to outgoing lanes.
    Intersection(IntersectionAttributes),
}

impl Node {
    /// The junctions through this node. Empty for non-intersections.
    pub fn junctions(&self) -> &[Junction] {
        match self {
            Node::Intersection(attrs) => &attrs.junctions,
            Node::Emitter(_) | Node::Drain | Node::Sink(_) => &[],
        }
    }

    /// The control policy, for intersections.
    pub fn control(&self) -> Option<&ControlPolicy> {
        match self {
            Node::Intersection(attrs) => Some(&attrs.control),
            Node::Emitter(_) | Node::Drain | Node::Sink(_) => None,
        }
    }

    /// The spawn attributes, for nodes that emit vehicles.
    pub fn spawn(&self) -> Option<&SpawnAttributes> {
        match self {
            Node::Emitter(attrs) | Node::Sink(attrs) => Some(attrs),
            Node::Drain | Node::Intersection(_) => None,
        }
    }

    /// Whether vehicles terminate at this node.
    pub fn drains(&self) -> bool {
        match self {
            Node::Drain | Node::Sink(_) => true,
            Node::Emitter(_) | Node::Intersection(_) => false,
        }
    }

    /// Whether this node is an intersection.
    pub fn is_intersection(&self) -> bool {
        matches!(self, Node::Intersection(_))
    }
}

/// A network description, as produced by the external configuration
/// subsystem: nodes, roads on directed arcs, and the tick duration.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NetworkConfig {
    /// The nodes of the network.
    pub nodes: Vec<(NodeId, Node)>,
    /// The roads of the network, each on a directed arc.
    pub roads: Vec<(EdgeId, NodeId, NodeId, Road)>,
    /// The simulation tick duration in s.
    pub time_step: f64,
}

/// A frozen road network: the generic graph plus lane-level queries.
#[derive(Clone, Debug)]
pub struct RoadGraph {
    graph: Graph<Node, Road>,
}

/// Builds a [`RoadGraph`] from a network description. Pure; performs no I/O.
///
/// Roads referencing a node id absent from the node set are dropped,
/// per the builder's documented policy.
pub fn build_graph(config: &NetworkConfig) -> RoadGraph {
    let mut builder = GraphBuilder::new();
    for (id, node) in &config.nodes {
        builder.add_vertex(*id, node.clone());
    }
    for (id, source, target, road) in &config.roads {
        builder.add_edge(*id, *source, *target, road.clone());
    }
    RoadGraph {
        graph: builder.build(),
    }
}

impl RoadGraph {
    /// The underlying generic graph.
    pub fn graph(&self) -> &Graph<Node, Road> {
        &self.graph
    }

    /// Gets a node by id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.graph.node(id)
    }

    /// Gets the road carried by an edge.
    pub fn road(&self, edge: EdgeId) -> Option<&Road> {
        self.graph.edge(edge).map(|e| e.payload())
    }

    /// Expands an edge into its full lane set, in ascending ordinal order.
    ///
    /// A road with a lane count of zero yields no lanes, which then always
    /// fails topology validation at the adjoining intersections.
    pub fn lanes(&self, edge: EdgeId) -> impl Iterator<Item = LaneId> + '_ {
        let count = self.road(edge).map(|road| road.lane_count()).unwrap_or(0);
        (0..count).map(move |ord| LaneId::new(edge, ord))
    }

    /// The lanes entering a node, in edge discovery order then ascending ordinal.
    pub fn incoming_lanes(&self, node: NodeId) -> impl Iterator<Item = LaneId> + '_ {
        self.graph
            .edges_into(node)
            .flat_map(move |(id, _)| self.lanes(id))
    }

    /// The lanes leaving a node, in edge discovery order then ascending ordinal.
    pub fn outgoing_lanes(&self, node: NodeId) -> impl Iterator<Item = LaneId> + '_ {
        self.graph
            .edges_from(node)
            .flat_map(move |(id, _)| self.lanes(id))
    }

    /// The node a lane's edge points to, i.e. where the lane ends.
    pub fn lane_end(&self, lane: LaneId) -> Option<(NodeId, &Node)> {
        let edge: &Edge<Road> = self.graph.edge(lane.edge)?;
        let target = edge.target();
        self.node(target).map(|node| (target, node))
    }
}
