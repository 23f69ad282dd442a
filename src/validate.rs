//! Topology validation proving a network is routable before simulation.
//!
//! Validation is exhaustive: the full error list is returned, never just
//! the first failure. A network may only enter simulation when every
//! intersection validates with an empty list.

use crate::graph::NodeId;
use crate::network::{LaneId, Node, RoadGraph};
use itertools::chain;
use std::collections::BTreeSet;
use std::fmt;

/// A structural defect found in a road network.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValidationError {
    /// An incoming lane at an intersection that no junction departs from,
    /// i.e. a dead-end approach.
    MissingJunctionForLane { node: NodeId, lane: LaneId },
    /// An outgoing lane at an intersection that no junction feeds,
    /// i.e. an unreachable exit.
    UnreachableLane { node: NodeId, lane: LaneId },
    /// The intersection check was invoked on a non-intersection node.
    NotAnIntersection { node: NodeId },
    /// Reserved: an emitter junction lane outside the node's outgoing
    /// lane set. Declared in the taxonomy but not yet checked.
    InvalidEmitterLane { node: NodeId, lane: LaneId },
    /// Reserved: a drain lane outside the node's incoming lane set.
    /// Declared in the taxonomy but not yet checked.
    InvalidDrainLane { node: NodeId, lane: LaneId },
    /// Reserved: a junction left unmapped by a signal phase.
    /// Declared in the taxonomy but not yet checked.
    MissingSignalState { node: NodeId, phase: usize },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ValidationError::*;
        match self {
            MissingJunctionForLane { node, lane } => {
                write!(f, "{node}: no junction departs from incoming {lane}")
            }
            UnreachableLane { node, lane } => {
                write!(f, "{node}: no junction feeds outgoing {lane}")
            }
            NotAnIntersection { node } => {
                write!(f, "{node}: not an intersection")
            }
            InvalidEmitterLane { node, lane } => {
                write!(f, "{node}: emitter references foreign {lane}")
            }
            InvalidDrainLane { node, lane } => {
                write!(f, "{node}: drain references foreign {lane}")
            }
            MissingSignalState { node, phase } => {
                write!(f, "{node}: phase {phase} leaves a junction unmapped")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Checks that a node's junction set covers all of its incoming and
/// outgoing lanes.
///
/// Defined only for intersections; any other node variant yields a single
/// [`ValidationError::NotAnIntersection`] and nothing else. The result
/// lists the incoming-lane errors first, then the outgoing-lane errors,
/// each ordered by edge discovery order (ascending edge id) then
/// ascending lane ordinal.
pub fn validate_intersection(
    node_id: NodeId,
    node: &Node,
    graph: &RoadGraph,
) -> Vec<ValidationError> {
    if !node.is_intersection() {
        return vec![ValidationError::NotAnIntersection { node: node_id }];
    }

    let froms: BTreeSet<LaneId> = node.junctions().iter().map(|j| j.from).collect();
    let tos: BTreeSet<LaneId> = node.junctions().iter().map(|j| j.to).collect();

    let dead_ends = graph
        .incoming_lanes(node_id)
        .filter(|lane| !froms.contains(lane))
        .map(|lane| ValidationError::MissingJunctionForLane {
            node: node_id,
            lane,
        });
    let unreachable = graph
        .outgoing_lanes(node_id)
        .filter(|lane| !tos.contains(lane))
        .map(|lane| ValidationError::UnreachableLane {
            node: node_id,
            lane,
        });

    chain(dead_ends, unreachable).collect()
}

/// Validates every intersection in the network, in ascending node id
/// order, and concatenates the results.
pub fn validate_network(graph: &RoadGraph) -> Vec<ValidationError> {
    graph
        .graph()
        .nodes()
        .filter(|(_, node)| node.is_intersection())
        .flat_map(|(id, node)| validate_intersection(id, node, graph))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::EdgeId;
    use crate::network::{
        build_graph, ControlPolicy, IntersectionAttributes, Junction, NetworkConfig, Road,
        RoadClass, SpawnAttributes,
    };

    fn emitter() -> Node {
        Node::Emitter(SpawnAttributes {
            spawn_rate: 0.0,
            profiles: vec![],
            destinations: vec![],
        })
    }

    /// An emitter feeding a two-lane road into an intersection,
    /// which feeds a one-lane road into a drain.
    fn funnel(junctions: Vec<Junction>) -> (RoadGraph, NodeId) {
        let emitter_id = NodeId::new(1);
        let cross_id = NodeId::new(2);
        let drain_id = NodeId::new(3);
        let config = NetworkConfig {
            nodes: vec![
                (emitter_id, emitter()),
                (
                    cross_id,
                    Node::Intersection(IntersectionAttributes {
                        control: ControlPolicy::Uncontrolled,
                        junctions,
                    }),
                ),
                (drain_id, Node::Drain),
            ],
            roads: vec![
                (
                    EdgeId::new(10),
                    emitter_id,
                    cross_id,
                    Road::new("a", 500.0, 14.0, RoadClass::Street, 2),
                ),
                (
                    EdgeId::new(11),
                    cross_id,
                    drain_id,
                    Road::new("b", 300.0, 11.0, RoadClass::Residential, 1),
                ),
            ],
            time_step: 0.1,
        };
        (build_graph(&config), cross_id)
    }

    fn full_junctions() -> Vec<Junction> {
        let to = LaneId::new(EdgeId::new(11), 0);
        vec![
            Junction::new(LaneId::new(EdgeId::new(10), 0), to),
            Junction::new(LaneId::new(EdgeId::new(10), 1), to),
        ]
    }

    #[test]
    fn complete_intersection_validates_clean() {
        let (graph, cross_id) = funnel(full_junctions());
        let node = graph.node(cross_id).unwrap();
        assert_eq!(validate_intersection(cross_id, node, &graph), vec![]);
        assert_eq!(validate_network(&graph), vec![]);
    }

    #[test]
    fn missing_junction_yields_exactly_one_error() {
        let mut junctions = full_junctions();
        junctions.remove(1);
        let (graph, cross_id) = funnel(junctions);
        let node = graph.node(cross_id).unwrap();
        assert_eq!(
            validate_intersection(cross_id, node, &graph),
            vec![ValidationError::MissingJunctionForLane {
                node: cross_id,
                lane: LaneId::new(EdgeId::new(10), 1),
            }]
        );
    }

    #[test]
    fn uncovered_exit_is_unreachable() {
        // Both approaches are covered, but they feed a lane ordinal the
        // exit road does not have, so its real lane is never fed.
        let bogus = LaneId::new(EdgeId::new(11), 5);
        let (graph, cross_id) = funnel(vec![
            Junction::new(LaneId::new(EdgeId::new(10), 0), bogus),
            Junction::new(LaneId::new(EdgeId::new(10), 1), bogus),
        ]);
        let node = graph.node(cross_id).unwrap();
        assert_eq!(
            validate_intersection(cross_id, node, &graph),
            vec![ValidationError::UnreachableLane {
                node: cross_id,
                lane: LaneId::new(EdgeId::new(11), 0),
            }]
        );
    }

    #[test]
    fn errors_list_incoming_before_outgoing() {
        let (graph, cross_id) = funnel(vec![]);
        let node = graph.node(cross_id).unwrap();
        assert_eq!(
            validate_intersection(cross_id, node, &graph),
            vec![
                ValidationError::MissingJunctionForLane {
                    node: cross_id,
                    lane: LaneId::new(EdgeId::new(10), 0),
                },
                ValidationError::MissingJunctionForLane {
                    node: cross_id,
                    lane: LaneId::new(EdgeId::new(10), 1),
                },
                ValidationError::UnreachableLane {
                    node: cross_id,
                    lane: LaneId::new(EdgeId::new(11), 0),
                },
            ]
        );
    }

    #[test]
    fn non_intersection_yields_not_an_intersection() {
        let (graph, _) = funnel(full_junctions());
        let drain_id = NodeId::new(3);
        let node = graph.node(drain_id).unwrap();
        assert_eq!(
            validate_intersection(drain_id, node, &graph),
            vec![ValidationError::NotAnIntersection { node: drain_id }]
        );
    }
}
