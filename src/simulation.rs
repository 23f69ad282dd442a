//! The simulation engine: immutable snapshots and the per-tick pipeline.
//!
//! A [`SimState`] is a complete snapshot of one instant: elapsed time,
//! the vehicle set, one signal state per signal-controlled intersection,
//! the spawn-sampling state, and the per-lane flow metrics of the last
//! tick. [`step`] consumes a snapshot by reference and produces the next
//! one; nothing is ever mutated in place, and the caller owns the loop.
//!
//! The pipeline runs in a fixed order each tick: signals, a read-only
//! congestion snapshot, vehicle kinematics, spawning, removal, and the
//! time advance. Stages three and four read only the stage-two snapshot,
//! so every vehicle reacts to the same instant regardless of iteration
//! order.

use crate::graph::NodeId;
use crate::network::{ControlPolicy, Junction, LaneId, Node, RoadGraph, SpawnAttributes};
use crate::signal::{FlowState, SignalConfig, SignalState};
use crate::validate::{validate_network, ValidationError};
use crate::vehicle::acceleration::AccelerationModel;
use crate::vehicle::{DriverProfile, Vehicle};
use crate::{VehicleId, VehicleSet};
use itertools::Itertools;
use pathfinding::directed::dijkstra::dijkstra;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

/// The length of a lane's entry region in m. A yielding vehicle may only
/// cross into a lane whose entry region is empty, and spawns are refused
/// while it is occupied.
const ENTRY_CLEARANCE: f64 = 12.0; // m

/// How close to the stop line a vehicle must come to rest for a stop
/// sign to count it as having stopped, in m.
const STOP_ZONE: f64 = 5.0; // m

/// The velocity below which a vehicle counts as stopped, in m/s.
const STOP_VEL: f64 = 0.1; // m/s

/// The maximum number of junctions a vehicle may cross in a single tick.
const MAX_HOPS: usize = 4;

/// The immutable per-run configuration: the validated network and the
/// tick duration.
#[derive(Clone, Debug)]
pub struct SimConfig {
    /// The road network. Read-only for the lifetime of the run.
    graph: RoadGraph,
    /// The tick duration in s.
    time_step: f64,
}

/// A network refused at simulation start because topology validation
/// found errors.
#[derive(Clone, Debug)]
pub struct InvalidNetwork {
    /// The complete error list, in validation order.
    pub errors: Vec<ValidationError>,
}

impl fmt::Display for InvalidNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network failed validation: ")?;
        for (idx, error) in self.errors.iter().enumerate() {
            if idx > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for InvalidNetwork {}

impl SimConfig {
    /// Creates a simulation configuration, refusing any network with a
    /// non-empty validation result.
    ///
    /// `time_step` is the tick duration in seconds. Any positive value
    /// is deterministic; smaller steps resolve the kinematics more
    /// finely.
    pub fn new(graph: RoadGraph, time_step: f64) -> Result<Self, InvalidNetwork> {
        let errors = validate_network(&graph);
        if errors.is_empty() {
            Ok(Self { graph, time_step })
        } else {
            log::warn!("refusing network with {} validation errors", errors.len());
            Err(InvalidNetwork { errors })
        }
    }

    /// The road network.
    pub fn graph(&self) -> &RoadGraph {
        &self.graph
    }

    /// The tick duration in s.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }
}

/// Per-lane flow metrics derived from one tick's congestion snapshot.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct LaneFlow {
    /// The number of vehicles on the lane.
    pub count: usize,
    /// Vehicles per metre of lane.
    pub density: f64,
    /// The mean velocity of the lane's vehicles in m/s.
    pub mean_vel: f64,
}

/// The deterministic spawn-sampling state.
///
/// Arrivals use an accumulated-fractional counter: each tick an emitter
/// banks `spawn_rate × time_step` expected arrivals and spawns on every
/// integer crossing, so spawn times are exact and reproducible. The rng
/// is used only to sample driver profiles and destinations.
#[derive(Clone, Debug)]
struct SpawnState {
    rng: StdRng,
    pending: BTreeMap<NodeId, f64>,
}

/// The complete immutable snapshot of one simulated instant.
#[derive(Clone, Debug)]
pub struct SimState {
    /// The elapsed simulation time in s.
    time: f64,
    /// The vehicles being simulated.
    vehicles: VehicleSet,
    /// One signal state per signal-controlled intersection.
    signals: BTreeMap<NodeId, SignalState>,
    /// The spawn-sampling state.
    spawn: SpawnState,
    /// Per-lane flow metrics observed at the start of the last tick.
    flows: BTreeMap<LaneId, LaneFlow>,
}

impl SimState {
    /// Creates the initial state: zero vehicles, zero time, and one
    /// fresh signal state per signal-controlled intersection.
    pub fn initial(config: &SimConfig, seed: u64) -> Self {
        let signals = config
            .graph
            .graph()
            .nodes()
            .filter(|(_, node)| {
                matches!(node.control(), Some(ControlPolicy::TrafficSignal(_)))
            })
            .map(|(id, _)| (id, SignalState::new()))
            .collect();
        Self {
            time: 0.0,
            vehicles: VehicleSet::default(),
            signals,
            spawn: SpawnState {
                rng: StdRng::seed_from_u64(seed),
                pending: BTreeMap::new(),
            },
            flows: BTreeMap::new(),
        }
    }

    /// The elapsed simulation time in s.
    pub fn time(&self) -> f64 {
        self.time
    }

    /// The number of vehicles in the snapshot.
    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    /// Returns an iterator over all the vehicles in the snapshot.
    pub fn iter_vehicles(&self) -> impl Iterator<Item = &Vehicle> {
        self.vehicles.values()
    }

    /// Gets a reference to the vehicle with the given ID.
    pub fn get_vehicle(&self, id: VehicleId) -> Option<&Vehicle> {
        self.vehicles.get(id)
    }

    /// Gets the signal state of a signal-controlled intersection.
    pub fn signal(&self, node: NodeId) -> Option<&SignalState> {
        self.signals.get(&node)
    }

    /// The flow metrics of a lane, as of the start of the last tick.
    /// Lanes that held no vehicles are absent.
    pub fn flow(&self, lane: LaneId) -> LaneFlow {
        self.flows.get(&lane).copied().unwrap_or_default()
    }

    /// Places a vehicle at the start of a lane. Intended for initial
    /// state construction by the caller; mid-run vehicles enter through
    /// emitter spawn events instead.
    pub fn add_vehicle(&mut self, lane: LaneId, profile: DriverProfile, dest: NodeId) -> VehicleId {
        self.vehicles.insert_with_key(|id| Vehicle {
            id,
            profile,
            lane,
            pos: 0.0,
            vel: 0.0,
            dest,
            stopped_at_line: false,
        })
    }
}

/// Advances the simulation by one tick, returning the successor state.
///
/// The sole simulation entry point; callers own the loop and may stop
/// after any tick. Identical configuration and state produce an
/// identical successor, bit for bit.
pub fn step(config: &SimConfig, state: &SimState) -> SimState {
    let graph = &config.graph;
    let dt = config.time_step;

    // 1. Advance the signal state machines.
    let signals: BTreeMap<NodeId, SignalState> = state
        .signals
        .iter()
        .map(|(id, signal)| match signal_config(graph, *id) {
            Some(cfg) => (*id, signal.step(cfg, dt)),
            None => (*id, *signal),
        })
        .collect();

    // 2. Congestion snapshot from the pre-step positions.
    let occupancy = Occupancy::build(&state.vehicles);
    let flows = occupancy.flows(graph);

    // 3. Vehicle kinematics against the snapshot, in ascending id order.
    let mut vehicles = state.vehicles.clone();
    let mut exited: Vec<VehicleId> = vec![];
    for id in state.vehicles.keys().sorted() {
        match advance_vehicle(graph, &signals, &occupancy, &state.vehicles[id], dt) {
            Advance::Moved(next) => vehicles[id] = next,
            Advance::Exited => exited.push(id),
        }
    }

    // 4. Spawn arrivals at the emitters and sinks.
    let mut spawn = state.spawn.clone();
    spawn_arrivals(graph, &occupancy, &mut spawn, &mut vehicles, dt);

    // 5. Remove the vehicles that reached their terminus.
    for id in exited {
        vehicles.remove(id);
    }

    // 6. Advance time.
    SimState {
        time: state.time + dt,
        vehicles,
        signals,
        spawn,
        flows,
    }
}

/// Looks up the signal program of a signal-controlled intersection.
fn signal_config(graph: &RoadGraph, node: NodeId) -> Option<&SignalConfig> {
    match graph.node(node)?.control() {
        Some(ControlPolicy::TrafficSignal(cfg)) => Some(cfg),
        _ => None,
    }
}

/// The per-lane congestion snapshot taken before any vehicle moves.
struct Occupancy {
    /// Vehicles per lane as `(pos, vel)`, ascending by position.
    lanes: BTreeMap<LaneId, Vec<(f64, f64)>>,
}

impl Occupancy {
    fn build(vehicles: &VehicleSet) -> Self {
        let mut lanes: BTreeMap<LaneId, Vec<(f64, f64)>> = BTreeMap::new();
        for vehicle in vehicles.values() {
            lanes
                .entry(vehicle.lane)
                .or_default()
                .push((vehicle.pos, vehicle.vel));
        }
        for entries in lanes.values_mut() {
            entries.sort_by(|a, b| a.0.total_cmp(&b.0));
        }
        Self { lanes }
    }

    /// The nearest vehicle strictly ahead of `pos` on the lane.
    fn lead(&self, lane: LaneId, pos: f64) -> Option<(f64, f64)> {
        self.lanes
            .get(&lane)?
            .iter()
            .find(|(their_pos, _)| *their_pos > pos)
            .copied()
    }

    /// Whether the lane's entry region held no vehicle at the snapshot.
    fn entry_clear(&self, lane: LaneId) -> bool {
        self.lanes
            .get(&lane)
            .map(|entries| entries.iter().all(|(pos, _)| *pos >= ENTRY_CLEARANCE))
            .unwrap_or(true)
    }

    /// The number of vehicles on the lane.
    fn count(&self, lane: LaneId) -> usize {
        self.lanes.get(&lane).map(Vec::len).unwrap_or(0)
    }

    /// Vehicles per metre of the lane at the snapshot.
    fn density(&self, graph: &RoadGraph, lane: LaneId) -> f64 {
        let length = graph.road(lane.edge).map(|r| r.length()).unwrap_or(0.0);
        if length > 0.0 {
            self.count(lane) as f64 / length
        } else {
            0.0
        }
    }

    /// Derives the per-lane flow metrics.
    fn flows(&self, graph: &RoadGraph) -> BTreeMap<LaneId, LaneFlow> {
        self.lanes
            .iter()
            .map(|(lane, entries)| {
                let count = entries.len();
                let length = graph.road(lane.edge).map(|r| r.length()).unwrap_or(0.0);
                let density = if length > 0.0 {
                    count as f64 / length
                } else {
                    0.0
                };
                let mean_vel = entries.iter().map(|(_, vel)| vel).sum::<f64>() / count as f64;
                (
                    *lane,
                    LaneFlow {
                        count,
                        density,
                        mean_vel,
                    },
                )
            })
            .collect()
    }
}

/// The outcome of one vehicle's kinematics for the tick.
enum Advance {
    /// The vehicle's successor state.
    Moved(Vehicle),
    /// The vehicle passed its terminating drain or sink.
    Exited,
}

/// What a vehicle faces at the end of its current lane.
enum LaneExit {
    /// The lane terminates at a boundary node; the vehicle may leave
    /// the network.
    Boundary,
    /// Crossing is permitted through the given junction.
    Through(Junction),
    /// The lane end is a stationary obstacle this tick.
    Blocked,
}

/// Computes one vehicle's successor state against the snapshot.
fn advance_vehicle(
    graph: &RoadGraph,
    signals: &BTreeMap<NodeId, SignalState>,
    occupancy: &Occupancy,
    vehicle: &Vehicle,
    dt: f64,
) -> Advance {
    let Some(road) = graph.road(vehicle.lane.edge) else {
        // A vehicle on a lane the network no longer describes cannot be
        // stepped; drop it rather than poison the run.
        log::warn!("removing vehicle on unknown {}", vehicle.lane);
        return Advance::Exited;
    };
    let length = road.length();
    let desired = vehicle.desired_speed(road.speed_limit());

    // Gather the acceleration constraints.
    let mut acc = AccelerationModel::new(&vehicle.profile);
    acc.apply_desired_speed(vehicle.vel, desired);
    if let Some((lead_pos, lead_vel)) = occupancy.lead(vehicle.lane, vehicle.pos) {
        acc.follow_vehicle(lead_pos - vehicle.pos, vehicle.vel, lead_vel);
    }
    let exit = lane_exit(graph, signals, occupancy, vehicle, vehicle.lane);
    if matches!(exit, LaneExit::Blocked) {
        acc.stop_at_line(length - vehicle.pos, vehicle.vel);
    }

    // Integrate the velocity, clamped to the desired speed, then the
    // position.
    let vel = (vehicle.vel + acc.acc() * dt).clamp(0.0, desired);
    let mut pos = vehicle.pos + 0.5 * (vehicle.vel + vel) * dt;

    let mut next = vehicle.clone();
    next.vel = vel;
    if length - pos < STOP_ZONE && vel < STOP_VEL {
        next.stopped_at_line = true;
    }

    // Resolve junction transitions, carrying leftover distance. A short
    // or zero-length lane can be fully traversed within one tick, hence
    // the loop.
    let mut hops = 0;
    loop {
        let length = graph
            .road(next.lane.edge)
            .map(|road| road.length())
            .unwrap_or(0.0);
        if pos < length {
            next.pos = pos;
            break;
        }
        match lane_exit(graph, signals, occupancy, &next, next.lane) {
            LaneExit::Boundary => return Advance::Exited,
            LaneExit::Through(junction) if hops < MAX_HOPS => {
                pos -= length;
                next.lane = junction.to;
                next.stopped_at_line = false;
                hops += 1;
            }
            LaneExit::Through(_) => {
                // Hop cap reached; hold at the line with speed intact
                // and resume crossing next tick.
                next.pos = length;
                break;
            }
            LaneExit::Blocked => {
                // Pinned at the stop line.
                next.pos = length;
                next.vel = 0.0;
                next.stopped_at_line = true;
                break;
            }
        }
    }

    Advance::Moved(next)
}

/// Determines what the vehicle faces at the end of the given lane.
fn lane_exit(
    graph: &RoadGraph,
    signals: &BTreeMap<NodeId, SignalState>,
    occupancy: &Occupancy,
    vehicle: &Vehicle,
    lane: LaneId,
) -> LaneExit {
    let Some((node_id, node)) = graph.lane_end(lane) else {
        return LaneExit::Boundary;
    };
    let Node::Intersection(attrs) = node else {
        return LaneExit::Boundary;
    };
    let Some(junction) = choose_junction(graph, &attrs.junctions, lane, vehicle.dest) else {
        return LaneExit::Blocked;
    };

    let flow = match &attrs.control {
        ControlPolicy::Uncontrolled => FlowState::RightOfWay,
        ControlPolicy::YieldSign => FlowState::Yield,
        ControlPolicy::StopSign => FlowState::Stop,
        ControlPolicy::TrafficSignal(cfg) => signals
            .get(&node_id)
            .map(|signal| signal.flow(cfg, &junction))
            .unwrap_or(FlowState::Stop),
    };
    let open = match flow {
        FlowState::RightOfWay => true,
        FlowState::Yield => occupancy.entry_clear(junction.to),
        // A stop-sign vehicle that has come to rest at the line proceeds
        // like a yielding one; a signalled stop never opens.
        FlowState::Stop => {
            matches!(attrs.control, ControlPolicy::StopSign)
                && vehicle.stopped_at_line
                && occupancy.entry_clear(junction.to)
        }
    };
    if open {
        LaneExit::Through(junction)
    } else {
        LaneExit::Blocked
    }
}

/// Selects the junction out of the current lane whose target leg best
/// matches the vehicle's destination.
///
/// Each candidate is scored by the target road's length plus the
/// shortest-path road distance from the target road's far node to the
/// destination. Ties, and the fallback when no candidate can reach the
/// destination, resolve to the lowest target lane key.
fn choose_junction(
    graph: &RoadGraph,
    junctions: &[Junction],
    lane: LaneId,
    dest: NodeId,
) -> Option<Junction> {
    let candidates: SmallVec<[&Junction; 4]> =
        junctions.iter().filter(|j| j.from == lane).collect();
    candidates
        .iter()
        .min_by_key(|j| (route_cost(graph, j.to, dest), j.to.edge, j.to.ord))
        .map(|j| **j)
}

/// The road distance in decimetres of travelling the given lane and then
/// the shortest path to `dest`, or `u64::MAX` when unreachable.
fn route_cost(graph: &RoadGraph, lane: LaneId, dest: NodeId) -> u64 {
    let Some(edge) = graph.graph().edge(lane.edge) else {
        return u64::MAX;
    };
    let base = road_cost(edge.payload().length());
    if edge.target() == dest {
        return base;
    }
    let result = dijkstra(
        &edge.target(),
        |node| {
            graph
                .graph()
                .edges_from(*node)
                .map(|(_, e)| (e.target(), road_cost(e.payload().length())))
                .collect::<Vec<_>>()
        },
        |node| *node == dest,
    );
    match result {
        Some((_, cost)) => base.saturating_add(cost),
        None => u64::MAX,
    }
}

fn road_cost(length: f64) -> u64 {
    (10.0 * length) as u64
}

/// Samples this tick's arrivals at every emitter and sink, in ascending
/// node id order.
fn spawn_arrivals(
    graph: &RoadGraph,
    occupancy: &Occupancy,
    spawn: &mut SpawnState,
    vehicles: &mut VehicleSet,
    dt: f64,
) {
    for (node_id, node) in graph.graph().nodes() {
        let Some(attrs) = node.spawn() else { continue };
        if attrs.spawn_rate <= 0.0 || attrs.profiles.is_empty() {
            continue;
        }
        let pending = spawn.pending.entry(node_id).or_insert(0.0);
        *pending += attrs.spawn_rate * dt;
        while *pending >= 1.0 {
            *pending -= 1.0;
            if !try_spawn(graph, occupancy, &mut spawn.rng, vehicles, node_id, attrs) {
                // Keep the credit; the arrival is retried next tick.
                *pending += 1.0;
                break;
            }
        }
    }
}

/// Attempts to spawn one vehicle at a boundary node.
fn try_spawn(
    graph: &RoadGraph,
    occupancy: &Occupancy,
    rng: &mut StdRng,
    vehicles: &mut VehicleSet,
    node_id: NodeId,
    attrs: &SpawnAttributes,
) -> bool {
    // Lowest-density outgoing lane whose entry region is free, both in
    // the snapshot and of vehicles spawned earlier this tick. Ties go to
    // the lowest lane key.
    let lane = graph
        .outgoing_lanes(node_id)
        .filter(|lane| {
            occupancy.entry_clear(*lane)
                && !vehicles
                    .values()
                    .any(|v| v.lane == *lane && v.pos < ENTRY_CLEARANCE)
        })
        .min_by(|a, b| {
            occupancy
                .density(graph, *a)
                .total_cmp(&occupancy.density(graph, *b))
                .then_with(|| a.cmp(b))
        });
    let Some(lane) = lane else {
        log::debug!("{node_id}: spawn suppressed, no clear lane");
        return false;
    };

    let Ok(profile_index) = WeightedIndex::new(attrs.profiles.iter().map(|(_, w)| *w)) else {
        return false;
    };
    let profile = attrs.profiles[profile_index.sample(rng)].0.clone();

    let Some(dest) = sample_destination(graph, rng, node_id, attrs) else {
        return false;
    };

    vehicles.insert_with_key(|id| Vehicle {
        id,
        profile,
        lane,
        pos: 0.0,
        vel: 0.0,
        dest,
        stopped_at_line: false,
    });
    true
}

/// Samples a destination from the node's weighted list, or uniformly
/// from the network's drains and sinks when the list is empty.
fn sample_destination(
    graph: &RoadGraph,
    rng: &mut StdRng,
    node_id: NodeId,
    attrs: &SpawnAttributes,
) -> Option<NodeId> {
    if !attrs.destinations.is_empty() {
        let index = WeightedIndex::new(attrs.destinations.iter().map(|(_, w)| *w)).ok()?;
        Some(attrs.destinations[index.sample(rng)].0)
    } else {
        let drains: Vec<NodeId> = graph
            .graph()
            .nodes()
            .filter(|(id, node)| node.drains() && *id != node_id)
            .map(|(id, _)| id)
            .collect();
        if drains.is_empty() {
            None
        } else {
            Some(drains[rng.gen_range(0..drains.len())])
        }
    }
}
