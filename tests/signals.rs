//! Tests of intersection control: timed signals and stop signs.

use roadflow::util::kmh_to_mps;
use roadflow::{
    build_graph, step, ControlPolicy, DriverProfile, EdgeId, FlowState, IntersectionAttributes,
    Junction, LaneId, NetworkConfig, Node, NodeId, Road, RoadClass, RoadGraph, SignalConfig,
    SignalInterval, SignalPhase, SimConfig, SimState,
};

const EMITTER: NodeId = NodeId::new(1);
const CROSS: NodeId = NodeId::new(2);
const DRAIN: NodeId = NodeId::new(3);
const ROAD_A: EdgeId = EdgeId::new(10);
const ROAD_B: EdgeId = EdgeId::new(11);

const LANE_A: LaneId = LaneId::new(ROAD_A, 0);
const LANE_B: LaneId = LaneId::new(ROAD_B, 0);

/// A single approach through a controlled intersection to a drain.
fn controlled(control: ControlPolicy) -> RoadGraph {
    build_graph(&NetworkConfig {
        nodes: vec![
            (
                EMITTER,
                Node::Emitter(roadflow::SpawnAttributes {
                    spawn_rate: 0.0,
                    profiles: vec![],
                    destinations: vec![],
                }),
            ),
            (
                CROSS,
                Node::Intersection(IntersectionAttributes {
                    control,
                    junctions: vec![Junction::new(LANE_A, LANE_B)],
                }),
            ),
            (DRAIN, Node::Drain),
        ],
        roads: vec![
            (
                ROAD_A,
                EMITTER,
                CROSS,
                Road::new("approach", 500.0, kmh_to_mps(50.0), RoadClass::Street, 1),
            ),
            (
                ROAD_B,
                CROSS,
                DRAIN,
                Road::new("exit", 300.0, kmh_to_mps(40.0), RoadClass::Residential, 1),
            ),
        ],
        time_step: 0.5,
    })
}

fn red_then_green() -> ControlPolicy {
    let junction = Junction::new(LANE_A, LANE_B);
    ControlPolicy::TrafficSignal(SignalConfig {
        phases: vec![
            SignalPhase {
                duration: 60.0,
                flow: [(junction, FlowState::Stop)].into(),
            },
            SignalPhase {
                duration: 60.0,
                flow: [(junction, FlowState::RightOfWay)].into(),
            },
        ],
        yellow: 3.0,
        all_red: 2.0,
    })
}

/// A vehicle arriving on red waits at the stop line, then crosses once
/// its phase turns green.
#[test]
fn red_light_holds_the_vehicle_until_green() {
    let config = SimConfig::new(controlled(red_then_green()), 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);
    let veh = state.add_vehicle(LANE_A, DriverProfile::typical(), DRAIN);

    // The drive down the approach takes around 40 s, well inside the
    // 60 s red phase.
    while state.time() < 55.0 {
        state = step(&config, &state);
    }
    let vehicle = state.get_vehicle(veh).expect("vehicle left during red");
    assert_eq!(vehicle.lane(), LANE_A);
    assert!(vehicle.pos() > 490.0);
    assert!(vehicle.pos() <= 500.0);
    assert!(vehicle.has_stopped());

    // Phase 1 turns green at t = 65 s; the vehicle crosses shortly after.
    while state.time() < 80.0 {
        state = step(&config, &state);
    }
    match state.get_vehicle(veh) {
        Some(vehicle) => assert_eq!(vehicle.lane(), LANE_B),
        None => panic!("vehicle should still be on the exit road"),
    }
}

/// The signal state visible in the snapshot follows the program:
/// green, yellow, all-red, then the next phase.
#[test]
fn snapshot_signal_state_follows_the_program() {
    let config = SimConfig::new(controlled(red_then_green()), 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);

    let expect = [
        (30.0, 0, SignalInterval::Green),
        (61.0, 0, SignalInterval::Yellow),
        (64.0, 0, SignalInterval::AllRed),
        (70.0, 1, SignalInterval::Green),
        (126.0, 1, SignalInterval::Yellow),
        (135.0, 0, SignalInterval::Green),
    ];
    for (time, phase, interval) in expect {
        while state.time() < time {
            state = step(&config, &state);
        }
        let signal = state.signal(CROSS).unwrap();
        assert_eq!((signal.phase(), signal.interval()), (phase, interval));
    }
}

/// A stop-sign vehicle comes to rest at the line before proceeding.
#[test]
fn stop_sign_requires_a_full_stop() {
    let config = SimConfig::new(controlled(ControlPolicy::StopSign), 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);
    let veh = state.add_vehicle(LANE_A, DriverProfile::typical(), DRAIN);

    let mut stopped_near_line = false;
    let mut crossed = false;
    for _ in 0..400 {
        state = step(&config, &state);
        match state.get_vehicle(veh) {
            Some(vehicle) if vehicle.lane() == LANE_A => {
                if vehicle.pos() > 495.0 && vehicle.has_stopped() {
                    stopped_near_line = true;
                }
                assert!(!crossed);
            }
            Some(_) => {
                assert!(stopped_near_line, "crossed without stopping at the line");
                crossed = true;
            }
            None => break,
        }
    }
    assert!(stopped_near_line && crossed);
}

/// A yield sign with a clear target lane is crossed without stopping.
#[test]
fn yield_sign_with_clear_exit_is_crossed_at_speed() {
    let config = SimConfig::new(controlled(ControlPolicy::YieldSign), 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);
    let veh = state.add_vehicle(LANE_A, DriverProfile::typical(), DRAIN);

    let mut crossing_vel = None;
    for _ in 0..400 {
        let before = state.get_vehicle(veh).cloned();
        state = step(&config, &state);
        if let (Some(before), Some(after)) = (before, state.get_vehicle(veh)) {
            if before.lane() == LANE_A && after.lane() == LANE_B {
                crossing_vel = Some(after.vel());
            }
        }
    }
    let vel = crossing_vel.expect("vehicle never crossed");
    assert!(vel > 0.8 * kmh_to_mps(40.0));
}

/// The same approach, but with the exit road stalled: an exit whose
/// speed limit is zero keeps a blocker inside the entry region, so a
/// yielding vehicle waits at the line indefinitely.
#[test]
fn yield_sign_waits_for_an_occupied_entry_region() {
    let graph = build_graph(&NetworkConfig {
        nodes: vec![
            (
                EMITTER,
                Node::Emitter(roadflow::SpawnAttributes {
                    spawn_rate: 0.0,
                    profiles: vec![],
                    destinations: vec![],
                }),
            ),
            (
                CROSS,
                Node::Intersection(IntersectionAttributes {
                    control: ControlPolicy::YieldSign,
                    junctions: vec![Junction::new(LANE_A, LANE_B)],
                }),
            ),
            (DRAIN, Node::Drain),
        ],
        roads: vec![
            (
                ROAD_A,
                EMITTER,
                CROSS,
                Road::new("approach", 500.0, kmh_to_mps(50.0), RoadClass::Street, 1),
            ),
            (
                ROAD_B,
                CROSS,
                DRAIN,
                Road::new("stalled exit", 300.0, 0.0, RoadClass::Residential, 1),
            ),
        ],
        time_step: 0.5,
    });
    let config = SimConfig::new(graph, 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);
    state.add_vehicle(LANE_B, DriverProfile::typical(), DRAIN);
    let veh = state.add_vehicle(LANE_A, DriverProfile::typical(), DRAIN);

    while state.time() < 100.0 {
        state = step(&config, &state);
    }
    let vehicle = state.get_vehicle(veh).expect("vehicle crossed a closed line");
    assert_eq!(vehicle.lane(), LANE_A);
    assert!(vehicle.pos() > 490.0);
    assert!(vehicle.has_stopped());
}

/// An uncontrolled intersection never slows the vehicle down near the
/// stop line.
#[test]
fn uncontrolled_intersection_is_crossed_at_speed() {
    let config = SimConfig::new(controlled(ControlPolicy::Uncontrolled), 0.5).unwrap();
    let mut state = SimState::initial(&config, 0);
    let veh = state.add_vehicle(LANE_A, DriverProfile::typical(), DRAIN);

    let mut crossing_vel = None;
    for _ in 0..400 {
        let before = state.get_vehicle(veh).cloned();
        state = step(&config, &state);
        if let (Some(before), Some(after)) = (before, state.get_vehicle(veh)) {
            if before.lane() == LANE_A && after.lane() == LANE_B {
                crossing_vel = Some(after.vel());
            }
        }
    }
    // Near the 40 km/h exit road's limit, not creeping.
    let vel = crossing_vel.expect("vehicle never crossed");
    assert!(vel > 0.8 * kmh_to_mps(40.0));
}
