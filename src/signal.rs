//! Timed signal programs and the per-intersection signal state machine.
//!
//! A [`SignalConfig`] is an ordered list of phases, each assigning a
//! [`FlowState`] to every junction at the intersection, plus yellow and
//! all-red clearance durations shared by the whole program. The state
//! machine cycles Green → Yellow → AllRed → next phase forever; it has
//! no terminal state.

use crate::network::Junction;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Right-of-way classification gating the crossing of a junction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FlowState {
    RightOfWay,
    Yield,
    Stop,
}

/// A timed flow state assignment for every junction at an intersection.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalPhase {
    /// The duration of the phase's green interval in s.
    pub duration: f64,
    /// The flow state of each junction while the phase is green.
    /// A junction absent from the map reads as [`FlowState::Stop`].
    pub flow: BTreeMap<Junction, FlowState>,
}

/// A complete signal program for one intersection.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SignalConfig {
    /// The ordered phases of the program.
    pub phases: Vec<SignalPhase>,
    /// The yellow interval duration in s, shared by all phases.
    pub yellow: f64,
    /// The all-red clearance duration in s, shared by all phases.
    pub all_red: f64,
}

impl SignalConfig {
    /// The duration of one full cycle through every phase in s.
    pub fn cycle_time(&self) -> f64 {
        let green: f64 = self.phases.iter().map(|p| p.duration).sum();
        green + self.phases.len() as f64 * (self.yellow + self.all_red)
    }
}

/// The interval within a phase that a signal is currently in.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SignalInterval {
    Green,
    Yellow,
    AllRed,
}

/// The time-varying state of one signal-controlled intersection.
///
/// Part of the immutable simulation snapshot: advancing the machine
/// produces a successor state rather than mutating in place.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct SignalState {
    /// The index of the active phase.
    phase: usize,
    /// The interval within the active phase.
    interval: SignalInterval,
    /// The time spent in the current interval in s.
    time_in: f64,
}

impl Default for SignalState {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalState {
    /// The initial state: phase 0, green, no time elapsed.
    pub fn new() -> Self {
        Self {
            phase: 0,
            interval: SignalInterval::Green,
            time_in: 0.0,
        }
    }

    /// The index of the active phase.
    pub fn phase(&self) -> usize {
        self.phase
    }

    /// The interval within the active phase.
    pub fn interval(&self) -> SignalInterval {
        self.interval
    }

    /// The time spent in the current interval in s.
    pub fn time_in(&self) -> f64 {
        self.time_in
    }

    /// Advances the machine by `dt` seconds, returning the successor state.
    ///
    /// Green runs for the phase's configured duration, then yellow, then
    /// all-red, then the next phase (wrapping) turns green. A program with
    /// no phases or a non-positive cycle time never advances.
    pub fn step(&self, config: &SignalConfig, dt: f64) -> SignalState {
        if config.phases.is_empty() || config.cycle_time() <= 0.0 {
            return *self;
        }

        let mut next = *self;
        next.time_in += dt;
        loop {
            let duration = match next.interval {
                SignalInterval::Green => config.phases[next.phase].duration,
                SignalInterval::Yellow => config.yellow,
                SignalInterval::AllRed => config.all_red,
            };
            if next.time_in < duration {
                break;
            }
            next.time_in -= duration;
            next.interval = match next.interval {
                SignalInterval::Green => SignalInterval::Yellow,
                SignalInterval::Yellow => SignalInterval::AllRed,
                SignalInterval::AllRed => {
                    next.phase = (next.phase + 1) % config.phases.len();
                    SignalInterval::Green
                }
            };
        }
        next
    }

    /// The effective flow state of a junction at this instant.
    ///
    /// During green, the active phase's mapped state applies. During
    /// yellow, junctions mapped right-of-way degrade to yield and all
    /// others are unchanged. During all-red, every junction is stop.
    pub fn flow(&self, config: &SignalConfig, junction: &Junction) -> FlowState {
        let mapped = config
            .phases
            .get(self.phase)
            .and_then(|phase| phase.flow.get(junction))
            .copied()
            .unwrap_or(FlowState::Stop);
        match self.interval {
            SignalInterval::Green => mapped,
            SignalInterval::Yellow => match mapped {
                FlowState::RightOfWay => FlowState::Yield,
                other => other,
            },
            SignalInterval::AllRed => FlowState::Stop,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::EdgeId;
    use crate::network::LaneId;
    use assert_approx_eq::assert_approx_eq;

    fn junction(from_edge: u64, to_edge: u64) -> Junction {
        Junction::new(
            LaneId::new(EdgeId::new(from_edge), 0),
            LaneId::new(EdgeId::new(to_edge), 0),
        )
    }

    fn two_phase_config() -> (SignalConfig, Junction, Junction) {
        let ns = junction(1, 2);
        let ew = junction(3, 4);
        let config = SignalConfig {
            phases: vec![
                SignalPhase {
                    duration: 4.0,
                    flow: [(ns, FlowState::RightOfWay), (ew, FlowState::Stop)].into(),
                },
                SignalPhase {
                    duration: 6.0,
                    flow: [(ns, FlowState::Stop), (ew, FlowState::RightOfWay)].into(),
                },
            ],
            yellow: 1.0,
            all_red: 0.5,
        };
        (config, ns, ew)
    }

    #[test]
    fn green_yellow_all_red_progression() {
        let (config, ns, ew) = two_phase_config();
        let mut state = SignalState::new();
        assert_eq!(state.flow(&config, &ns), FlowState::RightOfWay);
        assert_eq!(state.flow(&config, &ew), FlowState::Stop);

        // 4 s of green, then yellow.
        for _ in 0..8 {
            state = state.step(&config, 0.5);
        }
        assert_eq!(state.interval(), SignalInterval::Yellow);
        assert_eq!(state.flow(&config, &ns), FlowState::Yield);
        assert_eq!(state.flow(&config, &ew), FlowState::Stop);

        // 1 s of yellow, then all-red.
        state = state.step(&config, 1.0);
        assert_eq!(state.interval(), SignalInterval::AllRed);
        assert_eq!(state.flow(&config, &ns), FlowState::Stop);
        assert_eq!(state.flow(&config, &ew), FlowState::Stop);

        // 0.5 s of all-red, then the next phase turns green.
        state = state.step(&config, 0.5);
        assert_eq!(state.phase(), 1);
        assert_eq!(state.interval(), SignalInterval::Green);
        assert_eq!(state.flow(&config, &ew), FlowState::RightOfWay);
    }

    #[test]
    fn full_cycle_returns_to_initial_state() {
        let (config, _, _) = two_phase_config();
        assert_approx_eq!(config.cycle_time(), 13.0);

        let mut state = SignalState::new();
        let steps = (config.cycle_time() / 0.25) as usize;
        for _ in 0..steps {
            state = state.step(&config, 0.25);
        }
        assert_eq!(state.phase(), 0);
        assert_eq!(state.interval(), SignalInterval::Green);
        assert_approx_eq!(state.time_in(), 0.0);
    }

    #[test]
    fn unmapped_junction_reads_as_stop() {
        let (config, _, _) = two_phase_config();
        let state = SignalState::new();
        assert_eq!(state.flow(&config, &junction(7, 8)), FlowState::Stop);
    }

    #[test]
    fn empty_program_never_advances() {
        let config = SignalConfig {
            phases: vec![],
            yellow: 1.0,
            all_red: 1.0,
        };
        let state = SignalState::new().step(&config, 10.0);
        assert_eq!(state, SignalState::new());
    }
}
