//! Simulated vehicles and their driver profiles.

use crate::graph::NodeId;
use crate::network::LaneId;
use crate::VehicleId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub(crate) mod acceleration;

/// The behavioral parameters of a class of drivers.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DriverProfile {
    /// A human readable label.
    pub label: String,
    /// Desired speed as a multiple of the speed limit.
    pub aggression: f64,
    /// The desired gap to the vehicle ahead in s.
    pub time_headway: f64,
    /// The maximum acceleration in m/s².
    pub max_acc: f64,
    /// The comfortable deceleration, a negative number in m/s².
    pub comf_dec: f64,
}

impl DriverProfile {
    /// A middle-of-the-road default profile.
    pub fn typical() -> Self {
        Self {
            label: "typical".into(),
            aggression: 1.0,
            time_headway: 1.5,
            max_acc: 2.0,
            comf_dec: -2.5,
        }
    }
}

/// A simulated vehicle.
///
/// Created by an emitter or sink spawn event, carried forward through
/// successor snapshots every tick, and destroyed when its travel passes
/// the terminating drain or sink.
#[derive(Clone, Debug)]
pub struct Vehicle {
    /// The vehicle's ID.
    pub(crate) id: VehicleId,
    /// The driver profile.
    pub(crate) profile: DriverProfile,
    /// The lane the vehicle is on.
    pub(crate) lane: LaneId,
    /// The distance along the lane in m.
    pub(crate) pos: f64,
    /// The velocity in m/s.
    pub(crate) vel: f64,
    /// The node the vehicle is heading for.
    pub(crate) dest: NodeId,
    /// Whether the vehicle has come to rest at the current lane's stop line.
    /// Cleared whenever the vehicle enters a new lane.
    pub(crate) stopped_at_line: bool,
}

impl Vehicle {
    /// Gets the vehicle's ID.
    pub fn id(&self) -> VehicleId {
        self.id
    }

    /// The driver profile.
    pub fn profile(&self) -> &DriverProfile {
        &self.profile
    }

    /// The lane the vehicle is currently travelling on.
    pub fn lane(&self) -> LaneId {
        self.lane
    }

    /// The distance along the current lane in m.
    pub fn pos(&self) -> f64 {
        self.pos
    }

    /// The vehicle's velocity in m/s.
    pub fn vel(&self) -> f64 {
        self.vel
    }

    /// The node the vehicle is heading for.
    pub fn destination(&self) -> NodeId {
        self.dest
    }

    /// The vehicle's desired speed on a road with the given limit, in m/s.
    /// Never negative, whatever the profile says.
    pub fn desired_speed(&self, speed_limit: f64) -> f64 {
        (self.profile.aggression * speed_limit).max(0.0)
    }

    /// Whether the vehicle is stopped.
    pub fn has_stopped(&self) -> bool {
        self.vel < 0.1
    }
}
