//! The bounded car-following acceleration model.
//!
//! Each tick a fresh model is built for the vehicle and every applicable
//! constraint (speed limit, lead vehicle, stop line) contributes an
//! acceleration; the most restrictive one wins.

use crate::vehicle::DriverProfile;

/// The minimum gap to maintain between vehicles in m.
const MIN_GAP: f64 = 2.0; // m

/// The maximum deceleration of all vehicles in ms<sup>-2</sup>.
const MAX_DECEL: f64 = -6.0; // m/s^2

/// The acceleration model of a vehicle for one tick.
#[derive(Clone, Debug)]
pub(crate) struct AccelerationModel {
    headway: f64,
    max_acc: f64,
    comf_dec: f64,
    acc: f64,
}

impl AccelerationModel {
    /// Creates a fresh model, initially free to maximally accelerate.
    pub fn new(profile: &DriverProfile) -> Self {
        AccelerationModel {
            headway: profile.time_headway,
            max_acc: profile.max_acc,
            comf_dec: profile.comf_dec,
            acc: profile.max_acc,
        }
    }

    /// Gets the resulting acceleration of the vehicle.
    pub fn acc(&self) -> f64 {
        f64::max(self.acc, MAX_DECEL)
    }

    /// Calculates the acceleration needed to maintain the desired speed.
    ///
    /// # Arguments
    /// * `vel` - The velocity of the simulated vehicle (m/s).
    /// * `desired` - The desired speed (m/s).
    pub fn apply_desired_speed(&mut self, vel: f64, desired: f64) {
        let this_acc = if desired > 0.0 {
            self.max_acc * (1. - (vel / desired).powi(4))
        } else {
            MAX_DECEL
        };
        self.acc = f64::min(self.acc, this_acc);
    }

    /// Calculates the acceleration needed to stop before a stop line.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the stop line.
    /// * `my_vel` - The velocity of the simulated vehicle (m/s).
    pub fn stop_at_line(&mut self, net_dist: f64, my_vel: f64) {
        let acc = self.idm(net_dist + MIN_GAP, my_vel, 0.0);
        self.acc = f64::min(self.acc, acc);
    }

    /// Calculates the acceleration needed to follow the vehicle ahead.
    ///
    /// # Arguments
    /// * `net_dist` - The distance between this vehicle and the vehicle ahead in metres.
    /// * `my_vel` - The velocity of the simulated vehicle (m/s).
    /// * `their_vel` - The vehicle ahead's velocity (m/s).
    pub fn follow_vehicle(&mut self, net_dist: f64, my_vel: f64, their_vel: f64) {
        let acc = self.idm(net_dist, my_vel, their_vel);
        self.acc = f64::min(self.acc, acc);
    }

    /// Computes an acceleration using the intelligent driver model.
    fn idm(&self, net_dist: f64, my_vel: f64, their_vel: f64) -> f64 {
        let comf_dec = -self.comf_dec; // m.s^-2
        let max_acc = self.max_acc; // m.s^-2

        if net_dist <= MIN_GAP {
            -10. * max_acc
        } else {
            let appr = my_vel - their_vel;
            let factor = 1. / (2. * (max_acc * comf_dec).sqrt());
            let ss = MIN_GAP + (my_vel * self.headway) + (my_vel * appr * factor);
            let term = ss / net_dist;
            max_acc * (1. - (term * term))
        }
    }
}
