//! Miscellaneous utility functions.
//!
//! All internal quantities use SI base units (metres, seconds); these
//! helpers convert at the configuration boundary.

/// Converts a speed in km/h to m/s.
pub fn kmh_to_mps(kmh: f64) -> f64 {
    kmh / 3.6
}

/// Converts a speed in m/s to km/h.
pub fn mps_to_kmh(mps: f64) -> f64 {
    mps * 3.6
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn speed_conversions_round_trip() {
        assert_approx_eq!(kmh_to_mps(36.0), 10.0);
        assert_approx_eq!(mps_to_kmh(10.0), 36.0);
        assert_approx_eq!(mps_to_kmh(kmh_to_mps(50.0)), 50.0);
    }
}
