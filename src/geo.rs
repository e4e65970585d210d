//! Geo primitives: haversine distance, heading delta, speed conversion.
//!
//! All angles are degrees, all distances meters unless noted. These are pure
//! functions with no dependency on the rest of the crate.

const EARTH_RADIUS_M: f64 = 6_371_000.0;
const MPS_TO_KNOTS: f64 = 1.9438444924406;

/// Great-circle distance between two lat/lon points, in meters.
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();
    EARTH_RADIUS_M * c
}

pub fn mps_to_knots(x: f64) -> f64 {
    x * MPS_TO_KNOTS
}

/// Smallest angular difference between two headings, in [0, 180] degrees.
pub fn heading_delta_deg(h1: f64, h2: f64) -> f64 {
    let raw = (h2 - h1).rem_euclid(360.0);
    raw.min(360.0 - raw)
}

/// Implied speed in knots between two points, or `None` if `dt_sec <= 0`.
pub fn implied_speed_knots(lat1: f64, lon1: f64, lat2: f64, lon2: f64, dt_sec: f64) -> Option<f64> {
    if dt_sec <= 0.0 {
        return None;
    }
    let meters = haversine_m(lat1, lon1, lat2, lon2);
    Some(mps_to_knots(meters / dt_sec))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn haversine_one_degree_latitude_is_about_111_km() {
        let d = haversine_m(40.0, -74.0, 41.0, -74.0);
        assert!((d - 111_195.0).abs() < 500.0, "got {d}");
    }

    #[test]
    fn heading_delta_wraps_around_north() {
        assert!((heading_delta_deg(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta_deg(10.0, 350.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn heading_delta_is_symmetric_and_bounded() {
        let d = heading_delta_deg(10.0, 200.0);
        assert!((0.0..=180.0).contains(&d));
    }

    #[test]
    fn implied_speed_undefined_for_non_positive_dt() {
        assert_eq!(implied_speed_knots(40.0, -74.0, 41.0, -74.0, 0.0), None);
        assert_eq!(implied_speed_knots(40.0, -74.0, 41.0, -74.0, -5.0), None);
    }

    #[test]
    fn implied_speed_teleport_short_matches_spec_scenario() {
        let sp = implied_speed_knots(40.0, -74.0, 41.0, -74.0, 60.0).unwrap();
        assert!((sp - 3602.0).abs() < 10.0, "got {sp}");
    }
}
