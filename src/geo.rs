// Great-circle math and aviation unit conversions.

use serde::Serialize;

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const KM_TO_NM: f64 = 0.539957;
pub const MPS_TO_KNOTS: f64 = 1.94384;
pub const M_TO_FEET: f64 = 3.28084;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// Haversine great-circle distance in nautical miles.
pub fn haversine_nm(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let d_km = 2.0 * EARTH_RADIUS_KM * h.sqrt().asin();
    d_km * KM_TO_NM
}

pub fn mps_to_knots(mps: f64) -> f64 {
    mps * MPS_TO_KNOTS
}

pub fn m_to_feet(m: f64) -> f64 {
    m * M_TO_FEET
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_latitude_is_about_sixty_nm() {
        let a = GeoPoint { lat: -33.0, lon: 151.0 };
        let b = GeoPoint { lat: -34.0, lon: 151.0 };
        let d = haversine_nm(a, b);
        assert!((d - 60.0).abs() < 0.5, "got {} NM", d);
    }

    #[test]
    fn zero_distance_for_identical_points() {
        let p = GeoPoint { lat: -33.9399, lon: 151.1753 };
        assert!(haversine_nm(p, p).abs() < 1e-9);
    }

    #[test]
    fn unit_conversions() {
        assert!((mps_to_knots(100.0) - 194.384).abs() < 1e-6);
        assert!((m_to_feet(1000.0) - 3280.84).abs() < 1e-6);
    }
}
