// Live flight states from the OpenSky Network, ranked by distance to SYD.
//
// OpenSky REST API: https://opensky-network.org/apidoc/rest.html
// The anonymous endpoint is heavily rate-limited and sometimes unreachable,
// so the direct call is backed by two public relays.

use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::fallback::{self, Result, Strategy};
use crate::geo::{self, GeoPoint};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub lamin: f64,
    pub lamax: f64,
    pub lomin: f64,
    pub lomax: f64,
}

#[derive(Debug, Clone)]
pub struct OpenSkyConfig {
    pub base_url: String,
    /// Area scanned for state vectors.
    pub bbox: BoundingBox,
    /// Distances are measured from here.
    pub reference: GeoPoint,
    pub mirror_prefix: String,
    pub relay_url: String,
    pub attempt_timeout: Duration,
}

impl Default for OpenSkyConfig {
    fn default() -> Self {
        OpenSkyConfig {
            base_url: "https://opensky-network.org/api".to_string(),
            // Sydney basin
            bbox: BoundingBox {
                lamin: -34.3,
                lamax: -32.5,
                lomin: 149.8,
                lomax: 152.1,
            },
            // Sydney Airport (YSSY)
            reference: GeoPoint {
                lat: -33.9399,
                lon: 151.1753,
            },
            mirror_prefix: "https://cors.isomorphic-git.org/".to_string(),
            relay_url: "https://api.allorigins.win/raw".to_string(),
            attempt_timeout: fallback::DEFAULT_ATTEMPT_TIMEOUT,
        }
    }
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct FlightRecord {
    pub id: String,
    pub callsign: String,
    pub origin_country: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub on_ground: bool,
    pub heading_deg: Option<i32>,
    pub speed_knots: Option<i32>,
    pub altitude_feet: Option<i32>,
    pub distance_nm: Option<f64>,
    pub age_seconds: Option<i64>,
}

#[derive(Deserialize)]
struct StatesResponse {
    states: Option<Vec<Vec<Value>>>,
}

// ============================================================================
// State Vector Decoding
// ============================================================================

fn str_at(state: &[Value], i: usize) -> Option<&str> {
    state.get(i).and_then(Value::as_str)
}

fn f64_at(state: &[Value], i: usize) -> Option<f64> {
    state.get(i).and_then(Value::as_f64)
}

fn i64_at(state: &[Value], i: usize) -> Option<i64> {
    state.get(i).and_then(Value::as_i64)
}

/// Decode one positional OpenSky state vector into a named record.
///
/// Fixed 17-field layout, documented once here; a change upstream means a
/// single edit point:
///
/// ```text
///  0 icao24          1 callsign        2 origin_country  3 time_position
///  4 last_contact    5 longitude       6 latitude        7 baro_altitude (m)
///  8 on_ground       9 velocity (m/s) 10 true_track     11 vertical_rate
/// 12 sensors        13 geo_altitude(m)14 squawk         15 spi
/// 16 position_source
/// ```
///
/// Velocity and altitude are unit-converted here, at construction, not at
/// render time. Age is wall-clock `now` minus last_contact; missing or
/// negative ages surface as `None`, never clamped to zero.
pub fn decode_state(state: &[Value], reference: GeoPoint, now_epoch: i64) -> FlightRecord {
    let callsign = str_at(state, 1).unwrap_or("").trim().to_string();
    let lon = f64_at(state, 5);
    let lat = f64_at(state, 6);

    let distance_nm = match (lat, lon) {
        (Some(lat), Some(lon)) => {
            Some(geo::haversine_nm(reference, GeoPoint { lat, lon }).round())
        }
        _ => None,
    };

    FlightRecord {
        id: str_at(state, 0).unwrap_or("").to_string(),
        callsign: if callsign.is_empty() {
            "(no callsign)".to_string()
        } else {
            callsign
        },
        origin_country: str_at(state, 2).unwrap_or("").to_string(),
        lat,
        lon,
        on_ground: state.get(8).and_then(Value::as_bool).unwrap_or(false),
        heading_deg: f64_at(state, 10).map(|h| h.round() as i32),
        speed_knots: f64_at(state, 9).map(|v| geo::mps_to_knots(v).round() as i32),
        altitude_feet: f64_at(state, 13)
            .or_else(|| f64_at(state, 7))
            .map(|m| geo::m_to_feet(m).round() as i32),
        distance_nm,
        age_seconds: i64_at(state, 4)
            .map(|last_contact| now_epoch - last_contact)
            .filter(|age| *age >= 0),
    }
}

/// Nearest-first ranking, truncated to `limit`.
///
/// Records without a resolvable position are excluded entirely rather than
/// sorted to an arbitrary end of the list.
pub fn rank_by_distance(mut records: Vec<FlightRecord>, limit: usize) -> Vec<FlightRecord> {
    records.retain(|r| r.distance_nm.is_some());
    records.sort_by(|a, b| {
        a.distance_nm
            .partial_cmp(&b.distance_nm)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    records.truncate(limit);
    records
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct OpenSkyService {
    client: Client,
    config: OpenSkyConfig,
}

impl OpenSkyService {
    pub fn new(client: Client, config: OpenSkyConfig) -> Self {
        OpenSkyService { client, config }
    }

    fn states_url(&self) -> String {
        let b = self.config.bbox;
        format!(
            "{}/states/all?lamin={}&lomin={}&lamax={}&lomax={}",
            self.config.base_url, b.lamin, b.lomin, b.lamax, b.lomax
        )
    }

    fn strategies(&self) -> Vec<Strategy> {
        let url = self.states_url();
        vec![
            Strategy::direct("opensky-direct", &url),
            Strategy::prefixed("opensky-mirror", &self.config.mirror_prefix, &url),
            Strategy::wrapped("opensky-relay", &self.config.relay_url, &url),
        ]
    }

    async fn fetch_raw_states(&self) -> Result<Vec<Vec<Value>>> {
        let body = fallback::fetch_with_fallback(
            &self.client,
            &self.strategies(),
            self.config.attempt_timeout,
        )
        .await?;
        let payload: StatesResponse = fallback::decode_json(&body)?;
        Ok(payload.states.unwrap_or_default())
    }

    /// All decoded state vectors in the bounding box, unranked.
    pub async fn fetch_states(&self) -> Result<Vec<FlightRecord>> {
        let states = self.fetch_raw_states().await?;
        let now = Utc::now().timestamp();
        Ok(states
            .iter()
            .map(|s| decode_state(s, self.config.reference, now))
            .collect())
    }

    /// Distance-ranked flights, nearest first, truncated to `limit`.
    pub async fn fetch_ranked(&self, limit: usize) -> Result<Vec<FlightRecord>> {
        Ok(rank_by_distance(self.fetch_states().await?, limit))
    }

    /// Count of state vectors currently reported in the bounding box.
    pub async fn fetch_count(&self) -> Result<usize> {
        Ok(self.fetch_raw_states().await?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000;

    fn syd() -> GeoPoint {
        GeoPoint {
            lat: -33.9399,
            lon: 151.1753,
        }
    }

    fn state(values: Value) -> Vec<Value> {
        values.as_array().unwrap().clone()
    }

    #[test]
    fn decodes_a_full_state_vector() {
        let s = state(json!([
            "7c6b2d", "QFA1   ", "Australia", 1_699_999_990, 1_699_999_995,
            151.18, -33.95, 1200.0, false, 100.0, 87.6, -2.3,
            null, 1300.0, "3412", false, 0
        ]));
        let r = decode_state(&s, syd(), NOW);

        assert_eq!(r.id, "7c6b2d");
        assert_eq!(r.callsign, "QFA1");
        assert_eq!(r.origin_country, "Australia");
        assert!(!r.on_ground);
        assert_eq!(r.heading_deg, Some(88));
        assert_eq!(r.speed_knots, Some(194)); // 100 m/s
        assert_eq!(r.altitude_feet, Some(4265)); // geo altitude preferred
        assert_eq!(r.age_seconds, Some(5));
        assert!(r.distance_nm.is_some());
        assert!(r.distance_nm.unwrap() < 2.0);
    }

    #[test]
    fn baro_altitude_is_the_fallback() {
        let s = state(json!([
            "abc123", "", "Australia", null, null,
            151.0, -33.0, 1000.0, true, null, null, null,
            null, null, null, false, 0
        ]));
        let r = decode_state(&s, syd(), NOW);
        assert_eq!(r.callsign, "(no callsign)");
        assert_eq!(r.altitude_feet, Some(3281)); // from baro
        assert_eq!(r.speed_knots, None);
        assert_eq!(r.age_seconds, None);
        assert!(r.on_ground);
    }

    #[test]
    fn negative_age_surfaces_as_none() {
        let s = state(json!([
            "abc123", "X", "AU", null, NOW + 60,
            151.0, -33.0, null, false, null, null, null,
            null, null, null, false, 0
        ]));
        let r = decode_state(&s, syd(), NOW);
        assert_eq!(r.age_seconds, None);
    }

    #[test]
    fn missing_position_yields_no_distance() {
        let s = state(json!([
            "abc123", "X", "AU", null, null,
            null, null, null, false, null, null, null,
            null, null, null, false, 0
        ]));
        let r = decode_state(&s, syd(), NOW);
        assert_eq!(r.lat, None);
        assert_eq!(r.distance_nm, None);
    }

    fn record(id: &str, distance_nm: Option<f64>) -> FlightRecord {
        FlightRecord {
            id: id.to_string(),
            callsign: id.to_string(),
            origin_country: "AU".to_string(),
            lat: distance_nm.map(|_| -33.0),
            lon: distance_nm.map(|_| 151.0),
            on_ground: false,
            heading_deg: None,
            speed_knots: None,
            altitude_feet: None,
            distance_nm,
            age_seconds: None,
        }
    }

    #[test]
    fn ranking_is_nearest_first_and_excludes_unpositioned() {
        let ranked = rank_by_distance(
            vec![
                record("far", Some(120.0)),
                record("lost", None),
                record("near", Some(3.0)),
                record("mid", Some(40.0)),
            ],
            10,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn ranking_truncates_after_sorting() {
        let ranked = rank_by_distance(
            vec![
                record("c", Some(30.0)),
                record("a", Some(10.0)),
                record("b", Some(20.0)),
            ],
            2,
        );
        let ids: Vec<&str> = ranked.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn states_payload_with_null_states_is_empty_not_an_error() {
        let payload: StatesResponse = serde_json::from_str(r#"{"time": 1700000000, "states": null}"#).unwrap();
        assert!(payload.states.unwrap_or_default().is_empty());
    }
}
