// Airline on-time performance for Sydney departures, from BITRE
// (Bureau of Infrastructure and Transport Research Economics).
//
// The dataset is reachable three ways, tried in order: a CSV snapshot
// shipped with the deployment, the data.gov.au datastore JSON API, and the
// raw CSV download (direct, then via relay). Column names drift between
// dataset revisions, so every logical field resolves through an alias list.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::fallback::{self, FetchError, Result, Strategy};
use crate::months::{self, MonthEntry};
use crate::tabular::{self, RawRow};

// ============================================================================
// Configuration
// ============================================================================

/// Minutes of assumed delay for a fully-late month. The proxy formula
/// `proxy_minutes × late_fraction` is a display heuristic inherited from the
/// first version of the chart; the constant is named and overridable rather
/// than baked into the arithmetic.
pub const PROXY_MINUTES_PER_FULLY_LATE: f64 = 15.0;

/// Groups backed by fewer observations than this are dropped; a
/// single-flight average is noise, not a statistic.
pub const MIN_SAMPLE_SIZE: u32 = 3;

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub proxy_minutes_per_fully_late: f64,
    pub min_sample_size: u32,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        AggregateOptions {
            proxy_minutes_per_fully_late: PROXY_MINUTES_PER_FULLY_LATE,
            min_sample_size: MIN_SAMPLE_SIZE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitreConfig {
    /// CSV snapshot shipped with the deployment; first strategy.
    pub local_csv: PathBuf,
    /// data.gov.au datastore search endpoint, newest records first.
    pub dataset_json_url: String,
    /// Raw CSV download from BITRE.
    pub csv_download_url: String,
    pub mirror_prefix: String,
    /// Departure-port scope; `None` aggregates all ports.
    pub dep_port: Option<String>,
    pub attempt_timeout: Duration,
    pub options: AggregateOptions,
}

impl Default for BitreConfig {
    fn default() -> Self {
        BitreConfig {
            local_csv: PathBuf::from("data/bitre_otp_latest.csv"),
            dataset_json_url: "https://data.gov.au/data/api/3/action/datastore_search?resource_id=otp-time-series-web&limit=32000&sort=year%20desc,month_num%20desc".to_string(),
            csv_download_url: "https://www.bitre.gov.au/sites/default/files/documents/otp_time_series_web.csv".to_string(),
            mirror_prefix: "https://cors.isomorphic-git.org/".to_string(),
            dep_port: Some("Sydney".to_string()),
            attempt_timeout: fallback::DEFAULT_ATTEMPT_TIMEOUT,
            options: AggregateOptions::default(),
        }
    }
}

// ============================================================================
// Column Aliases
// ============================================================================

const COL_AIRLINE: &[&str] = &["airline", "airline name", "carrier"];
const COL_DEP_PORT: &[&str] = &[
    "departing_port",
    "departure port",
    "departure airport",
    "dep airport",
    "from",
    "port of departure",
];
const COL_MONTH: &[&str] = &["month", "period", "reporting month", "year_month"];
const COL_YEAR: &[&str] = &["year"];
const COL_MONTH_NUM: &[&str] = &["month_num", "month number", "month_no"];
const COL_ONTIME_PCT: &[&str] = &[
    "on_time_departures_pct",
    "on time departures (%)",
    "on-time departures (%)",
    "on time departures percent",
    "departures on time (%)",
];
const COL_ONTIME_COUNT: &[&str] = &[
    "departures_on_time",
    "on time departures",
    "ontime_departures",
];
const COL_AVG_DELAY: &[&str] = &[
    "avg_departure_delay_mins",
    "average departure delay (minutes)",
    "avg departure delay (mins)",
    "average departure delay (mins)",
    "avg dep delay (min)",
];
const COL_FLIGHTS: &[&str] = &[
    "sectors_flown",
    "sectors flown",
    "total departures",
    "departures",
    "number of departures",
];

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DelayRecord {
    pub month_key: String,
    pub month_label: String,
    pub airline: String,
    pub avg_delay_minutes: Option<f64>,
    /// True only when every contributing row carried a source-reported
    /// delay; false means the figure is (at least partly) the on-time proxy.
    pub has_explicit_delay: bool,
    pub sample_size: u32,
    pub pct_delayed: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct DelaySummary {
    pub months: Vec<MonthEntry>,
    pub by_month: HashMap<String, Vec<DelayRecord>>,
    pub source: String,
}

// ============================================================================
// Row-level Derivation
// ============================================================================

/// Parse a numeric field, tolerating `%` suffixes and thousands separators.
/// Missing or non-numeric values are `None`, never zero.
fn parse_num(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(['%', ','], "");
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse().ok()
}

/// Resolve the reporting month, either from a single month column or from
/// split year / month-number columns.
fn row_month_key(row: &RawRow) -> String {
    let raw = tabular::extract(row, COL_MONTH, "");
    if !raw.is_empty() {
        return months::normalize_month(raw);
    }
    let year = parse_num(tabular::extract(row, COL_YEAR, ""));
    let month = parse_num(tabular::extract(row, COL_MONTH_NUM, ""));
    match (year, month) {
        (Some(y), Some(m)) if (1.0..=12.0).contains(&m) => {
            format!("{:04}-{:02}", y as i32, m as u32)
        }
        _ => String::new(),
    }
}

/// One row's lateness in minutes, with provenance.
///
/// Preference order: a source-reported average delay (explicit); else a
/// proxy scaled from the late fraction, which comes from an on-time
/// percentage or from on-time / operated counts. Rows with none of these
/// have a derivation gap and are skipped, they are not an error.
fn row_lateness(row: &RawRow, options: &AggregateOptions) -> Option<(f64, bool)> {
    if let Some(avg) = parse_num(tabular::extract(row, COL_AVG_DELAY, "")) {
        return Some((avg, true));
    }

    let late_fraction = if let Some(pct) = parse_num(tabular::extract(row, COL_ONTIME_PCT, "")) {
        Some((100.0 - pct) / 100.0)
    } else {
        let on_time = parse_num(tabular::extract(row, COL_ONTIME_COUNT, ""));
        let operated = parse_num(tabular::extract(row, COL_FLIGHTS, ""));
        match (on_time, operated) {
            (Some(on_time), Some(operated)) if operated > 0.0 => Some(1.0 - on_time / operated),
            _ => None,
        }
    };

    late_fraction.map(|f| (options.proxy_minutes_per_fully_late * f.clamp(0.0, 1.0), false))
}

/// Delayed-flight count for the percentage-delayed figure, where derivable.
fn row_delayed_flights(row: &RawRow, flights: Option<f64>) -> Option<f64> {
    let on_time = parse_num(tabular::extract(row, COL_ONTIME_COUNT, ""));
    if let (Some(on_time), Some(flights)) = (on_time, flights) {
        return Some((flights - on_time).max(0.0));
    }
    let pct = parse_num(tabular::extract(row, COL_ONTIME_PCT, ""));
    if let (Some(pct), Some(flights)) = (pct, flights) {
        return Some(((100.0 - pct) / 100.0 * flights).round().max(0.0));
    }
    None
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ============================================================================
// Aggregation
// ============================================================================

#[derive(Default)]
struct Group {
    sum: f64,
    n: u32,
    explicit_n: u32,
    flights: f64,
    delayed: f64,
}

/// Group per-row delay observations by (month, airline) and average them.
///
/// "All Airlines" rollup rows are excluded so the synthetic aggregate never
/// competes with real carriers; groups below the sample-size threshold are
/// dropped; output is sorted worst-first.
pub fn aggregate(rows: &[RawRow], scope: Option<&str>, options: &AggregateOptions) -> Vec<DelayRecord> {
    let mut groups: HashMap<(String, String), Group> = HashMap::new();

    for row in rows {
        if let Some(port) = scope {
            let dep = tabular::extract(row, COL_DEP_PORT, "");
            if !dep.eq_ignore_ascii_case(port) {
                continue;
            }
        }

        let month_key = row_month_key(row);
        if month_key.is_empty() {
            continue;
        }

        let airline = tabular::extract(row, COL_AIRLINE, "Unknown").to_string();
        if airline.eq_ignore_ascii_case("all airlines") {
            continue;
        }

        let Some((lateness, explicit)) = row_lateness(row, options) else {
            continue;
        };

        let flights = parse_num(tabular::extract(row, COL_FLIGHTS, ""));
        let group = groups.entry((month_key, airline)).or_default();
        group.sum += lateness;
        group.n += 1;
        if explicit {
            group.explicit_n += 1;
        }
        if let Some(f) = flights {
            group.flights += f;
        }
        if let Some(d) = row_delayed_flights(row, flights) {
            group.delayed += d;
        }
    }

    let mut records: Vec<DelayRecord> = groups
        .into_iter()
        .filter_map(|((month_key, airline), g)| {
            let sample_size = if g.flights > 0.0 {
                g.flights.round() as u32
            } else {
                g.n
            };
            if sample_size < options.min_sample_size {
                return None;
            }
            let pct_delayed = if g.delayed > 0.0 && g.flights > 0.0 {
                Some(round1(g.delayed / g.flights * 100.0))
            } else {
                None
            };
            Some(DelayRecord {
                month_label: months::month_label(&month_key),
                month_key,
                airline,
                avg_delay_minutes: Some(round1(g.sum / g.n as f64)),
                has_explicit_delay: g.n > 0 && g.explicit_n == g.n,
                sample_size,
                pct_delayed,
            })
        })
        .collect();

    records.sort_by(|a, b| {
        b.avg_delay_minutes
            .partial_cmp(&a.avg_delay_minutes)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    records
}

/// Aggregate plus the gap-filled month index, keyed for the chart.
pub fn build_summary(rows: &[RawRow], scope: Option<&str>, options: &AggregateOptions) -> DelaySummary {
    let records = aggregate(rows, scope, options);

    let keys: Vec<&str> = records.iter().map(|r| r.month_key.as_str()).collect();
    let months = months::pad_month_range(&keys);

    // Keep only months inside the (capped) index window.
    let mut by_month: HashMap<String, Vec<DelayRecord>> = HashMap::new();
    for entry in &months {
        by_month.insert(entry.key.clone(), Vec::new());
    }
    for record in records {
        if let Some(bucket) = by_month.get_mut(&record.month_key) {
            bucket.push(record);
        }
    }

    DelaySummary {
        months,
        by_month,
        source: "BITRE".to_string(),
    }
}

// ============================================================================
// Payload Decoding
// ============================================================================

#[derive(Deserialize)]
struct DatastoreResponse {
    result: DatastoreResult,
}

#[derive(Deserialize)]
struct DatastoreResult {
    records: Vec<serde_json::Map<String, Value>>,
}

fn value_to_field(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Turn a successful payload into rows, whatever shape it arrived in.
///
/// The fallback chain can hand back either CSV text (snapshot file, raw
/// download) or a datastore JSON envelope; a leading `{` tells them apart.
pub fn rows_from_payload(body: &str) -> Result<Vec<RawRow>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('{') {
        let payload: DatastoreResponse = fallback::decode_json(trimmed)?;
        Ok(payload
            .result
            .records
            .iter()
            .map(|record| {
                record
                    .iter()
                    .map(|(k, v)| (k.trim().to_lowercase(), value_to_field(v)))
                    .collect()
            })
            .collect())
    } else if trimmed.is_empty() {
        Err(FetchError::Malformed("empty dataset payload".to_string()))
    } else {
        let table = tabular::parse_delimited(body);
        println!(
            "   ✓ Parsed {} OTP rows ({} columns)",
            table.rows.len(),
            table.headers.len()
        );
        Ok(table.rows)
    }
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct BitreService {
    client: Client,
    config: BitreConfig,
}

impl BitreService {
    pub fn new(client: Client, config: BitreConfig) -> Self {
        BitreService { client, config }
    }

    fn strategies(&self) -> Vec<Strategy> {
        vec![
            Strategy::local("bitre-snapshot", &self.config.local_csv),
            Strategy::direct("bitre-datastore", &self.config.dataset_json_url),
            Strategy::direct("bitre-csv", &self.config.csv_download_url),
            Strategy::prefixed(
                "bitre-csv-mirror",
                &self.config.mirror_prefix,
                &self.config.csv_download_url,
            ),
        ]
    }

    pub async fn fetch_summary(&self) -> Result<DelaySummary> {
        let body = fallback::fetch_with_fallback(
            &self.client,
            &self.strategies(),
            self.config.attempt_timeout,
        )
        .await?;
        let rows = rows_from_payload(&body)?;
        Ok(build_summary(
            &rows,
            self.config.dep_port.as_deref(),
            &self.config.options,
        ))
    }
}
