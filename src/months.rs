// Month-key normalization for the lateness chart.
//
// Source data spells its reporting month every way imaginable: "2024-01",
// "2024-01-15", "Jan 2024", "January 2024". Everything funnels into a
// canonical "YYYY-MM" sort key plus a short display label, and the month
// selector gets a contiguous, gap-free range between the earliest and
// latest observed months.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Month selector entries are capped to the most recent two years.
pub const MONTH_RANGE_CAP: usize = 24;

const MONTH_ABBREVS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MonthEntry {
    pub key: String,
    pub label: String,
}

fn is_year_month(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 7
        && b[4] == b'-'
        && b[..4].iter().all(u8::is_ascii_digit)
        && b[5..].iter().all(u8::is_ascii_digit)
}

const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d %B %Y", "%d %b %Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

fn parse_any_date(raw: &str) -> Option<(i32, u32)> {
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(raw, fmt) {
            return Some((d.year(), d.month()));
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(d) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some((d.year(), d.month()));
        }
    }
    None
}

/// Find a standalone 4-digit year token (19xx/20xx) in free text.
fn find_year(raw: &str) -> Option<i32> {
    let b = raw.as_bytes();
    for i in 0..b.len().saturating_sub(3) {
        let window = &b[i..i + 4];
        if !window.iter().all(u8::is_ascii_digit) {
            continue;
        }
        if !(window.starts_with(b"19") || window.starts_with(b"20")) {
            continue;
        }
        let bounded_left = i == 0 || !b[i - 1].is_ascii_digit();
        let bounded_right = i + 4 == b.len() || !b[i + 4].is_ascii_digit();
        if bounded_left && bounded_right {
            return std::str::from_utf8(window).ok()?.parse().ok();
        }
    }
    None
}

fn month_from_abbrev(raw: &str) -> Option<u32> {
    let prefix: String = raw.chars().take(3).collect::<String>().to_lowercase();
    MONTH_ABBREVS
        .iter()
        .position(|m| m.to_lowercase() == prefix)
        .map(|i| i as u32 + 1)
}

/// Best-effort normalization of a raw month string to "YYYY-MM".
///
/// Tries, in order: already canonical, general date parsing, then a year
/// token plus leading month-name match. Unrecognizable input comes back
/// trimmed but otherwise unchanged; this never fails.
pub fn normalize_month(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    if is_year_month(raw) {
        return raw.to_string();
    }
    if let Some((year, month)) = parse_any_date(raw) {
        return format!("{:04}-{:02}", year, month);
    }
    if let (Some(year), Some(month)) = (find_year(raw), month_from_abbrev(raw)) {
        return format!("{:04}-{:02}", year, month);
    }
    raw.to_string()
}

/// Display label for a canonical key ("2024-09" -> "Sep 2024").
/// Non-canonical keys are shown as-is.
pub fn month_label(key: &str) -> String {
    match split_key(key) {
        Some((year, month)) if (1..=12).contains(&month) => {
            format!("{} {}", MONTH_ABBREVS[month as usize - 1], year)
        }
        _ => key.to_string(),
    }
}

fn split_key(key: &str) -> Option<(i32, u32)> {
    if !is_year_month(key) {
        return None;
    }
    let year = key[..4].parse().ok()?;
    let month = key[5..].parse().ok()?;
    Some((year, month))
}

/// Enumerate every month between the earliest and latest observed keys,
/// inclusive, so the month selector has no holes even when a month
/// contributed zero usable rows. The range is capped to the most recent
/// `MONTH_RANGE_CAP` entries, trimming from the oldest end.
pub fn pad_month_range<S: AsRef<str>>(keys: &[S]) -> Vec<MonthEntry> {
    let mut observed: Vec<(i32, u32)> = keys
        .iter()
        .filter_map(|k| split_key(k.as_ref()))
        .filter(|(_, m)| (1..=12).contains(m))
        .collect();
    observed.sort_unstable();

    let (Some(&first), Some(&last)) = (observed.first(), observed.last()) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let (mut year, mut month) = first;
    loop {
        let key = format!("{:04}-{:02}", year, month);
        entries.push(MonthEntry {
            label: month_label(&key),
            key,
        });
        if (year, month) >= last {
            break;
        }
        month += 1;
        if month > 12 {
            month = 1;
            year += 1;
        }
    }

    if entries.len() > MONTH_RANGE_CAP {
        entries.drain(..entries.len() - MONTH_RANGE_CAP);
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_keys_pass_through_and_are_idempotent() {
        for key in ["2024-01", "2019-12", "2025-09"] {
            assert_eq!(normalize_month(key), key);
            assert_eq!(normalize_month(&normalize_month(key)), normalize_month(key));
        }
    }

    #[test]
    fn full_dates_collapse_to_their_month() {
        assert_eq!(normalize_month("2025-09-01"), "2025-09");
        assert_eq!(normalize_month("15/03/2024"), "2024-03");
        assert_eq!(normalize_month("1 September 2025"), "2025-09");
        assert_eq!(normalize_month("2024-06-30T00:00:00"), "2024-06");
    }

    #[test]
    fn month_name_plus_year_token_is_recognized() {
        assert_eq!(normalize_month("Sep 2025"), "2025-09");
        assert_eq!(normalize_month("September 2025"), "2025-09");
        assert_eq!(normalize_month("  jan 2019 "), "2019-01");
    }

    #[test]
    fn unrecognizable_input_comes_back_trimmed() {
        assert_eq!(normalize_month("  whenever  "), "whenever");
        assert_eq!(normalize_month(""), "");
        // Idempotent even on the passthrough path.
        assert_eq!(normalize_month(&normalize_month("whenever")), "whenever");
    }

    #[test]
    fn labels_come_from_the_month_table() {
        assert_eq!(month_label("2024-09"), "Sep 2024");
        assert_eq!(month_label("2024-13"), "2024-13");
        assert_eq!(month_label("garbage"), "garbage");
    }

    #[test]
    fn pad_fills_gaps_between_min_and_max() {
        let entries = pad_month_range(&["2024-01", "2024-05"]);
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-01", "2024-02", "2024-03", "2024-04", "2024-05"]);
        assert_eq!(entries[1].label, "Feb 2024");
    }

    #[test]
    fn pad_crosses_year_boundaries() {
        let entries = pad_month_range(&["2023-11", "2024-02"]);
        let keys: Vec<&str> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);
    }

    #[test]
    fn pad_caps_to_most_recent_entries() {
        let entries = pad_month_range(&["2020-01", "2024-12"]);
        assert_eq!(entries.len(), MONTH_RANGE_CAP);
        assert_eq!(entries.first().unwrap().key, "2023-01");
        assert_eq!(entries.last().unwrap().key, "2024-12");
    }

    #[test]
    fn pad_ignores_non_canonical_keys() {
        let entries = pad_month_range(&["whenever", "2024-03", "2024-04"]);
        assert_eq!(entries.len(), 2);
        assert!(pad_month_range::<&str>(&[]).is_empty());
    }
}
