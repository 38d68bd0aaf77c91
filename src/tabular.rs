// Minimal delimited-text handling for the on-time-performance feed.
//
// The upstream CSVs are just regular enough to not need a CSV engine, and
// just irregular enough (renamed columns between revisions, quoted commas,
// ragged rows) that the exact quoting semantics are pinned down here:
// fields are comma-separated, optionally wrapped in double quotes, a doubled
// quote inside a quoted field is a literal quote, and a comma inside quotes
// is not a separator.

use std::collections::HashMap;

/// One parsed row: lower-cased header name -> trimmed field value.
pub type RawRow = HashMap<String, String>;

pub struct Table {
    /// Original header spellings, in column order.
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

/// Split one line on unquoted commas, unescaping doubled quotes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parse delimited text into header-keyed rows.
///
/// Blank lines are skipped. A row shorter than the header list gets empty
/// strings for the missing trailing fields; this never fails, empty input
/// just yields an empty table.
pub fn parse_delimited(text: &str) -> Table {
    let mut lines = text
        .replace('\r', "")
        .split('\n')
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>()
        .into_iter();

    let Some(header_line) = lines.next() else {
        return Table {
            headers: Vec::new(),
            rows: Vec::new(),
        };
    };

    let headers: Vec<String> = split_line(&header_line)
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let keys: Vec<String> = headers.iter().map(|h| h.to_lowercase()).collect();

    let mut rows = Vec::new();
    for line in lines {
        let fields = split_line(&line);
        let mut row = RawRow::with_capacity(keys.len());
        for (i, key) in keys.iter().enumerate() {
            let value = fields.get(i).map(|f| f.trim()).unwrap_or("");
            row.insert(key.clone(), value.to_string());
        }
        rows.push(row);
    }

    Table { headers, rows }
}

/// Resolve a logical field against a row through an ordered alias list.
///
/// Upstream datasets rename columns between revisions ("Average Delay" one
/// year, "avg_departure_delay_mins" the next); the first alias present with
/// a non-empty value wins, otherwise `default` is returned.
pub fn extract<'a>(row: &'a RawRow, aliases: &[&str], default: &'a str) -> &'a str {
    for alias in aliases {
        let key = alias.to_lowercase();
        if let Some(value) = row.get(key.as_str()) {
            if !value.is_empty() {
                return value;
            }
        }
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_comma_is_not_a_separator() {
        let table = parse_delimited("a,\"b,c\",d\n1,\"2,3\",4");
        assert_eq!(table.headers, vec!["a", "b,c", "d"]);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row["a"], "1");
        assert_eq!(row["b,c"], "2,3");
        assert_eq!(row["d"], "4");
    }

    #[test]
    fn doubled_quotes_unescape() {
        let table = parse_delimited("name\n\"say \"\"hi\"\"\"");
        assert_eq!(table.rows[0]["name"], "say \"hi\"");
    }

    #[test]
    fn short_rows_pad_with_empty_strings() {
        let table = parse_delimited("a,b,c\n1,2");
        let row = &table.rows[0];
        assert_eq!(row["a"], "1");
        assert_eq!(row["b"], "2");
        assert_eq!(row["c"], "");
    }

    #[test]
    fn blank_lines_and_crlf_are_ignored() {
        let table = parse_delimited("a,b\r\n\r\n1,2\r\n\r\n3,4\r\n");
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1]["b"], "4");
    }

    #[test]
    fn empty_input_yields_empty_table() {
        let table = parse_delimited("");
        assert!(table.headers.is_empty());
        assert!(table.rows.is_empty());
    }

    #[test]
    fn headers_keep_original_case_but_keys_are_lowered() {
        let table = parse_delimited("Airline,Month\nQantas,2024-01");
        assert_eq!(table.headers, vec!["Airline", "Month"]);
        assert_eq!(table.rows[0]["airline"], "Qantas");
        assert_eq!(table.rows[0]["month"], "2024-01");
    }

    #[test]
    fn extract_honors_alias_precedence() {
        let table = parse_delimited("carrier,airline\nQF-code,Qantas");
        let row = &table.rows[0];
        assert_eq!(extract(row, &["airline", "carrier"], ""), "Qantas");
        assert_eq!(extract(row, &["carrier", "airline"], ""), "QF-code");
    }

    #[test]
    fn extract_skips_empty_values_and_falls_back() {
        let table = parse_delimited("airline,carrier\n,Qantas");
        let row = &table.rows[0];
        assert_eq!(extract(row, &["airline", "carrier"], ""), "Qantas");
        assert_eq!(extract(row, &["missing one", "also missing"], "n/a"), "n/a");
    }

    #[test]
    fn extract_is_case_insensitive_on_aliases() {
        let table = parse_delimited("Average Delay (Mins)\n12.5");
        let row = &table.rows[0];
        assert_eq!(extract(row, &["AVERAGE DELAY (MINS)"], ""), "12.5");
    }
}
