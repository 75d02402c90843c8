//! Normalisation of raw yearly records into master table rows.

use chrono::{DateTime, Datelike as _, NaiveDateTime};
use crime_atlas_incident_models::{
    IncidentRecord, LATITUDE_COLUMN, LONGITUDE_COLUMN, OFFENSE_COLUMN, SOURCE_DATE_FIELD,
    parse_timestamp,
};
use serde_json::Value;

use crate::{IngestError, RawRecord};

/// Inclusive range of years kept in the master table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearWindow {
    /// First year kept.
    pub min_year: i32,
    /// Last year kept.
    pub max_year: i32,
}

impl Default for YearWindow {
    fn default() -> Self {
        Self {
            min_year: 2014,
            max_year: 2024,
        }
    }
}

impl YearWindow {
    /// Returns `true` if `year` lies within the window.
    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        year >= self.min_year && year <= self.max_year
    }
}

/// Converts raw records into master table rows.
///
/// `START_DATE` becomes the time column. Rows without a parsable time or
/// an offense are dropped, as are rows outside `window`. The result is
/// sorted by time.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if no record carries
/// `START_DATE` or `OFFENSE` at all.
pub fn preprocess(
    raw: &[RawRecord],
    window: YearWindow,
) -> Result<Vec<IncidentRecord>, IngestError> {
    log::info!("Preprocessing {} raw records", raw.len());

    if raw.is_empty() {
        log::warn!("No raw records to preprocess");
        return Ok(Vec::new());
    }

    for column in [SOURCE_DATE_FIELD, OFFENSE_COLUMN] {
        if !raw.iter().any(|r| r.contains_key(column)) {
            return Err(IngestError::MissingColumn {
                column: column.to_string(),
            });
        }
    }

    let mut missing = 0usize;
    let mut outside_window = 0usize;
    let mut records = Vec::with_capacity(raw.len());

    for r in raw {
        let occurred_at = r.get(SOURCE_DATE_FIELD).and_then(value_as_timestamp);
        let offense = r.get(OFFENSE_COLUMN).and_then(value_as_text);

        let (Some(occurred_at), Some(offense)) = (occurred_at, offense) else {
            missing += 1;
            continue;
        };

        if !window.contains(occurred_at.year()) {
            outside_window += 1;
            continue;
        }

        records.push(IncidentRecord {
            occurred_at,
            offense,
            latitude: r.get(LATITUDE_COLUMN).and_then(value_as_f64),
            longitude: r.get(LONGITUDE_COLUMN).and_then(value_as_f64),
            ccn: r.get("CCN").and_then(value_as_text),
            shift: r.get("SHIFT").and_then(value_as_text),
            method: r.get("METHOD").and_then(value_as_text),
            block: r.get("BLOCK").and_then(value_as_text),
            ward: r.get("WARD").and_then(value_as_text),
        });
    }

    if missing > 0 {
        log::info!("Dropped {missing} records missing a time or offense");
    }
    if outside_window > 0 {
        log::info!(
            "Dropped {outside_window} records outside {}-{}",
            window.min_year,
            window.max_year
        );
    }

    records.sort_by_key(|r| r.occurred_at);

    log::info!("Preprocessing complete: {} records kept", records.len());
    Ok(records)
}

/// Strings go through [`parse_timestamp`]; numbers are epoch milliseconds.
fn value_as_timestamp(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::String(s) => parse_timestamp(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(|dt| dt.naive_utc()),
        _ => None,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(value: serde_json::Value) -> RawRecord {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn keeps_window_and_sorts_by_time() {
        let input = vec![
            raw(json!({"START_DATE": "2020/06/01 00:00:00+00", "OFFENSE": "ROBBERY", "WARD": 6})),
            raw(json!({"START_DATE": "2019/06/01 00:00:00+00", "OFFENSE": "THEFT/OTHER",
                       "longitude": -77.0, "latitude": 38.9})),
            raw(json!({"START_DATE": "2025/01/01 00:00:00+00", "OFFENSE": "ARSON"})),
            raw(json!({"START_DATE": "garbage", "OFFENSE": "ARSON"})),
            raw(json!({"START_DATE": "2020/01/01 00:00:00+00", "OFFENSE": null})),
        ];

        let records = preprocess(&input, YearWindow::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].offense, "THEFT/OTHER");
        assert_eq!(records[0].lon_lat(), Some((-77.0, 38.9)));
        assert_eq!(records[1].offense, "ROBBERY");
        assert_eq!(records[1].ward.as_deref(), Some("6"));
    }

    #[test]
    fn accepts_epoch_millisecond_dates() {
        let input = vec![raw(json!({"START_DATE": 1_577_836_800_000_i64, "OFFENSE": "HOMICIDE"}))];
        let records = preprocess(&input, YearWindow::default()).unwrap();
        assert_eq!(records[0].occurred_at.to_string(), "2020-01-01 00:00:00");
    }

    #[test]
    fn requires_date_and_offense_columns() {
        let no_date = vec![raw(json!({"OFFENSE": "ROBBERY"}))];
        assert!(matches!(
            preprocess(&no_date, YearWindow::default()),
            Err(IngestError::MissingColumn { column }) if column == "START_DATE"
        ));

        let no_offense = vec![raw(json!({"START_DATE": "2020-01-01"}))];
        assert!(matches!(
            preprocess(&no_offense, YearWindow::default()),
            Err(IngestError::MissingColumn { column }) if column == "OFFENSE"
        ));
    }

    #[test]
    fn custom_window() {
        let input = vec![raw(json!({"START_DATE": "2025-03-01", "OFFENSE": "ARSON"}))];
        let window = YearWindow {
            min_year: 2014,
            max_year: 2025,
        };
        assert_eq!(preprocess(&input, window).unwrap().len(), 1);
    }
}
