//! Area-bounded filtering of the master table.

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use crime_atlas_incident_models::{BoundingBox, IncidentRecord, OffenseFilter};

/// Filter for an area-bounded aggregation.
#[derive(Debug, Clone)]
pub struct AreaQuery {
    /// Geographic bounds, inclusive on every edge.
    pub bbox: BoundingBox,
    /// First day included.
    pub start_date: NaiveDate,
    /// Last day included (the whole day counts).
    pub end_date: NaiveDate,
    /// Offense filter.
    pub offenses: OffenseFilter,
}

impl AreaQuery {
    fn time_range(&self) -> (NaiveDateTime, Option<NaiveDateTime>) {
        let start = self.start_date.and_time(NaiveTime::MIN);
        let end = self
            .end_date
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN));
        (start, end)
    }
}

/// Returns the records with coordinates inside the box, a timestamp in
/// `[start_date, end_date + 1 day)`, and a matching offense.
#[must_use]
pub fn query_area<'a>(records: &'a [IncidentRecord], query: &AreaQuery) -> Vec<&'a IncidentRecord> {
    let (start, end) = query.time_range();

    records
        .iter()
        .filter(|r| {
            r.lon_lat()
                .is_some_and(|(lon, lat)| query.bbox.contains(lon, lat))
        })
        .filter(|r| r.occurred_at >= start && end.is_none_or(|end| r.occurred_at < end))
        .filter(|r| query.offenses.matches(&r.offense))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::record;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn filters_by_box_dates_and_offense() {
        let records = vec![
            record("2020-01-01 00:00:00", "THEFT", -77.0, 38.9),
            record("2020-01-31 23:59:59", "THEFT", -77.0, 38.9),
            record("2020-02-01 00:00:00", "THEFT", -77.0, 38.9),
            record("2020-01-15 12:00:00", "THEFT", -76.0, 38.9),
            record("2020-01-15 12:00:00", "ROBBERY", -77.0, 38.9),
        ];
        let mut no_coords = record("2020-01-15 12:00:00", "THEFT", 0.0, 0.0);
        no_coords.latitude = None;
        let mut records = records;
        records.push(no_coords);

        let query = AreaQuery {
            bbox: BoundingBox::new(-77.1, 38.8, -76.9, 39.0),
            start_date: date("2020-01-01"),
            end_date: date("2020-01-31"),
            offenses: OffenseFilter::from_request(vec![Some("theft")]),
        };
        let matched = query_area(&records, &query);
        assert_eq!(matched.len(), 2);

        let all_offenses = AreaQuery {
            offenses: OffenseFilter::All,
            ..query
        };
        assert_eq!(query_area(&records, &all_offenses).len(), 3);
    }
}
