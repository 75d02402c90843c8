//! Resampling of incident timestamps into count series.

use std::path::Path;

use chrono::NaiveDateTime;
use crime_atlas_forecast_models::{AggregatedSeries, Frequency, SeriesPoint};
use crime_atlas_ingest::extract::read_extract;

use crate::ForecastError;

/// A count series together with the bucket grid it was built on.
#[derive(Debug, Clone, PartialEq)]
pub struct CountSeries {
    /// Frequency of the buckets.
    pub frequency: Frequency,
    /// Unit ordinal of the first period of the first bucket.
    pub origin: i64,
    /// One point per bucket, in order, including empty buckets.
    pub points: Vec<SeriesPoint>,
}

impl CountSeries {
    /// Creates a series with no buckets.
    #[must_use]
    pub const fn empty(frequency: Frequency) -> Self {
        Self {
            frequency,
            origin: 0,
            points: Vec::new(),
        }
    }

    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns `true` if the series has no buckets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Bucket counts in order.
    #[must_use]
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Sum of all counts.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.points.iter().map(|p| p.value).sum()
    }

    /// Unit ordinal of the first period after the last bucket.
    #[must_use]
    pub fn next_bucket_start(&self) -> i64 {
        self.frequency
            .bucket_start(self.origin, i64::try_from(self.len()).unwrap_or(i64::MAX))
    }

    /// Splits the series into the first `at` buckets and the rest.
    #[must_use]
    pub fn split_at(&self, at: usize) -> (Self, Self) {
        let at = at.min(self.len());
        let (head, tail) = self.points.split_at(at);
        let tail_origin = self
            .frequency
            .bucket_start(self.origin, i64::try_from(at).unwrap_or(i64::MAX));
        (
            Self {
                frequency: self.frequency,
                origin: self.origin,
                points: head.to_vec(),
            },
            Self {
                frequency: self.frequency,
                origin: tail_origin,
                points: tail.to_vec(),
            },
        )
    }

    /// Converts to the chart layout.
    #[must_use]
    pub fn to_chart(&self) -> AggregatedSeries {
        AggregatedSeries::from(self.points.as_slice())
    }
}

/// Counts `timestamps` per bucket of `frequency`, from the bucket holding
/// the earliest timestamp to the one holding the latest. Buckets without
/// incidents are present with a count of zero.
#[must_use]
pub fn aggregate(timestamps: &[NaiveDateTime], frequency: Frequency) -> CountSeries {
    let (Some(first), Some(last)) = (timestamps.iter().min(), timestamps.iter().max()) else {
        return CountSeries::empty(frequency);
    };

    let origin = frequency.unit.ordinal(*first);
    let bucket_count = usize::try_from(frequency.bucket_index(origin, *last)).unwrap_or(0) + 1;

    let mut counts = vec![0u64; bucket_count];
    for ts in timestamps {
        if let Ok(index) = usize::try_from(frequency.bucket_index(origin, *ts)) {
            counts[index] += 1;
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let points = counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| {
            let start = frequency.bucket_start(origin, i64::try_from(index).unwrap_or(i64::MAX));
            SeriesPoint {
                timestamp: frequency.bucket_label(start).unwrap_or_default(),
                value: count as f64,
            }
        })
        .collect();

    CountSeries {
        frequency,
        origin,
        points,
    }
}

/// Reads an extract file and aggregates its timestamps.
///
/// # Errors
///
/// Returns [`ForecastError::Ingest`] if the extract cannot be read.
pub fn aggregate_extract(path: &Path, frequency: Frequency) -> Result<CountSeries, ForecastError> {
    let records = read_extract(path)?;
    let timestamps: Vec<NaiveDateTime> = records.iter().map(|r| r.occurred_at).collect();
    let series = aggregate(&timestamps, frequency);
    log::info!(
        "Aggregated {} records from {} into {} {frequency} buckets",
        timestamps.len(),
        path.display(),
        series.len()
    );
    Ok(series)
}

#[cfg(test)]
mod tests {
    use crime_atlas_incident_models::parse_timestamp;

    use super::*;

    fn timestamps(values: &[&str]) -> Vec<NaiveDateTime> {
        values.iter().map(|v| parse_timestamp(v).unwrap()).collect()
    }

    #[test]
    fn fills_empty_months_with_zero() {
        let ts = timestamps(&[
            "2020-01-03 10:00:00",
            "2020-01-20 10:00:00",
            "2020-04-01 00:00:00",
        ]);
        let series = aggregate(&ts, "ME".parse().unwrap());
        let chart = series.to_chart();

        assert_eq!(
            chart.timestamps,
            vec![
                "2020-01-31T00:00:00",
                "2020-02-29T00:00:00",
                "2020-03-31T00:00:00",
                "2020-04-30T00:00:00",
            ]
        );
        assert_eq!(chart.values, vec![2.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn counts_sum_to_input_length() {
        let ts = timestamps(&[
            "2021-03-01 00:00:00",
            "2021-03-01 23:59:59",
            "2021-03-09 12:00:00",
            "2021-02-27 12:00:00",
            "2021-03-15 12:00:00",
        ]);
        for freq in ["D", "W", "2W", "MS", "QE", "YS", "h"] {
            let series = aggregate(&ts, freq.parse().unwrap());
            #[allow(clippy::cast_precision_loss)]
            let expected = ts.len() as f64;
            assert!((series.total() - expected).abs() < f64::EPSILON, "{freq}");
        }
    }

    #[test]
    fn empty_input_gives_empty_series() {
        let series = aggregate(&[], "D".parse().unwrap());
        assert!(series.is_empty());
        assert!(series.to_chart().is_empty());
    }

    #[test]
    fn split_keeps_bucket_grid() {
        let ts = timestamps(&["2020-01-01", "2020-02-01", "2020-03-01", "2020-04-01"]);
        let series = aggregate(&ts, "MS".parse().unwrap());
        let (head, tail) = series.split_at(3);
        assert_eq!(head.len(), 3);
        assert_eq!(tail.len(), 1);
        assert_eq!(head.next_bucket_start(), tail.origin);
        assert_eq!(series.next_bucket_start(), tail.next_bucket_start());
    }
}
