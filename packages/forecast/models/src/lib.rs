#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Types shared by the forecasting library and the API: resampling
//! frequencies, ARIMA orders, and count series / forecast points.

pub mod frequency;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub use frequency::{Frequency, FrequencyUnit, LABEL_FORMAT, ParseFrequencyError};

/// Largest accepted value of each ARIMA order component.
pub const MAX_ORDER_COMPONENT: usize = 10;

/// The `(p, d, q)` order of an ARIMA model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[usize; 3]", into = "[usize; 3]")]
pub struct ArimaOrder {
    /// Autoregressive order.
    pub p: usize,
    /// Degree of differencing.
    pub d: usize,
    /// Moving-average order.
    pub q: usize,
}

impl ArimaOrder {
    /// Creates an order.
    #[must_use]
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Builds an order from exactly three integers in
    /// `0..=MAX_ORDER_COMPONENT`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidOrderError`] for the wrong arity or a component
    /// that is negative or above [`MAX_ORDER_COMPONENT`].
    pub fn try_from_slice(values: &[i64]) -> Result<Self, InvalidOrderError> {
        let [p, d, q] = values else {
            return Err(InvalidOrderError {
                values: values.to_vec(),
            });
        };
        let convert = |v: i64| {
            usize::try_from(v)
                .ok()
                .filter(|v| *v <= MAX_ORDER_COMPONENT)
                .ok_or_else(|| InvalidOrderError {
                    values: values.to_vec(),
                })
        };
        Ok(Self::new(convert(*p)?, convert(*d)?, convert(*q)?))
    }

    /// Shortest series a model of this order may be fitted on.
    ///
    /// Saturates at `usize::MAX` for orders too large to fit anything.
    #[must_use]
    pub const fn min_series_length(&self) -> usize {
        self.p
            .saturating_add(self.d.saturating_mul(2))
            .saturating_add(self.q)
            .saturating_add(5)
    }
}

impl From<[usize; 3]> for ArimaOrder {
    fn from([p, d, q]: [usize; 3]) -> Self {
        Self::new(p, d, q)
    }
}

impl From<ArimaOrder> for [usize; 3] {
    fn from(order: ArimaOrder) -> Self {
        [order.p, order.d, order.q]
    }
}

impl std::fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

/// Error returned for a malformed ARIMA order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOrderError {
    /// The rejected values.
    pub values: Vec<i64>,
}

impl std::fmt::Display for InvalidOrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid ARIMA order {:?}: expected three integers [p, d, q] between 0 and {MAX_ORDER_COMPONENT}",
            self.values
        )
    }
}

impl std::error::Error for InvalidOrderError {}

/// One bucket of a count series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket label.
    pub timestamp: NaiveDateTime,
    /// Number of incidents in the bucket.
    pub value: f64,
}

/// A count series in the column layout charts consume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSeries {
    /// Bucket labels formatted as `YYYY-MM-DDTHH:MM:SS`.
    pub timestamps: Vec<String>,
    /// Counts, aligned with `timestamps`.
    pub values: Vec<f64>,
}

impl AggregatedSeries {
    /// Number of buckets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the series has no buckets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<&[SeriesPoint]> for AggregatedSeries {
    fn from(points: &[SeriesPoint]) -> Self {
        Self {
            timestamps: points
                .iter()
                .map(|p| Frequency::format_label(p.timestamp))
                .collect(),
            values: points.iter().map(|p| p.value).collect(),
        }
    }
}

/// One forecasted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    /// Bucket label formatted as `YYYY-MM-DDTHH:MM:SS`.
    pub timestamp: String,
    /// Point forecast, never negative.
    pub value: f64,
    /// Lower confidence bound, never negative.
    pub lower_ci: f64,
    /// Upper confidence bound, never below `lower_ci`.
    pub upper_ci: f64,
}
