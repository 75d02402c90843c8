//! ARIMA(p, d, q) estimation and forecasting.
//!
//! The series is differenced `d` times (and demeaned when `d = 0`). ARMA
//! coefficients of the differenced series are estimated with the
//! Hannan-Rissanen procedure:
//!
//! 1. fit a long autoregression by Levinson-Durbin and keep its residuals
//!    as estimates of the innovations;
//! 2. regress the series on its own `p` lags and the `q` lagged
//!    innovation estimates by least squares.
//!
//! Residual variance and log-likelihood come from the conditional sum of
//! squares. Forecast standard errors use the psi-weights of the
//! integrated model, so intervals widen with the horizon.

use chrono::NaiveDateTime;
use crime_atlas_forecast_models::{ArimaOrder, ForecastPoint, Frequency};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF as _, Normal};

use crate::linalg::{autocovariances, least_squares, levinson_durbin};
use crate::{CountSeries, ForecastError};

/// MA coefficients are kept inside this bound so the conditional
/// residual recursion cannot diverge.
const MA_BOUND: f64 = 0.99;

/// Longest forecast horizon, in buckets.
pub const MAX_FORECAST_STEPS: usize = 10_000;

/// A fitted ARIMA model, including everything needed to forecast after a
/// reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArimaModel {
    order: ArimaOrder,
    frequency: Frequency,
    /// Mean of the series; zero when `d > 0`.
    mean: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    sigma2: f64,
    log_likelihood: f64,
    aic: f64,
    n_obs: usize,
    next_bucket_start: i64,
    first_label: NaiveDateTime,
    last_label: NaiveDateTime,
    /// Last `p` values of the centred, differenced series.
    history_tail: Vec<f64>,
    /// Last `q` in-sample residuals.
    residual_tail: Vec<f64>,
    /// Last observed value at differencing levels `0..d`.
    level_tails: Vec<f64>,
    trained_at: NaiveDateTime,
}

impl ArimaModel {
    /// Fits a model of the given order to a count series.
    ///
    /// # Errors
    ///
    /// * [`ForecastError::EmptySeries`] if the series has no buckets
    /// * [`ForecastError::InsufficientData`] if it is shorter than
    ///   [`ArimaOrder::min_series_length`]
    /// * [`ForecastError::FitFailed`] if estimation produces non-finite
    ///   values
    pub fn fit(series: &CountSeries, order: ArimaOrder) -> Result<Self, ForecastError> {
        let (Some(first), Some(last)) = (series.points.first(), series.points.last()) else {
            return Err(ForecastError::EmptySeries);
        };

        let y = series.values();
        let required = order.min_series_length();
        if y.len() < required {
            return Err(ForecastError::InsufficientData {
                required,
                actual: y.len(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::FitFailed {
                message: "series contains non-finite values".to_string(),
            });
        }

        log::info!(
            "Fitting ARIMA{order} on {} observations ({})",
            y.len(),
            series.frequency
        );

        let (x, level_tails) = difference(&y, order.d);
        let mean = if order.d == 0 { mean(&x) } else { 0.0 };
        let z: Vec<f64> = x.iter().map(|v| v - mean).collect();

        let (ar, ma) = estimate_arma(&z, order.p, order.q)?;
        let residuals = css_residuals(&z, &ar, &ma);

        let conditional = &residuals[order.p.min(residuals.len())..];
        #[allow(clippy::cast_precision_loss)]
        let n_eff = conditional.len() as f64;
        let sigma2 = conditional.iter().map(|e| e * e).sum::<f64>() / n_eff;
        if !sigma2.is_finite() {
            return Err(ForecastError::FitFailed {
                message: "residual variance is not finite".to_string(),
            });
        }

        let log_likelihood =
            -n_eff / 2.0 * ((2.0 * std::f64::consts::PI * sigma2.max(1e-12)).ln() + 1.0);
        let k = order.p + order.q + 1 + usize::from(order.d == 0);
        #[allow(clippy::cast_precision_loss)]
        let aic = 2.0f64.mul_add(k as f64, -2.0 * log_likelihood);

        let model = Self {
            order,
            frequency: series.frequency,
            mean,
            history_tail: z[z.len() - order.p.min(z.len())..].to_vec(),
            residual_tail: residuals[residuals.len() - order.q.min(residuals.len())..].to_vec(),
            ar,
            ma,
            sigma2,
            log_likelihood,
            aic,
            n_obs: y.len(),
            next_bucket_start: series.next_bucket_start(),
            first_label: first.timestamp,
            last_label: last.timestamp,
            level_tails,
            trained_at: chrono::Utc::now().naive_utc(),
        };

        log::debug!("{}", model.summary());
        Ok(model)
    }

    /// Forecasts `steps` buckets past the end of the training series.
    ///
    /// Intervals are `mean ± z(1 - alpha/2) · se`. Means and bounds are
    /// clamped at zero and `upper_ci >= lower_ci` always holds.
    ///
    /// # Errors
    ///
    /// Returns [`ForecastError::InvalidParameter`] if `steps` is zero or
    /// above [`MAX_FORECAST_STEPS`], or `alpha` is outside `(0, 1)`.
    pub fn forecast(&self, steps: usize, alpha: f64) -> Result<Vec<ForecastPoint>, ForecastError> {
        if steps == 0 || steps > MAX_FORECAST_STEPS {
            return Err(ForecastError::InvalidParameter {
                message: format!("steps must be between 1 and {MAX_FORECAST_STEPS}, got {steps}"),
            });
        }
        if !(alpha > 0.0 && alpha < 1.0) {
            return Err(ForecastError::InvalidParameter {
                message: format!("alpha must be in (0, 1), got {alpha}"),
            });
        }

        let mut z = self.history_tail.clone();
        let mut e = self.residual_tail.clone();
        let mut differenced = Vec::with_capacity(steps);

        for _ in 0..steps {
            let ar_part: f64 = self
                .ar
                .iter()
                .enumerate()
                .filter_map(|(i, phi)| z.len().checked_sub(i + 1).map(|t| phi * z[t]))
                .sum();
            let ma_part: f64 = self
                .ma
                .iter()
                .enumerate()
                .filter_map(|(j, theta)| e.len().checked_sub(j + 1).map(|t| theta * e[t]))
                .sum();
            let next = ar_part + ma_part;
            z.push(next);
            e.push(0.0);
            differenced.push(next + self.mean);
        }

        let means = integrate(&differenced, &self.level_tails);
        let psi = psi_weights(&self.ar, &self.ma, self.order.d, steps);

        let normal = Normal::new(0.0, 1.0).map_err(|e| ForecastError::FitFailed {
            message: e.to_string(),
        })?;
        let z_crit = normal.inverse_cdf(1.0 - alpha / 2.0);

        let mut cumulative = 0.0;
        let mut points = Vec::with_capacity(steps);
        for (h, mean) in means.into_iter().enumerate() {
            cumulative += psi[h] * psi[h];
            let se = (self.sigma2 * cumulative).sqrt();

            let lower = z_crit.mul_add(-se, mean).max(0.0);
            let upper = z_crit.mul_add(se, mean).max(0.0).max(lower);

            let start = self.next_bucket_start
                + i64::try_from(h).unwrap_or(i64::MAX) * i64::from(self.frequency.multiple);
            let timestamp = self
                .frequency
                .bucket_label(start)
                .map(Frequency::format_label)
                .unwrap_or_default();

            points.push(ForecastPoint {
                timestamp,
                value: mean.max(0.0),
                lower_ci: lower,
                upper_ci: upper,
            });
        }

        Ok(points)
    }

    /// Model order.
    #[must_use]
    pub const fn order(&self) -> ArimaOrder {
        self.order
    }

    /// Frequency of the training series.
    #[must_use]
    pub const fn frequency(&self) -> Frequency {
        self.frequency
    }

    /// Number of observations the model was fitted on.
    #[must_use]
    pub const fn n_obs(&self) -> usize {
        self.n_obs
    }

    /// AR coefficients `phi_1..phi_p`.
    #[must_use]
    pub fn ar_coefficients(&self) -> &[f64] {
        &self.ar
    }

    /// MA coefficients `theta_1..theta_q`.
    #[must_use]
    pub fn ma_coefficients(&self) -> &[f64] {
        &self.ma
    }

    /// Innovation variance estimate.
    #[must_use]
    pub const fn sigma2(&self) -> f64 {
        self.sigma2
    }

    /// Akaike information criterion.
    #[must_use]
    pub const fn aic(&self) -> f64 {
        self.aic
    }

    /// Label of the last training bucket.
    #[must_use]
    pub const fn last_label(&self) -> NaiveDateTime {
        self.last_label
    }

    /// Plain-text summary of the fit.
    #[must_use]
    pub fn summary(&self) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        let _ = writeln!(out, "ARIMA{} Results", self.order);
        let _ = writeln!(out, "Frequency:          {}", self.frequency);
        let _ = writeln!(out, "No. Observations:   {}", self.n_obs);
        let _ = writeln!(
            out,
            "Sample:             {} - {}",
            Frequency::format_label(self.first_label),
            Frequency::format_label(self.last_label)
        );
        let _ = writeln!(
            out,
            "Trained at:         {}",
            self.trained_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        let _ = writeln!(out, "Log Likelihood:     {:.3}", self.log_likelihood);
        let _ = writeln!(out, "AIC:                {:.3}", self.aic);
        let _ = writeln!(out, "sigma2:             {:.4}", self.sigma2);
        let _ = writeln!(out, "Coefficients:");
        if self.order.d == 0 {
            let _ = writeln!(out, "  {:<8}{:>12.4}", "const", self.mean);
        }
        for (i, phi) in self.ar.iter().enumerate() {
            let _ = writeln!(out, "  {:<8}{phi:>12.4}", format!("ar.L{}", i + 1));
        }
        for (j, theta) in self.ma.iter().enumerate() {
            let _ = writeln!(out, "  {:<8}{theta:>12.4}", format!("ma.L{}", j + 1));
        }
        out
    }

    /// The summary cut to at most `max_chars` characters.
    #[must_use]
    pub fn summary_preview(&self, max_chars: usize) -> String {
        let summary = self.summary();
        if summary.chars().count() <= max_chars {
            return summary;
        }
        let mut preview: String = summary.chars().take(max_chars).collect();
        preview.push_str("\n... (summary truncated)");
        preview
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(x: &[f64]) -> f64 {
    if x.is_empty() {
        0.0
    } else {
        x.iter().sum::<f64>() / x.len() as f64
    }
}

/// Differences `y` `d` times, returning the result and the last value of
/// every level before differencing.
fn difference(y: &[f64], d: usize) -> (Vec<f64>, Vec<f64>) {
    let mut current = y.to_vec();
    let mut tails = Vec::with_capacity(d);
    for _ in 0..d {
        tails.push(current.last().copied().unwrap_or(0.0));
        current = current.windows(2).map(|w| w[1] - w[0]).collect();
    }
    (current, tails)
}

/// Inverts [`difference`] for values following the observed series.
fn integrate(forecasts: &[f64], tails: &[f64]) -> Vec<f64> {
    let mut current = forecasts.to_vec();
    for &tail in tails.iter().rev() {
        let mut acc = tail;
        current = current
            .iter()
            .map(|v| {
                acc += v;
                acc
            })
            .collect();
    }
    current
}

fn estimate_arma(z: &[f64], p: usize, q: usize) -> Result<(Vec<f64>, Vec<f64>), ForecastError> {
    let failed = || ForecastError::FitFailed {
        message: "least squares system is singular".to_string(),
    };
    let m = z.len();

    if p == 0 && q == 0 {
        return Ok((Vec::new(), Vec::new()));
    }

    if q == 0 {
        let rows: Vec<Vec<f64>> = (p..m)
            .map(|t| (1..=p).map(|i| z[t - i]).collect())
            .collect();
        let ar = least_squares(&rows, &z[p..]).ok_or_else(failed)?;
        return Ok((ar, Vec::new()));
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let preferred = (p + q + 2).max(((m as f64).ln() * 2.0).ceil() as usize);
    let long = preferred.min(m.saturating_sub(2 * q + p + 2));

    let innovations: Vec<f64> = if long == 0 {
        vec![0.0; m]
    } else {
        let a = levinson_durbin(&autocovariances(z, long), long);
        (0..m)
            .map(|t| {
                if t < long {
                    0.0
                } else {
                    z[t] - (1..=long).map(|j| a[j - 1] * z[t - j]).sum::<f64>()
                }
            })
            .collect()
    };

    let start = long + p.max(q);
    let rows: Vec<Vec<f64>> = (start..m)
        .map(|t| {
            (1..=p)
                .map(|i| z[t - i])
                .chain((1..=q).map(|j| innovations[t - j]))
                .collect()
        })
        .collect();

    let beta = least_squares(&rows, &z[start.min(m)..]).ok_or_else(failed)?;
    if beta.len() != p + q {
        return Err(failed());
    }

    let ar = beta[..p].to_vec();
    let ma = beta[p..]
        .iter()
        .map(|theta| theta.clamp(-MA_BOUND, MA_BOUND))
        .collect();
    Ok((ar, ma))
}

/// One-step-ahead residuals, with pre-sample values taken as zero.
fn css_residuals(z: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let mut e = vec![0.0; z.len()];
    for t in 0..z.len() {
        let mut predicted = 0.0;
        for (i, phi) in ar.iter().enumerate() {
            if t > i {
                predicted += phi * z[t - i - 1];
            }
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                predicted += theta * e[t - j - 1];
            }
        }
        e[t] = z[t] - predicted;
    }
    e
}

/// Psi-weights `psi_0..psi_{steps-1}` of the model written on the
/// undifferenced series, i.e. with AR polynomial `phi(B)(1 - B)^d`.
fn psi_weights(ar: &[f64], ma: &[f64], d: usize, steps: usize) -> Vec<f64> {
    // Coefficients of phi(B) = 1 - phi_1 B - ... - phi_p B^p.
    let mut poly: Vec<f64> = std::iter::once(1.0).chain(ar.iter().map(|phi| -phi)).collect();
    for _ in 0..d {
        let mut next = vec![0.0; poly.len() + 1];
        for (i, c) in poly.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c;
        }
        poly = next;
    }
    let integrated_ar: Vec<f64> = poly[1..].iter().map(|c| -c).collect();

    let mut psi = vec![0.0; steps];
    if steps > 0 {
        psi[0] = 1.0;
    }
    for j in 1..steps {
        let mut value = ma.get(j - 1).copied().unwrap_or(0.0);
        for (i, a) in integrated_ar.iter().enumerate() {
            if let Some(prev) = j.checked_sub(i + 1) {
                value += a * psi[prev];
            }
        }
        psi[j] = value;
    }
    psi
}

#[cfg(test)]
mod tests {
    use crime_atlas_forecast_models::SeriesPoint;

    use super::*;
    use crate::aggregate;

    fn noise(t: usize) -> f64 {
        #[allow(clippy::cast_precision_loss)]
        let x = ((t as f64 + 1.0) * 12.9898).sin() * 43_758.545_3;
        x.fract()
    }

    fn monthly(values: &[f64]) -> CountSeries {
        let frequency: Frequency = "ME".parse().unwrap();
        let origin = frequency
            .unit
            .ordinal(NaiveDateTime::parse_from_str("2018-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap());
        let points = values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint {
                timestamp: frequency
                    .bucket_label(frequency.bucket_start(origin, i64::try_from(i).unwrap()))
                    .unwrap(),
                value: *v,
            })
            .collect();
        CountSeries {
            frequency,
            origin,
            points,
        }
    }

    #[test]
    fn refuses_short_series() {
        let series = monthly(&[3.0, 4.0, 5.0]);
        let err = ArimaModel::fit(&series, ArimaOrder::new(5, 1, 1)).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientData {
                required: 13,
                actual: 3
            }
        ));
    }

    #[test]
    fn refuses_empty_series() {
        let series = aggregate::aggregate(&[], "ME".parse().unwrap());
        assert!(matches!(
            ArimaModel::fit(&series, ArimaOrder::new(1, 0, 0)),
            Err(ForecastError::EmptySeries)
        ));
    }

    #[test]
    fn recovers_ar1_coefficient() {
        let mut values = vec![0.0; 600];
        for t in 1..values.len() {
            values[t] = 0.6f64.mul_add(values[t - 1], noise(t) - 0.5);
        }
        let shifted: Vec<f64> = values.iter().map(|v| v + 50.0).collect();

        let model = ArimaModel::fit(&monthly(&shifted), ArimaOrder::new(1, 0, 0)).unwrap();
        assert!((model.ar_coefficients()[0] - 0.6).abs() < 0.1);
        assert!(model.summary().contains("const"));
    }

    #[test]
    fn random_walk_intervals_grow_with_horizon() {
        let values: Vec<f64> = (0..20).map(|i| 10.0 + 2.0 * f64::from(i)).collect();
        let model = ArimaModel::fit(&monthly(&values), ArimaOrder::new(0, 1, 0)).unwrap();
        assert!((model.sigma2() - 4.0).abs() < 1e-9);

        let forecast = model.forecast(4, 0.05).unwrap();
        for (h, point) in forecast.iter().enumerate() {
            assert!((point.value - 48.0).abs() < 1e-9);
            #[allow(clippy::cast_precision_loss)]
            let se = 2.0 * ((h + 1) as f64).sqrt();
            assert!((point.upper_ci - (48.0 + 1.959_964 * se)).abs() < 1e-4);
        }
        assert!(forecast[3].upper_ci - forecast[3].lower_ci > forecast[0].upper_ci - forecast[0].lower_ci);
    }

    #[test]
    fn forecasts_continue_the_calendar() {
        let values: Vec<f64> = (0..36).map(|i| 20.0 + 5.0 * noise(i)).collect();
        let series = monthly(&values);
        assert_eq!(
            Frequency::format_label(series.points.last().unwrap().timestamp),
            "2020-12-31T00:00:00"
        );

        let model = ArimaModel::fit(&series, ArimaOrder::new(1, 0, 1)).unwrap();
        let forecast = model.forecast(2, 0.05).unwrap();
        assert_eq!(forecast[0].timestamp, "2021-01-31T00:00:00");
        assert_eq!(forecast[1].timestamp, "2021-02-28T00:00:00");
    }

    #[test]
    fn forecasts_are_clamped_and_ordered() {
        // A steep decline forecasts below zero without clamping.
        let values: Vec<f64> = (0..30).map(|i| 5.0f64.mul_add(-f64::from(i), 150.0).max(1.0) + noise(i as usize)).collect();
        let model = ArimaModel::fit(&monthly(&values), ArimaOrder::new(5, 1, 1)).unwrap();

        for alpha in [0.01, 0.05, 0.1] {
            for point in model.forecast(12, alpha).unwrap() {
                assert!(point.value >= 0.0);
                assert!(point.lower_ci >= 0.0);
                assert!(point.upper_ci >= point.lower_ci);
            }
        }
    }

    #[test]
    fn wider_confidence_gives_wider_interval() {
        let values: Vec<f64> = (0..48).map(|i| 100.0 + 10.0 * noise(i)).collect();
        let model = ArimaModel::fit(&monthly(&values), ArimaOrder::new(1, 0, 0)).unwrap();

        let width = |alpha: f64| {
            let p = &model.forecast(3, alpha).unwrap()[2];
            p.upper_ci - p.lower_ci
        };
        assert!(width(0.01) > width(0.05));
        assert!(width(0.05) > width(0.10));
    }

    #[test]
    fn rejects_bad_forecast_parameters() {
        let values: Vec<f64> = (0..20).map(|i| f64::from(i % 5)).collect();
        let model = ArimaModel::fit(&monthly(&values), ArimaOrder::new(1, 0, 0)).unwrap();
        assert!(model.forecast(0, 0.05).is_err());
        assert!(model.forecast(MAX_FORECAST_STEPS, 0.05).is_ok());
        assert!(matches!(
            model.forecast(100_000_000_000, 0.05),
            Err(ForecastError::InvalidParameter { .. })
        ));
        assert!(model.forecast(3, 0.0).is_err());
        assert!(model.forecast(3, 1.0).is_err());
    }

    #[test]
    fn psi_weights_of_random_walk_are_ones() {
        assert_eq!(psi_weights(&[], &[], 1, 4), vec![1.0, 1.0, 1.0, 1.0]);
        let ar1 = psi_weights(&[0.5], &[], 0, 3);
        assert!((ar1[2] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn integrate_inverts_difference() {
        let y = [1.0, 4.0, 9.0, 16.0, 25.0];
        let (x, tails) = difference(&y, 2);
        assert_eq!(x, vec![2.0, 2.0, 2.0]);
        assert_eq!(integrate(&[2.0, 2.0], &tails), vec![36.0, 49.0]);
    }

    #[test]
    fn summary_preview_truncates() {
        let values: Vec<f64> = (0..20).map(|i| f64::from(i % 7)).collect();
        let model = ArimaModel::fit(&monthly(&values), ArimaOrder::new(2, 0, 1)).unwrap();
        assert!(model.summary().starts_with("ARIMA(2, 0, 1) Results"));
        let preview = model.summary_preview(20);
        assert!(preview.ends_with("(summary truncated)"));
    }
}
