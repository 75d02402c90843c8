//! Holdout evaluation of a model order.

use crime_atlas_forecast_models::{ArimaOrder, ForecastPoint};

use crate::{ArimaModel, CountSeries, ForecastError, MAX_FORECAST_STEPS};

/// Root mean squared error between two equally long sequences.
///
/// Returns `None` for empty input or a length mismatch.
#[must_use]
pub fn rmse(actual: &[f64], predicted: &[f64]) -> Option<f64> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = actual.len() as f64;
    let sum: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p) * (a - p))
        .sum();
    Some((sum / n).sqrt())
}

/// Result of fitting on the head of a series and forecasting its tail.
#[derive(Debug, Clone)]
pub struct HoldoutEvaluation {
    /// Model fitted on the training part.
    pub model: ArimaModel,
    /// Buckets used for training.
    pub train_len: usize,
    /// Observed values of the held-out buckets; empty when the series was
    /// too short to split.
    pub actual: Vec<f64>,
    /// Forecasts for the held-out buckets.
    pub forecast: Vec<ForecastPoint>,
    /// RMSE of `forecast` against `actual`, if anything was held out.
    pub rmse: Option<f64>,
}

/// Fits `order` on all but the last `holdout` buckets and scores the
/// forecast of those buckets.
///
/// A series no longer than `2 * holdout` is not split: the model is
/// trained on all of it and no score is produced.
///
/// # Errors
///
/// Propagates fitting and forecasting errors.
pub fn evaluate_holdout(
    series: &CountSeries,
    order: ArimaOrder,
    holdout: usize,
    alpha: f64,
) -> Result<HoldoutEvaluation, ForecastError> {
    let holdout = holdout.min(MAX_FORECAST_STEPS);
    if holdout == 0 || series.len() <= 2 * holdout {
        log::warn!(
            "Series of {} buckets is too short to hold out {holdout}; training on everything",
            series.len()
        );
        let model = ArimaModel::fit(series, order)?;
        return Ok(HoldoutEvaluation {
            model,
            train_len: series.len(),
            actual: Vec::new(),
            forecast: Vec::new(),
            rmse: None,
        });
    }

    let (train, test) = series.split_at(series.len() - holdout);
    let model = ArimaModel::fit(&train, order)?;
    let forecast = model.forecast(test.len(), alpha)?;

    let actual = test.values();
    let predicted: Vec<f64> = forecast.iter().map(|p| p.value).collect();
    let score = rmse(&actual, &predicted);

    if let Some(score) = score {
        log::info!("Holdout RMSE over {} buckets: {score:.3}", actual.len());
    }

    Ok(HoldoutEvaluation {
        model,
        train_len: train.len(),
        actual,
        forecast,
        rmse: score,
    })
}
