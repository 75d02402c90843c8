//! Default distance band for neighbourhood weights.

use geo::Point;
use rand::Rng;

/// Distance band used when none can be estimated, in metres.
pub const DEFAULT_THRESHOLD: f64 = 5000.0;

/// Largest number of centroids sampled for the estimate.
pub const SAMPLE_SIZE: usize = 200;

/// Fraction of the median pairwise distance used as the band.
pub const MEDIAN_FRACTION: f64 = 0.4;

/// Estimates a distance band from projected centroids: 40% of the median
/// pairwise distance among up to [`SAMPLE_SIZE`] randomly sampled
/// centroids.
///
/// Falls back to [`DEFAULT_THRESHOLD`] when fewer than two centroids are
/// given or the estimate is not positive.
pub fn estimate_threshold<R: Rng>(centroids: &[Point<f64>], rng: &mut R) -> f64 {
    let sample_size = centroids.len().min(SAMPLE_SIZE);
    let sample = rand::seq::index::sample(rng, centroids.len(), sample_size).into_vec();

    let mut distances: Vec<f64> = sample
        .iter()
        .flat_map(|&i| {
            sample
                .iter()
                .filter(move |&&j| j != i)
                .map(move |&j| {
                    let (a, b) = (centroids[i], centroids[j]);
                    (a.x() - b.x()).hypot(a.y() - b.y())
                })
        })
        .filter(|d| d.is_finite())
        .collect();

    let Some(median) = median(&mut distances) else {
        log::warn!("No centroid distances available; using {DEFAULT_THRESHOLD} m");
        return DEFAULT_THRESHOLD;
    };

    let threshold = median * MEDIAN_FRACTION;
    if threshold > 0.0 {
        log::info!("Estimated distance band: {threshold:.2} m");
        threshold
    } else {
        log::warn!("Estimated distance band is not positive; using {DEFAULT_THRESHOLD} m");
        DEFAULT_THRESHOLD
    }
}

/// Median with linear interpolation between the two middle values.
fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some(f64::midpoint(values[mid - 1], values[mid]))
    }
}
