//! Local Getis-Ord Gi* statistic.
//!
//! With row-standardised weights that include each region itself,
//! `Gi* = Σ_j w_ij x_j / Σ_j x_j`. The z-score uses the analytical
//! moments under randomisation:
//!
//! * `E[Gi*] = W_i / n`
//! * `Var[Gi*] = W_i (n - W_i) / (n² (n - 1)) · (s / x̄)²`
//!
//! Pseudo p-values come from conditional permutation. The region's own
//! value stays fixed and its neighbours' values are redrawn from the
//! other regions. The count of simulated statistics at least as large as
//! the observed one is folded so both tails are covered.

use rand::Rng;

use crate::SpatialError;
use crate::weights::DistanceBandWeights;

/// Gi* result for one region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalGiStar {
    /// The Gi* statistic.
    pub gi_star: f64,
    /// Standardised Gi*.
    pub z_score: f64,
    /// Folded permutation pseudo p-value.
    pub p_value: f64,
}

/// Computes Gi* for every region.
///
/// # Errors
///
/// * [`SpatialError::LengthMismatch`] if `values` and `weights` differ in
///   length
/// * [`SpatialError::TooFewRegions`] for fewer than two regions
/// * [`SpatialError::NoVariance`] if all values are equal
/// * [`SpatialError::InvalidParameter`] if `permutations` is zero
#[allow(clippy::cast_precision_loss)]
pub fn local_getis_ord_star<R: Rng>(
    values: &[f64],
    weights: &DistanceBandWeights,
    permutations: usize,
    rng: &mut R,
) -> Result<Vec<LocalGiStar>, SpatialError> {
    let n = values.len();
    if n != weights.len() {
        return Err(SpatialError::LengthMismatch {
            expected: weights.len(),
            actual: n,
        });
    }
    if n < 2 {
        return Err(SpatialError::TooFewRegions { remaining: n });
    }
    if permutations == 0 {
        return Err(SpatialError::InvalidParameter {
            message: "permutations must be positive".to_string(),
        });
    }

    let n_f = n as f64;
    let total: f64 = values.iter().sum();
    let mean = total / n_f;
    let variance = values.iter().map(|v| v * v).sum::<f64>() / n_f - mean * mean;
    if total == 0.0 || variance <= f64::EPSILON * mean.abs().max(1.0) {
        return Err(SpatialError::NoVariance);
    }
    let relative_sd = variance.sqrt() / mean;

    let results = (0..n)
        .map(|i| {
            let row = weights.star_row(i);
            let row_sum: f64 = row.iter().map(|(_, w)| w).sum();
            let gi_star = row.iter().map(|&(j, w)| w * values[j]).sum::<f64>() / total;

            let expected = row_sum / n_f;
            let var = row_sum * (n_f - row_sum) / (n_f * n_f * (n_f - 1.0)) * relative_sd * relative_sd;
            let z_score = if var > 0.0 {
                (gi_star - expected) / var.sqrt()
            } else {
                0.0
            };

            let p_value = permutation_p_value(i, values, weights, total, gi_star, permutations, rng);

            LocalGiStar {
                gi_star,
                z_score,
                p_value,
            }
        })
        .collect();

    Ok(results)
}

#[allow(clippy::cast_precision_loss)]
fn permutation_p_value<R: Rng>(
    i: usize,
    values: &[f64],
    weights: &DistanceBandWeights,
    total: f64,
    observed: f64,
    permutations: usize,
    rng: &mut R,
) -> f64 {
    let n = values.len();
    let k = weights.neighbors(i).len();
    let weight = 1.0 / (k + 1) as f64;
    // Observed values differ from simulated ones only by summation order.
    let tolerance = 1e-12 * observed.abs().max(1.0);

    let mut larger = 0usize;
    for _ in 0..permutations {
        let drawn: f64 = rand::seq::index::sample(rng, n - 1, k)
            .iter()
            .map(|j| values[if j >= i { j + 1 } else { j }])
            .sum();
        let simulated = weight * (values[i] + drawn) / total;
        if simulated >= observed - tolerance {
            larger += 1;
        }
    }

    let folded = larger.min(permutations - larger);
    (folded + 1) as f64 / (permutations + 1) as f64
}

#[cfg(test)]
mod tests {
    use geo::{Point, point};
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    use super::*;

    fn line(n: usize) -> Vec<Point<f64>> {
        (0..n)
            .map(|i| {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64 * 100.0;
                point!(x: x, y: 0.0)
            })
            .collect()
    }

    #[test]
    fn statistic_matches_hand_computation() {
        let weights = DistanceBandWeights::new(&line(3), 100.0);
        let mut rng = StdRng::seed_from_u64(3);
        let result = local_getis_ord_star(&[1.0, 2.0, 3.0], &weights, 99, &mut rng).unwrap();

        assert!((result[0].gi_star - 0.25).abs() < 1e-12);
        assert!((result[1].gi_star - 1.0 / 3.0).abs() < 1e-12);
        assert!((result[2].gi_star - 5.0 / 12.0).abs() < 1e-12);

        assert!(result[1].z_score.abs() < 1e-9);
        assert!(result[0].z_score < 0.0);
        assert!(result[2].z_score > 0.0);
    }

    #[test]
    fn detects_hot_cluster() {
        let mut values = vec![1.0; 20];
        values[..3].fill(100.0);

        let weights = DistanceBandWeights::new(&line(20), 100.0);
        let mut rng = StdRng::seed_from_u64(42);
        let result = local_getis_ord_star(&values, &weights, 999, &mut rng).unwrap();

        assert!(result[1].z_score > 2.0);
        assert!(result[1].p_value < 0.05);
        assert!(result[10].z_score < 0.0);
        for r in &result {
            assert!(r.p_value >= 1.0 / 1000.0 && r.p_value <= 0.5 + 1.0 / 1000.0);
        }
    }

    #[test]
    fn seeded_runs_are_reproducible() {
        let values = [4.0, 9.0, 1.0, 7.0, 3.0];
        let weights = DistanceBandWeights::new(&line(5), 150.0);

        let a = local_getis_ord_star(&values, &weights, 199, &mut StdRng::seed_from_u64(9)).unwrap();
        let b = local_getis_ord_star(&values, &weights, 199, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn refuses_degenerate_input() {
        let weights = DistanceBandWeights::new(&line(3), 100.0);
        let mut rng = StdRng::seed_from_u64(0);

        assert!(matches!(
            local_getis_ord_star(&[2.0, 2.0, 2.0], &weights, 99, &mut rng),
            Err(SpatialError::NoVariance)
        ));
        assert!(matches!(
            local_getis_ord_star(&[0.0, 0.0, 0.0], &weights, 99, &mut rng),
            Err(SpatialError::NoVariance)
        ));
        assert!(matches!(
            local_getis_ord_star(&[1.0, 2.0], &weights, 99, &mut rng),
            Err(SpatialError::LengthMismatch {
                expected: 3,
                actual: 2
            })
        ));
        assert!(local_getis_ord_star(&[1.0, 2.0, 3.0], &weights, 0, &mut rng).is_err());
    }
}
