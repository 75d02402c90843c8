//! Small dense solvers used by the ARIMA estimator.

/// Sample autocovariances of `x` for lags `0..=max_lag` (biased, divided
/// by `n`).
#[allow(clippy::cast_precision_loss)]
pub fn autocovariances(x: &[f64], max_lag: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return vec![0.0; max_lag + 1];
    }
    let mean = x.iter().sum::<f64>() / n as f64;
    (0..=max_lag)
        .map(|k| {
            if k >= n {
                return 0.0;
            }
            (k..n).map(|i| (x[i] - mean) * (x[i - k] - mean)).sum::<f64>() / n as f64
        })
        .collect()
}

/// Solves the Yule-Walker equations for an AR(`order`) model by the
/// Levinson-Durbin recursion. Returns `phi_1..phi_order`.
///
/// Returns zeros when the series has no variance.
pub fn levinson_durbin(acov: &[f64], order: usize) -> Vec<f64> {
    let mut phi = vec![0.0; order];
    if order == 0 || acov.len() <= order || acov[0].abs() < 1e-12 {
        return phi;
    }

    let mut error = acov[0];
    for k in 0..order {
        let mut acc = acov[k + 1];
        for j in 0..k {
            acc -= phi[j] * acov[k - j];
        }
        if error.abs() < 1e-12 {
            break;
        }
        let reflection = acc / error;

        let previous = phi.clone();
        phi[k] = reflection;
        for j in 0..k {
            phi[j] = previous[j] - reflection * previous[k - 1 - j];
        }
        error *= reflection.mul_add(-reflection, 1.0);
    }

    phi
}

/// Least squares fit of `y ≈ X β` through the normal equations with a
/// small ridge term. `rows` are the rows of `X`.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let k = rows.first().map_or(0, Vec::len);
    if k == 0 {
        return Some(Vec::new());
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * target;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let trace = (0..k).map(|i| xtx[i][i]).sum::<f64>() / k as f64;
    let ridge = (trace * 1e-8).max(1e-12);
    for (i, row) in xtx.iter_mut().enumerate() {
        row[i] += ridge;
    }

    solve(xtx, xty)
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-14 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut acc = b[row];
        for c in (row + 1)..n {
            acc -= a[row][c] * x[c];
        }
        x[row] = acc / a[row][row];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}
