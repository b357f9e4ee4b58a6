//! Tukey biweight M-estimation by iteratively reweighted least squares

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

/// Normal-consistency factor of the median absolute deviation.
const MAD_NORMAL: f64 = 0.6745;

/// A robust regression fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RobustModelFit {
    pub coefficients: Array1<f64>,
    /// Observed minus fitted, one per observation.
    pub residuals: Array1<f64>,
    /// Root mean square of `residuals`.
    pub rmse: f64,
    pub iterations: usize,
}

/// Tukey biweight estimator settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyBiweight {
    pub tuning: f64,
    pub max_iterations: usize,
    /// Largest coefficient change, relative to the coefficient size, at
    /// which iteration stops.
    pub tolerance: f64,
}

impl Default for TukeyBiweight {
    fn default() -> Self {
        TukeyBiweight {
            tuning: 4.685,
            max_iterations: 50,
            tolerance: 1e-8,
        }
    }
}

impl TukeyBiweight {
    /// Fit `y ~ x` starting from ordinary least squares.
    ///
    /// Returns `None` when a weighted system is singular.
    pub fn fit(&self, x: ArrayView2<f64>, y: ArrayView1<f64>) -> Option<RobustModelFit> {
        let mut weights = Array1::<f64>::ones(y.len());
        let mut coefficients = weighted_least_squares(x, y, weights.view())?;
        let y_scale = y.iter().fold(1.0f64, |m, v| m.max(v.abs()));
        let mut iterations = 0;

        while iterations < self.max_iterations {
            let residuals = &y - &x.dot(&coefficients);
            let scale = mad_scale(&residuals);
            if scale <= f64::EPSILON * y_scale {
                break;
            }
            let limit = self.tuning * scale;
            for (w, r) in weights.iter_mut().zip(residuals.iter()) {
                let u = r / limit;
                *w = if u.abs() < 1.0 { (1.0 - u * u).powi(2) } else { 0.0 };
            }
            let next = weighted_least_squares(x, y, weights.view())?;
            iterations += 1;

            let change = (&next - &coefficients)
                .iter()
                .fold(0.0f64, |m, d| m.max(d.abs()));
            let size = coefficients.iter().fold(1.0f64, |m, c| m.max(c.abs()));
            coefficients = next;
            if change <= self.tolerance * size {
                break;
            }
        }

        let residuals = &y - &x.dot(&coefficients);
        let rmse = (residuals.mapv(|r| r * r).sum() / residuals.len().max(1) as f64).sqrt();
        Some(RobustModelFit {
            coefficients,
            residuals,
            rmse,
            iterations,
        })
    }
}

/// Median absolute residual scaled to a normal standard deviation.
fn mad_scale(residuals: &Array1<f64>) -> f64 {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).collect();
    if abs.is_empty() {
        return 0.0;
    }
    abs.sort_by(f64::total_cmp);
    let mid = abs.len() / 2;
    let median = if abs.len() % 2 == 0 {
        (abs[mid - 1] + abs[mid]) / 2.0
    } else {
        abs[mid]
    };
    median / MAD_NORMAL
}

/// Solve the weighted normal equations `(X'WX) b = X'Wy`.
fn weighted_least_squares(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
) -> Option<Array1<f64>> {
    let p = x.ncols();
    let mut a = Array2::<f64>::zeros((p, p));
    let mut b = Array1::<f64>::zeros(p);
    for ((row, &yi), &wi) in x.outer_iter().zip(y.iter()).zip(weights.iter()) {
        if wi == 0.0 {
            continue;
        }
        for j in 0..p {
            b[j] += wi * row[j] * yi;
            for k in j..p {
                a[[j, k]] += wi * row[j] * row[k];
            }
        }
    }
    for j in 0..p {
        for k in 0..j {
            a[[j, k]] = a[[k, j]];
        }
    }
    solve(a, b)
}

/// Gaussian elimination with partial pivoting. `None` when singular.
pub(crate) fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Option<Array1<f64>> {
    let n = b.len();
    let magnitude = a.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if n == 0 || magnitude == 0.0 {
        return None;
    }
    let threshold = magnitude * 1e-12;

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = a[[col, col]].abs();
        for row in (col + 1)..n {
            if a[[row, col]].abs() > max_val {
                max_val = a[[row, col]].abs();
                max_row = row;
            }
        }
        if max_val <= threshold {
            return None;
        }
        if max_row != col {
            for k in 0..n {
                a.swap([col, k], [max_row, k]);
            }
            b.swap(col, max_row);
        }

        let pivot = a[[col, col]];
        for row in (col + 1)..n {
            let factor = a[[row, col]] / pivot;
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = b[i];
        for j in (i + 1)..n {
            sum -= a[[i, j]] * x[j];
        }
        x[i] = sum / a[[i, i]];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn solve_small_system() {
        let x = solve(array![[0.0, 2.0], [1.0, 1.0]], array![4.0, 3.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-12);
        assert!((x[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn solve_detects_singular() {
        assert!(solve(array![[1.0, 2.0], [2.0, 4.0]], array![1.0, 2.0]).is_none());
        assert!(solve(Array2::zeros((2, 2)), array![0.0, 0.0]).is_none());
    }

    #[test]
    fn biweight_ignores_gross_outlier() {
        // y = 2 + 3x with one corrupted observation
        let xs: Vec<f64> = (0..20).map(f64::from).collect();
        let x = Array2::from_shape_fn((20, 2), |(i, j)| if j == 0 { 1.0 } else { xs[i] });
        let mut y = Array1::from_iter(xs.iter().map(|v| 2.0 + 3.0 * v));
        y[7] += 100.0;

        let fit = TukeyBiweight::default().fit(x.view(), y.view()).unwrap();
        assert!((fit.coefficients[0] - 2.0).abs() < 1e-6);
        assert!((fit.coefficients[1] - 3.0).abs() < 1e-6);
        assert!((fit.residuals[7] - 100.0).abs() < 1e-6);
        assert!(fit.residuals.iter().enumerate().all(|(i, r)| i == 7 || r.abs() < 1e-6));
        assert!((fit.rmse - 100.0 / 20f64.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn collinear_design_is_singular() {
        let x = Array2::from_shape_fn((12, 2), |(_, j)| if j == 0 { 1.0 } else { 2.0 });
        let y = Array1::ones(12);
        assert!(TukeyBiweight::default().fit(x.view(), y.view()).is_none());
    }
}
