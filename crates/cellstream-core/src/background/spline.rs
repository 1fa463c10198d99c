use ndarray::Array2;

use crate::consts::EPSILON;
use crate::error::{CellstreamError, Result};

/// Interpolating cubic spline through `(xs, ys)`.
///
/// Uses not-a-knot end conditions for four or more knots, the interpolating
/// parabola for three, a straight line for two and a constant for one.
/// Evaluation outside the knot range continues the end segments.
#[derive(Clone, Debug)]
pub struct CubicSpline {
    xs: Vec<f64>,
    ys: Vec<f64>,
    /// Second derivatives at the knots.
    m: Vec<f64>,
}

impl CubicSpline {
    pub fn new(xs: &[f64], ys: &[f64]) -> Result<Self> {
        if xs.is_empty() || xs.len() != ys.len() {
            return Err(CellstreamError::InvalidParameter(format!(
                "spline needs matching non-empty knots, got {} x and {} y",
                xs.len(),
                ys.len()
            )));
        }
        if xs.windows(2).any(|w| w[1] - w[0] <= EPSILON) {
            return Err(CellstreamError::InvalidParameter(
                "spline knots must be strictly increasing".into(),
            ));
        }
        let m = second_derivatives(xs, ys);
        Ok(Self {
            xs: xs.to_vec(),
            ys: ys.to_vec(),
            m,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        let n = self.xs.len();
        if n == 1 {
            return self.ys[0];
        }
        let i = self.xs[1..n - 1].partition_point(|&k| k <= x);
        let (x0, x1) = (self.xs[i], self.xs[i + 1]);
        let h = x1 - x0;
        let a = x1 - x;
        let b = x - x0;
        self.m[i] * a.powi(3) / (6.0 * h)
            + self.m[i + 1] * b.powi(3) / (6.0 * h)
            + (self.ys[i] / h - self.m[i] * h / 6.0) * a
            + (self.ys[i + 1] / h - self.m[i + 1] * h / 6.0) * b
    }
}

fn second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    if n < 3 {
        return vec![0.0; n];
    }

    let h: Vec<f64> = xs.windows(2).map(|w| w[1] - w[0]).collect();
    let mut a = vec![vec![0.0f64; n]; n];
    let mut rhs = vec![0.0f64; n];

    for i in 1..n - 1 {
        a[i][i - 1] = h[i - 1];
        a[i][i] = 2.0 * (h[i - 1] + h[i]);
        a[i][i + 1] = h[i];
        rhs[i] = 6.0 * ((ys[i + 1] - ys[i]) / h[i] - (ys[i] - ys[i - 1]) / h[i - 1]);
    }

    if n == 3 {
        // Single parabola: constant second derivative.
        a[0][0] = 1.0;
        a[0][1] = -1.0;
        a[2][1] = 1.0;
        a[2][2] = -1.0;
    } else {
        // Not-a-knot: third derivative continuous across the second and
        // second-to-last knots.
        a[0][0] = h[1];
        a[0][1] = -(h[0] + h[1]);
        a[0][2] = h[0];
        a[n - 1][n - 3] = h[n - 2];
        a[n - 1][n - 2] = -(h[n - 3] + h[n - 2]);
        a[n - 1][n - 1] = h[n - 3];
    }

    solve_dense(a, rhs)
}

/// Gaussian elimination with partial pivoting for the small knot systems.
fn solve_dense(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Vec<f64> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        a.swap(col, pivot);
        b.swap(col, pivot);
        let p = a[col][col];
        if p.abs() < EPSILON {
            continue;
        }
        for row in col + 1..n {
            let factor = a[row][col] / p;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0f64; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in row + 1..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = if a[row][row].abs() < EPSILON {
            0.0
        } else {
            sum / a[row][row]
        };
    }
    x
}

/// Evaluate the tensor-product cubic spline through a grid of support
/// values at every pixel of a `height x width` frame.
///
/// `support[[i, j]]` sits at `(row_centers[i], col_centers[j])`.
pub fn interpolate_grid(
    row_centers: &[f64],
    col_centers: &[f64],
    support: &Array2<f64>,
    height: usize,
    width: usize,
) -> Result<Array2<f64>> {
    if support.dim() != (row_centers.len(), col_centers.len()) {
        return Err(CellstreamError::InvalidParameter(format!(
            "support grid {:?} does not match {} x {} tile centres",
            support.dim(),
            row_centers.len(),
            col_centers.len()
        )));
    }

    // Along each tile row, across all columns.
    let mut across = Array2::<f64>::zeros((row_centers.len(), width));
    for (i, support_row) in support.outer_iter().enumerate() {
        let ys: Vec<f64> = support_row.to_vec();
        let spline = CubicSpline::new(col_centers, &ys)?;
        for col in 0..width {
            across[[i, col]] = spline.eval(col as f64);
        }
    }

    // Then down each column.
    let mut surface = Array2::<f64>::zeros((height, width));
    let mut ys = vec![0.0f64; row_centers.len()];
    for col in 0..width {
        for (i, y) in ys.iter_mut().enumerate() {
            *y = across[[i, col]];
        }
        let spline = CubicSpline::new(row_centers, &ys)?;
        for row in 0..height {
            surface[[row, col]] = spline.eval(row as f64);
        }
    }

    Ok(surface)
}
