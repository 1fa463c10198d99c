use ndarray::{Array2, ArrayView2};
use num_traits::AsPrimitive;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Unnormalized local variance: for every pixel, the sum of squared
/// deviations from the mean of the `size x size` window centred on it.
///
/// Borders are handled by mirror reflection (`d c b a | a b c d`), so every
/// window holds exactly `size * size` samples. `size` must be odd.
pub fn window_variance<T>(frame: ArrayView2<'_, T>, size: usize) -> Array2<f64>
where
    T: AsPrimitive<f64>,
{
    let (h, w) = frame.dim();
    if h == 0 || w == 0 || size == 0 {
        return Array2::zeros((h, w));
    }

    let radius = size / 2;
    let padded = reflect_pad(frame, radius);
    let pw = w + 2 * radius;
    let n = (size * size) as f64;

    let compute_row = |row: usize| -> Vec<f64> {
        let mut out = vec![0.0f64; w];
        for (col, value) in out.iter_mut().enumerate() {
            let mut sum = 0.0f64;
            for r in row..row + size {
                let base = r * pw + col;
                for &v in &padded[base..base + size] {
                    sum += v;
                }
            }
            let mean = sum / n;
            let mut ssd = 0.0f64;
            for r in row..row + size {
                let base = r * pw + col;
                for &v in &padded[base..base + size] {
                    let d = v - mean;
                    ssd += d * d;
                }
            }
            *value = ssd;
        }
        out
    };

    let rows: Vec<Vec<f64>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(compute_row).collect()
    } else {
        (0..h).map(compute_row).collect()
    };

    let mut result = Array2::<f64>::zeros((h, w));
    for (row, row_data) in rows.into_iter().enumerate() {
        for (col, val) in row_data.into_iter().enumerate() {
            result[[row, col]] = val;
        }
    }
    result
}

/// Copy `frame` to a flat row-major f64 buffer padded by `radius` on each side.
fn reflect_pad<T>(frame: ArrayView2<'_, T>, radius: usize) -> Vec<f64>
where
    T: AsPrimitive<f64>,
{
    let (h, w) = frame.dim();
    let ph = h + 2 * radius;
    let pw = w + 2 * radius;
    let mut padded = vec![0.0f64; ph * pw];
    for pr in 0..ph {
        let src_row = reflect(pr as isize - radius as isize, h);
        for pc in 0..pw {
            let src_col = reflect(pc as isize - radius as isize, w);
            padded[pr * pw + pc] = frame[[src_row, src_col]].as_();
        }
    }
    padded
}

/// Map an out-of-range index back into `0..n` by half-sample reflection.
fn reflect(mut i: isize, n: usize) -> usize {
    let n = n as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if i < 0 {
            i = -i - 1;
        } else if i >= n {
            i = 2 * n - i - 1;
        } else {
            return i as usize;
        }
    }
}
