use ndarray::{Array2, Array3, ArrayView3, ArrayViewMut3, Axis, Zip};
use num_traits::AsPrimitive;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::consts::{EPSILON, PARALLEL_PIXEL_THRESHOLD};
use crate::control::StageControl;
use crate::error::Result;
use crate::frame::{MaskPixel, StackShape};

use super::config::BackgroundConfig;
use super::estimator::{median, BackgroundEstimator};

/// Background-correct a fluorescence stack into `out`.
///
/// Pass 1 estimates each frame's background surface and parks it in `out`.
/// The gain map is the per-pixel temporal median of the surfaces, each
/// normalized by its own mean. Pass 2 overwrites `out` with
/// `(raw - surface) / gain`. Only one surface buffer is ever held, so `out`
/// can be a memory-mapped stack larger than RAM. Progress counts both
/// passes, `2 * frames` units in total.
pub fn correct_into<T, M>(
    fluor: ArrayView3<'_, T>,
    masks: ArrayView3<'_, M>,
    mut out: ArrayViewMut3<'_, f32>,
    config: &BackgroundConfig,
    ctl: &StageControl<'_>,
) -> Result<()>
where
    T: AsPrimitive<f64> + Sync,
    M: MaskPixel,
{
    let shape = StackShape::from_dim(fluor.dim());
    shape.ensure_matches(masks.dim())?;
    shape.ensure_matches(out.dim())?;
    if shape.is_empty() {
        return Ok(());
    }

    let estimator = BackgroundEstimator::new(shape.height, shape.width, config)?;
    let total = shape.frames;

    let mut means = Vec::with_capacity(total);
    for (t, ((frame, mask), mut dst)) in fluor
        .axis_iter(Axis(0))
        .zip(masks.axis_iter(Axis(0)))
        .zip(out.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        ctl.checkpoint()?;
        let bg = estimator.estimate(frame, mask)?;
        Zip::from(&mut dst)
            .and(&bg.surface)
            .for_each(|d, &s| *d = s as f32);
        means.push(bg.mean);
        ctl.frame_done(t, 2 * total, "Estimating background");
    }

    ctl.checkpoint()?;
    let gain = gain_map(out.view(), &means);
    debug!(
        frames = total,
        min_gain = gain.iter().copied().fold(f64::INFINITY, f64::min),
        max_gain = gain.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        "Computed gain map"
    );

    for (t, (frame, mut dst)) in fluor
        .axis_iter(Axis(0))
        .zip(out.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        ctl.checkpoint()?;
        Zip::from(&mut dst)
            .and(&frame)
            .and(&gain)
            .for_each(|d, &raw, &g| {
                let raw: f64 = raw.as_();
                *d = ((raw - *d as f64) / g) as f32;
            });
        ctl.frame_done(total + t, 2 * total, "Correcting background");
    }

    info!(frames = total, "Background correction complete");
    Ok(())
}

/// Correct a whole in-memory stack.
pub fn correct_stack<T, M>(
    fluor: ArrayView3<'_, T>,
    masks: ArrayView3<'_, M>,
    config: &BackgroundConfig,
    ctl: &StageControl<'_>,
) -> Result<Array3<f32>>
where
    T: AsPrimitive<f64> + Sync,
    M: MaskPixel,
{
    let mut out = Array3::<f32>::zeros(fluor.dim());
    correct_into(fluor, masks, out.view_mut(), config, ctl)?;
    Ok(out)
}

/// Per-pixel median over time of `surface[t] / mean[t]`.
///
/// Frames whose surface mean is zero contribute their raw surface. A gain
/// that is not finite or is effectively zero becomes 1.
pub fn gain_map(surfaces: ArrayView3<'_, f32>, means: &[f64]) -> Array2<f64> {
    let (n, h, w) = surfaces.dim();
    let scale: Vec<f64> = means
        .iter()
        .map(|&m| if m.abs() > EPSILON { 1.0 / m } else { 1.0 })
        .collect();

    let row_gain = |row: usize, values: &mut Vec<f64>, out: &mut [f64]| {
        for (col, result) in out.iter_mut().enumerate() {
            values.clear();
            values.extend((0..n).map(|t| surfaces[[t, row, col]] as f64 * scale[t]));
            *result = match median(values) {
                Some(g) if g.is_finite() && g.abs() >= EPSILON => g,
                _ => 1.0,
            };
        }
    };

    let mut gain = Array2::<f64>::zeros((h, w));
    if h * w >= PARALLEL_PIXEL_THRESHOLD && n > 1 {
        let rows: Vec<Vec<f64>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut values = Vec::with_capacity(n);
                let mut row_result = vec![0.0f64; w];
                row_gain(row, &mut values, &mut row_result);
                row_result
            })
            .collect();
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                gain[[row, col]] = val;
            }
        }
    } else {
        let mut values = Vec::with_capacity(n);
        let mut row_result = vec![0.0f64; w];
        for row in 0..h {
            row_gain(row, &mut values, &mut row_result);
            for (col, &val) in row_result.iter().enumerate() {
                gain[[row, col]] = val;
            }
        }
    }
    gain
}
