use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Zip};
use num_traits::AsPrimitive;
use tracing::debug;

use crate::consts::{
    LOGSTD_FALLBACK_PERCENTILE, LOGSTD_HISTOGRAM_BINS, LOGSTD_SIGMA_MULTIPLIER, OPENING_ITERATIONS,
};
use crate::control::StageControl;
use crate::error::Result;
use crate::frame::StackShape;

use super::config::SegmentationConfig;
use super::morphology::{dilate, erode, fill_holes, opening, StructuringElement};
use super::variance::window_variance;

/// Log-std transform of a local-variance map.
///
/// Returns `(values, valid)`: where the variance is positive,
/// `v' = (ln(v) - ln(mask_size^2 - 1)) / 2`; zero-variance pixels get
/// `v' = 0` and `valid = false`.
pub fn log_std(variance: &Array2<f64>, mask_size: usize) -> (Array2<f64>, Array2<bool>) {
    let norm = ((mask_size * mask_size - 1) as f64).ln();
    let valid = variance.mapv(|v| v > 0.0);
    let values = variance.mapv(|v| if v > 0.0 { (v.ln() - norm) / 2.0 } else { 0.0 });
    (values, valid)
}

/// Threshold separating the background peak of the log-std distribution
/// from cell texture.
///
/// Only valid pixels (positive variance) take part. The peak is the centre
/// of the fullest of 200 equal-width bins over their range. The threshold is
/// the peak plus three standard deviations of the valid values at or below
/// it; if none lie at or below the peak the 75th percentile of the valid
/// values is used instead. Returns `None` when no pixel is valid.
pub fn logstd_threshold(values: &Array2<f64>, valid: &Array2<bool>) -> Option<f64> {
    let mut valid_values: Vec<f64> = values
        .iter()
        .zip(valid.iter())
        .filter_map(|(&v, &ok)| ok.then_some(v))
        .collect();
    if valid_values.is_empty() {
        return None;
    }

    let (lo, hi) = valid_values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let (lo, hi) = if hi - lo > 0.0 {
        (lo, hi)
    } else {
        (lo - 0.5, hi + 0.5)
    };

    let bins = LOGSTD_HISTOGRAM_BINS;
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for &v in &valid_values {
        let bin = (((v - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    // First bin with the highest count.
    let mut peak_bin = 0;
    for (i, &count) in counts.iter().enumerate() {
        if count > counts[peak_bin] {
            peak_bin = i;
        }
    }
    let mode = lo + (peak_bin as f64 + 0.5) * width;

    let below: Vec<f64> = valid_values.iter().copied().filter(|&v| v <= mode).collect();
    if below.is_empty() {
        debug!(mode, "No values below histogram peak, using percentile threshold");
        return Some(percentile(&mut valid_values, LOGSTD_FALLBACK_PERCENTILE));
    }

    let n = below.len() as f64;
    let mean = below.iter().sum::<f64>() / n;
    let var = below.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(mode + LOGSTD_SIGMA_MULTIPLIER * var.sqrt())
}

/// Segment one phase-contrast frame into cell (`true`) and background.
pub fn segment_frame<T>(frame: ArrayView2<'_, T>, config: &SegmentationConfig) -> Array2<bool>
where
    T: AsPrimitive<f64>,
{
    let variance = window_variance(frame, config.mask_size);
    let (values, valid) = log_std(&variance, config.mask_size);

    let Some(threshold) = logstd_threshold(&values, &valid) else {
        return Array2::from_elem(frame.dim(), false);
    };

    let mut binary = Array2::from_elem(frame.dim(), false);
    Zip::from(&mut binary)
        .and(&values)
        .and(&valid)
        .for_each(|b, &v, &ok| *b = ok && v >= threshold);

    clean_mask(&binary)
}

/// Dilate, fill holes, open with a rounded 5x5 element, then erode once
/// with the image border treated as foreground.
pub fn clean_mask(binary: &Array2<bool>) -> Array2<bool> {
    let dilated = dilate(binary, &StructuringElement::square(3));
    let filled = fill_holes(&dilated);
    let opened = opening(
        &filled,
        &StructuringElement::square_without_corners(5),
        OPENING_ITERATIONS,
    );
    let kept = &filled & &opened;
    erode(&kept, &StructuringElement::cross(), true)
}

/// Segment every frame of a stack into `out`.
///
/// `out` may be a memory-mapped `u8` stack or an in-memory `bool` stack.
pub fn segment_stack_into<T, M>(
    frames: ArrayView3<'_, T>,
    mut out: ArrayViewMut3<'_, M>,
    config: &SegmentationConfig,
    ctl: &StageControl<'_>,
) -> Result<()>
where
    T: AsPrimitive<f64>,
    M: From<bool> + Copy,
{
    config.validate()?;
    let total = frames.len_of(Axis(0));
    StackShape::from_dim(frames.dim()).ensure_matches(out.dim())?;

    for (t, (frame, mut dst)) in frames
        .axis_iter(Axis(0))
        .zip(out.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        ctl.checkpoint()?;
        let mask = segment_frame(frame, config);
        Zip::from(&mut dst).and(&mask).for_each(|d, &m| *d = M::from(m));
        ctl.frame_done(t, total, "Segmenting");
    }
    Ok(())
}

/// Segment a whole in-memory stack.
pub fn segment_stack<T>(
    frames: ArrayView3<'_, T>,
    config: &SegmentationConfig,
    ctl: &StageControl<'_>,
) -> Result<Array3<bool>>
where
    T: AsPrimitive<f64>,
{
    let mut out = Array3::from_elem(frames.dim(), false);
    segment_stack_into(frames, out.view_mut(), config, ctl)?;
    Ok(out)
}

/// Linear-interpolated percentile of `values` (sorted in place).
fn percentile(values: &mut [f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let pos = pct / 100.0 * (values.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    values[lower] + (values[upper] - values[lower]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_log_std_marks_flat_pixels_invalid() {
        let variance = Array2::from_shape_vec((1, 3), vec![0.0, 8.0, 8.0 * std::f64::consts::E.powi(2)])
            .unwrap();
        let (values, valid) = log_std(&variance, 3);
        assert!(!valid[[0, 0]]);
        assert_eq!(values[[0, 0]], 0.0);
        assert_relative_eq!(values[[0, 1]], 0.0, epsilon = 1e-12);
        assert_relative_eq!(values[[0, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_threshold_none_for_flat_frame() {
        let values = Array2::zeros((4, 4));
        let valid = Array2::from_elem((4, 4), false);
        assert!(logstd_threshold(&values, &valid).is_none());
    }

    #[test]
    fn test_threshold_above_background_peak() {
        // Broad background around 1.0, a few textured pixels around 5.0.
        let mut values = Array2::from_shape_fn((20, 20), |(r, c)| 1.0 + ((r * 20 + c) % 7) as f64 * 0.01);
        for c in 0..10 {
            values[[0, c]] = 5.0;
        }
        let valid = Array2::from_elem((20, 20), true);
        let t = logstd_threshold(&values, &valid).unwrap();
        assert!(t > 1.0 && t < 5.0, "threshold {t}");
    }

    #[test]
    fn test_threshold_ignores_invalid_pixels() {
        let textured = |i: usize| 1.0 + (i % 7) as f64 * 0.01;
        // Valid values only.
        let mut dense = Array2::from_shape_fn((10, 20), |(r, c)| textured(r * 20 + c));
        for c in 0..6 {
            dense[[0, c]] = 5.0;
        }
        let expected = logstd_threshold(&dense, &Array2::from_elem((10, 20), true)).unwrap();

        // The same valid values followed by a larger flat region at 0.
        let mut values = Array2::zeros((30, 20));
        values.slice_mut(ndarray::s![0..10, ..]).assign(&dense);
        let mut valid = Array2::from_elem((30, 20), false);
        valid.slice_mut(ndarray::s![0..10, ..]).fill(true);

        let t = logstd_threshold(&values, &valid).unwrap();
        assert_relative_eq!(t, expected, epsilon = 1e-12);
        assert!(t > 1.0, "threshold {t}");
    }

    #[test]
    fn test_percentile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0, 5.0];
        assert_relative_eq!(percentile(&mut v, 75.0), 4.0);
        let mut w = vec![0.0, 10.0];
        assert_relative_eq!(percentile(&mut w, 75.0), 7.5);
    }

    #[test]
    fn test_uniform_frame_is_background() {
        let frame = Array2::from_elem((32, 32), 1234u16);
        let mask = segment_frame(frame.view(), &SegmentationConfig::default());
        assert!(mask.iter().all(|&m| !m));
    }
}
