use ndarray::{s, Array2, ArrayView2, Zip};
use num_traits::AsPrimitive;
use rayon::prelude::*;
use tracing::debug;

use crate::error::Result;
use crate::frame::MaskPixel;

use super::config::BackgroundConfig;
use super::spline::interpolate_grid;
use super::tiles::TileGrid;

/// Background of one fluorescence frame.
#[derive(Clone, Debug)]
pub struct BackgroundEstimate {
    /// Interpolated background at every pixel.
    pub surface: Array2<f64>,
    /// Mean of `surface`, used to normalize it for the gain map.
    pub mean: f64,
}

/// Per-frame background estimator for a fixed frame size.
///
/// The tile grid is built once; each frame then costs one masked median
/// per tile plus the spline evaluation.
#[derive(Clone, Debug)]
pub struct BackgroundEstimator {
    grid: TileGrid,
    height: usize,
    width: usize,
}

impl BackgroundEstimator {
    pub fn new(height: usize, width: usize, config: &BackgroundConfig) -> Result<Self> {
        config.validate()?;
        let grid = TileGrid::new(height, width, config.div_vert, config.div_horiz)?;
        Ok(Self {
            grid,
            height,
            width,
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Median of the non-cell pixels in every tile.
    ///
    /// A tile fully covered by cells takes the median of the frame's
    /// non-cell pixels; if the whole frame is cells it takes the plain
    /// median of the tile.
    pub fn tile_medians<T, M>(&self, frame: ArrayView2<'_, T>, mask: ArrayView2<'_, M>) -> Array2<f64>
    where
        T: AsPrimitive<f64> + Sync,
        M: MaskPixel,
    {
        let n_rows = self.grid.rows.len();
        let n_cols = self.grid.cols.len();

        let medians: Vec<Option<f64>> = (0..n_rows * n_cols)
            .into_par_iter()
            .map_init(Vec::new, |values, idx| {
                let rt = &self.grid.rows[idx / n_cols];
                let ct = &self.grid.cols[idx % n_cols];
                values.clear();
                let tile = frame.slice(s![rt.start..rt.end, ct.start..ct.end]);
                let tile_mask = mask.slice(s![rt.start..rt.end, ct.start..ct.end]);
                Zip::from(&tile).and(&tile_mask).for_each(|&v, &m| {
                    if !m.is_cell() {
                        values.push(v.as_());
                    }
                });
                median(values)
            })
            .collect();

        let covered = medians.iter().filter(|m| m.is_none()).count();
        let fallback = if covered > 0 {
            debug!(tiles = covered, "Tiles have no background pixels, using frame-level median");
            let mut values: Vec<f64> = Zip::from(&frame)
                .and(&mask)
                .fold(Vec::new(), |mut acc, &v, &m| {
                    if !m.is_cell() {
                        acc.push(v.as_());
                    }
                    acc
                });
            median(&mut values)
        } else {
            None
        };

        Array2::from_shape_fn((n_rows, n_cols), |(i, j)| {
            medians[i * n_cols + j]
                .or(fallback)
                .unwrap_or_else(|| {
                    let rt = &self.grid.rows[i];
                    let ct = &self.grid.cols[j];
                    let mut values: Vec<f64> = frame
                        .slice(s![rt.start..rt.end, ct.start..ct.end])
                        .iter()
                        .map(|v| v.as_())
                        .collect();
                    median(&mut values).unwrap_or(0.0)
                })
        })
    }

    /// Estimate the smooth background surface of one frame.
    pub fn estimate<T, M>(
        &self,
        frame: ArrayView2<'_, T>,
        mask: ArrayView2<'_, M>,
    ) -> Result<BackgroundEstimate>
    where
        T: AsPrimitive<f64> + Sync,
        M: MaskPixel,
    {
        let support = self.tile_medians(frame, mask);
        let surface = interpolate_grid(
            &self.grid.row_centers(),
            &self.grid.col_centers(),
            &support,
            self.height,
            self.width,
        )?;
        let mean = surface.mean().unwrap_or(0.0);
        Ok(BackgroundEstimate { surface, mean })
    }
}

/// Median via `select_nth_unstable`; averages the two middle values for
/// even lengths. Reorders `values`.
pub(crate) fn median(values: &mut [f64]) -> Option<f64> {
    let n = values.len();
    if n == 0 {
        return None;
    }
    let mid = n / 2;
    let upper = *values.select_nth_unstable_by(mid, |a, b| a.total_cmp(b)).1;
    if n % 2 == 1 {
        return Some(upper);
    }
    let lower = values[..mid]
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    Some((lower + upper) / 2.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&mut []), None);
    }

    #[test]
    fn test_cells_excluded_from_tile_median() {
        let mut frame = Array2::from_elem((40, 40), 100u16);
        let mut mask = Array2::from_elem((40, 40), false);
        for r in 10..30 {
            for c in 10..30 {
                frame[[r, c]] = 5000;
                mask[[r, c]] = true;
            }
        }
        let est = BackgroundEstimator::new(40, 40, &BackgroundConfig { div_horiz: 3, div_vert: 3 })
            .unwrap();
        let medians = est.tile_medians(frame.view(), mask.view());
        assert!(medians.iter().all(|&m| m == 100.0));
    }

    #[test]
    fn test_covered_tile_uses_frame_background() {
        let mut frame = Array2::from_elem((40, 40), 80.0f32);
        let mut mask = Array2::from_elem((40, 40), 0u8);
        // Cover the top-left tile (rows 0..20, cols 0..20) completely.
        for r in 0..20 {
            for c in 0..20 {
                frame[[r, c]] = 900.0;
                mask[[r, c]] = 1;
            }
        }
        let est = BackgroundEstimator::new(40, 40, &BackgroundConfig { div_horiz: 3, div_vert: 3 })
            .unwrap();
        let medians = est.tile_medians(frame.view(), mask.view());
        assert_eq!(medians[[0, 0]], 80.0);
    }

    #[test]
    fn test_fully_masked_frame_uses_raw_tiles() {
        let frame = Array2::from_elem((32, 32), 7u16);
        let mask = Array2::from_elem((32, 32), true);
        let est = BackgroundEstimator::new(32, 32, &BackgroundConfig { div_horiz: 2, div_vert: 2 })
            .unwrap();
        let bg = est.estimate(frame.view(), mask.view()).unwrap();
        assert_relative_eq!(bg.mean, 7.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flat_background_surface() {
        let frame = Array2::from_elem((48, 64), 250u16);
        let mask = Array2::from_elem((48, 64), false);
        let est = BackgroundEstimator::new(48, 64, &BackgroundConfig::default()).unwrap();
        let bg = est.estimate(frame.view(), mask.view()).unwrap();
        assert!(bg.surface.iter().all(|&v| (v - 250.0).abs() < 1e-9));
        assert_relative_eq!(bg.mean, 250.0, epsilon = 1e-9);
    }
}
