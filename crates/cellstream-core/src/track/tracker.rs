use std::collections::BTreeMap;

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut3, Axis, Zip};
use tracing::debug;

use crate::control::StageControl;
use crate::error::{CellstreamError, Result};
use crate::frame::{MaskPixel, StackShape};

use super::components::{label_components, Components};
use super::config::TrackingConfig;

/// Greedy overlap tracker.
///
/// Holds the previous labeled frame and the ID counter, so frames must be
/// fed in time order. IDs start at 1, grow monotonically and are never
/// reused.
#[derive(Debug)]
pub struct Tracker {
    config: TrackingConfig,
    prev: Option<Array2<u32>>,
    next_id: u32,
}

impl Tracker {
    pub fn new(config: TrackingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            prev: None,
            next_id: 1,
        })
    }

    /// Number of IDs minted so far.
    pub fn n_ids(&self) -> u32 {
        self.next_id - 1
    }

    /// Label the next mask frame.
    ///
    /// Each size-accepted blob takes the previous-frame ID it overlaps most
    /// (lowest ID on ties), or a fresh ID if it overlaps none. Two blobs
    /// overlapping the same previous cell both inherit its ID.
    pub fn push_frame<M: MaskPixel>(&mut self, mask: ArrayView2<'_, M>) -> Result<Array2<u32>> {
        let comps = label_components(mask);
        if let Some(prev) = &self.prev {
            if prev.dim() != comps.labels.dim() {
                let (h, w) = prev.dim();
                let (fh, fw) = comps.labels.dim();
                return Err(CellstreamError::ShapeMismatch {
                    expected: (1, h, w),
                    found: (1, fh, fw),
                });
            }
        }

        let overlaps = self.overlaps(&comps);
        let mut assigned = vec![0u32; comps.count() + 1];
        let mut rejected = 0usize;
        for label in 1..=comps.count() {
            if !self.config.accepts(comps.area(label as u32)) {
                rejected += 1;
                continue;
            }
            assigned[label] = match best_overlap(&overlaps[label]) {
                Some(id) => id,
                None => self.mint(),
            };
        }
        if rejected > 0 {
            debug!(blobs = comps.count(), rejected, "Discarded blobs outside size limits");
        }

        let labeled = comps.labels.mapv(|l| assigned[l as usize]);
        self.prev = Some(labeled.clone());
        Ok(labeled)
    }

    fn mint(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Overlap histogram per blob: previous ID -> shared pixel count.
    fn overlaps(&self, comps: &Components) -> Vec<BTreeMap<u32, usize>> {
        let mut overlaps = vec![BTreeMap::new(); comps.count() + 1];
        if let Some(prev) = &self.prev {
            Zip::from(&comps.labels).and(prev).for_each(|&cur, &old| {
                if cur > 0 && old > 0 {
                    *overlaps[cur as usize].entry(old).or_insert(0) += 1;
                }
            });
        }
        overlaps
    }
}

fn best_overlap(counts: &BTreeMap<u32, usize>) -> Option<u32> {
    let mut best: Option<(u32, usize)> = None;
    for (&id, &count) in counts {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id)
}

/// Track a whole mask stack into `out`. Returns the number of IDs minted.
pub fn track_into<M: MaskPixel>(
    masks: ArrayView3<'_, M>,
    mut out: ArrayViewMut3<'_, u32>,
    config: &TrackingConfig,
    ctl: &StageControl<'_>,
) -> Result<u32> {
    StackShape::from_dim(masks.dim()).ensure_matches(out.dim())?;
    let mut tracker = Tracker::new(config.clone())?;
    let total = masks.len_of(Axis(0));

    for (t, (mask, mut dst)) in masks
        .axis_iter(Axis(0))
        .zip(out.axis_iter_mut(Axis(0)))
        .enumerate()
    {
        ctl.checkpoint()?;
        let labeled = tracker.push_frame(mask)?;
        dst.assign(&labeled);
        ctl.frame_done(t, total, "Tracking");
    }

    debug!(frames = total, cells = tracker.n_ids(), "Tracking complete");
    Ok(tracker.n_ids())
}

/// Track a whole in-memory stack.
pub fn track_stack<M: MaskPixel>(
    masks: ArrayView3<'_, M>,
    config: &TrackingConfig,
    ctl: &StageControl<'_>,
) -> Result<Array3<u32>> {
    let mut out = Array3::<u32>::zeros(masks.dim());
    track_into(masks, out.view_mut(), config, ctl)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::s;

    fn small_config() -> TrackingConfig {
        TrackingConfig {
            ignore_size: 0,
            min_size: 1,
            max_size: None,
        }
    }

    #[test]
    fn test_tie_picks_lowest_id() {
        let mut counts = BTreeMap::new();
        counts.insert(7, 4);
        counts.insert(3, 4);
        counts.insert(9, 2);
        assert_eq!(best_overlap(&counts), Some(3));
        assert_eq!(best_overlap(&BTreeMap::new()), None);
    }

    #[test]
    fn test_moving_blob_keeps_id() {
        let mut masks = Array3::from_elem((3, 10, 10), false);
        masks.slice_mut(s![0, 2..5, 2..5]).fill(true);
        masks.slice_mut(s![1, 3..6, 3..6]).fill(true);
        masks.slice_mut(s![2, 4..7, 4..7]).fill(true);
        let labels = track_stack(masks.view(), &small_config(), &StageControl::detached()).unwrap();
        assert_eq!(labels[[0, 3, 3]], 1);
        assert_eq!(labels[[1, 4, 4]], 1);
        assert_eq!(labels[[2, 5, 5]], 1);
        assert_eq!(*labels.iter().max().unwrap(), 1);
    }

    #[test]
    fn test_split_blobs_share_parent_id() {
        let mut masks = Array3::from_elem((2, 8, 12), false);
        masks.slice_mut(s![0, 2..6, 1..11]).fill(true);
        masks.slice_mut(s![1, 2..6, 1..5]).fill(true);
        masks.slice_mut(s![1, 2..6, 7..11]).fill(true);
        let labels = track_stack(masks.view(), &small_config(), &StageControl::detached()).unwrap();
        assert_eq!(labels[[1, 3, 2]], 1);
        assert_eq!(labels[[1, 3, 9]], 1);
    }

    #[test]
    fn test_gap_mints_new_id() {
        let mut masks = Array3::from_elem((3, 6, 6), false);
        masks.slice_mut(s![0, 1..4, 1..4]).fill(true);
        masks.slice_mut(s![2, 1..4, 1..4]).fill(true);
        let labels = track_stack(masks.view(), &small_config(), &StageControl::detached()).unwrap();
        assert_eq!(labels[[0, 2, 2]], 1);
        assert_eq!(labels[[2, 2, 2]], 2);
    }

    #[test]
    fn test_rejected_blobs_are_background() {
        let mut masks = Array3::from_elem((1, 10, 10), false);
        masks.slice_mut(s![0, 0..2, 0..2]).fill(true);
        masks.slice_mut(s![0, 5..9, 5..9]).fill(true);
        let cfg = TrackingConfig {
            ignore_size: 4,
            min_size: 5,
            max_size: Some(20),
        };
        let labels = track_stack(masks.view(), &cfg, &StageControl::detached()).unwrap();
        assert_eq!(labels[[0, 0, 0]], 0);
        assert_eq!(labels[[0, 6, 6]], 1);
    }
}
