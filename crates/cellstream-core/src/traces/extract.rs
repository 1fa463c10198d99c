use std::collections::BTreeMap;

use ndarray::{ArrayView2, ArrayView3, Axis};
use num_traits::AsPrimitive;

use crate::control::StageControl;
use crate::error::{CellstreamError, Result};
use crate::frame::StackShape;

/// Features of one cell in one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameMeasurement {
    pub cell: u32,
    pub frame: usize,
    /// Pixel count under the label.
    pub area: usize,
    /// Mean column coordinate.
    pub position_x: f64,
    /// Mean row coordinate.
    pub position_y: f64,
    /// Summed intensity, one entry per fluorescence channel.
    pub intensity_total: Vec<f64>,
}

#[derive(Default)]
struct Accum {
    area: usize,
    sum_x: f64,
    sum_y: f64,
    intensity: Vec<f64>,
}

/// Measure every labeled cell of one frame, in ascending cell order.
pub fn measure_frame<F>(
    labels: ArrayView2<'_, u32>,
    channels: &[ArrayView2<'_, F>],
    frame: usize,
) -> Vec<FrameMeasurement>
where
    F: AsPrimitive<f64>,
{
    let mut cells: BTreeMap<u32, Accum> = BTreeMap::new();
    for ((row, col), &label) in labels.indexed_iter() {
        if label == 0 {
            continue;
        }
        let acc = cells.entry(label).or_insert_with(|| Accum {
            intensity: vec![0.0; channels.len()],
            ..Accum::default()
        });
        acc.area += 1;
        acc.sum_x += col as f64;
        acc.sum_y += row as f64;
        for (sum, channel) in acc.intensity.iter_mut().zip(channels) {
            *sum += channel[[row, col]].as_();
        }
    }

    cells
        .into_iter()
        .map(|(cell, acc)| {
            let n = acc.area as f64;
            FrameMeasurement {
                cell,
                frame,
                area: acc.area,
                position_x: acc.sum_x / n,
                position_y: acc.sum_y / n,
                intensity_total: acc.intensity,
            }
        })
        .collect()
}

/// Measure every frame of a labeled stack against one or more intensity
/// stacks of the same shape.
pub fn extract<F>(
    channels: &[ArrayView3<'_, F>],
    labels: ArrayView3<'_, u32>,
    ctl: &StageControl<'_>,
) -> Result<Vec<FrameMeasurement>>
where
    F: AsPrimitive<f64>,
{
    if channels.is_empty() {
        return Err(CellstreamError::InvalidParameter(
            "trace extraction needs at least one intensity channel".into(),
        ));
    }
    let shape = StackShape::from_dim(labels.dim());
    for channel in channels {
        shape.ensure_matches(channel.dim())?;
    }

    let total = shape.frames;
    let mut measurements = Vec::new();
    for (t, label_frame) in labels.axis_iter(Axis(0)).enumerate() {
        ctl.checkpoint()?;
        let frames: Vec<ArrayView2<'_, F>> = channels
            .iter()
            .map(|c| c.index_axis(Axis(0), t))
            .collect();
        measurements.extend(measure_frame(label_frame, &frames, t));
        ctl.frame_done(t, total, "Extracting traces");
    }
    Ok(measurements)
}
