//! File-level stage entry points.
//!
//! Each stage reads its inputs from npy stacks on disk and writes its output
//! the same way, so any stage can be re-run on its own. A missing input
//! yields [`CellstreamError::MissingInput`].

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::background::{correct_into, BackgroundConfig};
use crate::control::StageControl;
use crate::error::{CellstreamError, Result};
use crate::io::npy::{NpyStack, NpyStackMut};
use crate::io::traces::write_traces;
use crate::segment::{segment_stack_into, SegmentationConfig};
use crate::track::{track_into, TrackingConfig};
use crate::traces::{extract, TraceConfig, TraceTable};

/// Segment a raw phase-contrast stack (`<u2`) into a mask stack (`|b1`).
pub fn segment_file(
    phase: &Path,
    mask_out: &Path,
    config: &SegmentationConfig,
    ctl: &StageControl<'_>,
) -> Result<()> {
    let input = NpyStack::<u16>::open(phase)?;
    let mut output = NpyStackMut::<u8>::create(mask_out, input.shape())?;
    segment_stack_into(input.view()?, output.view_mut()?, config, ctl)?;
    output.flush()?;
    debug!(input = %phase.display(), output = %mask_out.display(), "Segmentation written");
    Ok(())
}

/// Background-correct a raw fluorescence stack (`<u2`) into `<f4`.
pub fn correct_file(
    fluor: &Path,
    masks: &Path,
    corrected_out: &Path,
    config: &BackgroundConfig,
    ctl: &StageControl<'_>,
) -> Result<()> {
    let input = NpyStack::<u16>::open(fluor)?;
    let masks = NpyStack::<u8>::open(masks)?;
    let mut output = NpyStackMut::<f32>::create(corrected_out, input.shape())?;
    correct_into(input.view()?, masks.view()?, output.view_mut()?, config, ctl)?;
    output.flush()?;
    debug!(output = %corrected_out.display(), "Corrected fluorescence written");
    Ok(())
}

/// Track a mask stack into a label stack (`<u4`). Returns the IDs minted.
pub fn track_file(
    masks: &Path,
    labels_out: &Path,
    config: &TrackingConfig,
    ctl: &StageControl<'_>,
) -> Result<u32> {
    let input = NpyStack::<u8>::open(masks)?;
    let mut output = NpyStackMut::<u32>::create(labels_out, input.shape())?;
    let n_ids = track_into(input.view()?, output.view_mut()?, config, ctl)?;
    output.flush()?;
    debug!(output = %labels_out.display(), cells = n_ids, "Labels written");
    Ok(n_ids)
}

/// Extract traces from corrected fluorescence stacks and a label stack and
/// write the dense table as CSV.
#[allow(clippy::too_many_arguments)]
pub fn extract_file(
    fov: usize,
    corrected: &[PathBuf],
    labels: &Path,
    traces_out: &Path,
    feature_names: Vec<String>,
    config: &TraceConfig,
    ctl: &StageControl<'_>,
) -> Result<TraceTable> {
    if corrected.len() != feature_names.len() {
        return Err(CellstreamError::InvalidParameter(format!(
            "{} intensity stacks for {} feature columns",
            corrected.len(),
            feature_names.len()
        )));
    }
    let labels = NpyStack::<u32>::open(labels)?;
    let channels = corrected
        .iter()
        .map(|p| NpyStack::<f32>::open(p))
        .collect::<Result<Vec<_>>>()?;
    let views = channels
        .iter()
        .map(|c| c.view())
        .collect::<Result<Vec<_>>>()?;

    let measurements = extract(&views, labels.view()?, ctl)?;
    let table = TraceTable::assemble(
        fov,
        labels.shape().frames,
        feature_names,
        measurements,
        config,
    );
    write_traces(traces_out, &table)?;
    Ok(table)
}
