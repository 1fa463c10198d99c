use std::collections::BTreeMap;

use tracing::debug;

use super::config::TraceConfig;
use super::extract::FrameMeasurement;

/// One `(cell, frame)` row of the dense trace grid.
///
/// Rows with `exist == false` keep their key but carry no feature values.
#[derive(Clone, Debug, PartialEq)]
pub struct CellRecord {
    pub fov: usize,
    pub frame: usize,
    pub cell: u32,
    /// Per-cell flag, identical on every row of the cell.
    pub good: bool,
    pub exist: bool,
    pub position_x: Option<f64>,
    pub position_y: Option<f64>,
    pub area: Option<usize>,
    /// Values for `TraceTable::feature_names`, in order.
    pub features: Vec<Option<f64>>,
}

/// Dense cell x frame trace table of one FOV, sorted by cell then frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TraceTable {
    pub feature_names: Vec<String>,
    pub records: Vec<CellRecord>,
}

/// Feature column names for the selected fluorescence channels.
pub fn feature_names(fluorescence: &[usize]) -> Vec<String> {
    match fluorescence {
        [_] => vec!["intensity_total".to_string()],
        many => many
            .iter()
            .map(|c| format!("intensity_total_ch{c}"))
            .collect(),
    }
}

impl TraceTable {
    /// Build the dense grid: every cell seen in any frame gets exactly
    /// `n_frames` rows.
    pub fn assemble(
        fov: usize,
        n_frames: usize,
        feature_names: Vec<String>,
        measurements: Vec<FrameMeasurement>,
        config: &TraceConfig,
    ) -> Self {
        let n_features = feature_names.len();
        let mut by_cell: BTreeMap<u32, Vec<Option<FrameMeasurement>>> = BTreeMap::new();
        for m in measurements {
            if m.frame >= n_frames {
                continue;
            }
            let slots = by_cell.entry(m.cell).or_insert_with(|| vec![None; n_frames]);
            let frame = m.frame;
            slots[frame] = Some(m);
        }

        let mut records = Vec::with_capacity(by_cell.len() * n_frames);
        let mut dropped = 0usize;
        for (cell, slots) in by_cell {
            let exist_count = slots.iter().filter(|s| s.is_some()).count();
            let good = exist_count >= config.min_trace_length;
            if !good && config.drop_short {
                dropped += 1;
                continue;
            }
            for (frame, slot) in slots.into_iter().enumerate() {
                records.push(match slot {
                    Some(m) => CellRecord {
                        fov,
                        frame,
                        cell,
                        good,
                        exist: true,
                        position_x: Some(m.position_x),
                        position_y: Some(m.position_y),
                        area: Some(m.area),
                        features: m.intensity_total.into_iter().map(Some).collect(),
                    },
                    None => CellRecord {
                        fov,
                        frame,
                        cell,
                        good,
                        exist: false,
                        position_x: None,
                        position_y: None,
                        area: None,
                        features: vec![None; n_features],
                    },
                });
            }
        }

        if dropped > 0 {
            debug!(fov, dropped, min_trace_length = config.min_trace_length, "Dropped short traces");
        }

        Self {
            feature_names,
            records,
        }
    }

    /// Distinct cell IDs, ascending.
    pub fn cells(&self) -> Vec<u32> {
        let mut cells: Vec<u32> = self.records.iter().map(|r| r.cell).collect();
        cells.dedup();
        cells
    }

    pub fn n_cells(&self) -> usize {
        self.cells().len()
    }

    /// Rows of one cell, in frame order.
    pub fn rows_for(&self, cell: u32) -> impl Iterator<Item = &CellRecord> {
        self.records.iter().filter(move |r| r.cell == cell)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
