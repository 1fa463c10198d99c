mod common;

use approx::assert_relative_eq;
use cellstream_core::control::StageControl;
use cellstream_core::io::traces::{read_traces, write_traces};
use cellstream_core::segment::{segment_stack, SegmentationConfig};
use cellstream_core::track::{track_stack, TrackingConfig};
use cellstream_core::traces::{extract, feature_names, TraceConfig, TraceTable};
use ndarray::{Array3, Axis};

use common::{static_square_fluor, static_square_stack, two_square_fluor, two_square_stack};

fn traces_for(
    phase: &Array3<u16>,
    fluor: &Array3<u16>,
    config: &TraceConfig,
) -> (Array3<u32>, TraceTable) {
    let ctl = StageControl::detached();
    let masks = segment_stack(phase.view(), &SegmentationConfig::default(), &ctl).unwrap();
    let labels = track_stack(masks.view(), &TrackingConfig::default(), &ctl).unwrap();
    let fluor = fluor.mapv(|v| v as f32);
    let measurements = extract(&[fluor.view()], labels.view(), &ctl).unwrap();
    let table = TraceTable::assemble(
        0,
        phase.len_of(Axis(0)),
        feature_names(&[1]),
        measurements,
        config,
    );
    (labels, table)
}

#[test]
fn test_static_square_traces() {
    let (_, table) = traces_for(&static_square_stack(), &static_square_fluor(), &TraceConfig::default());
    assert_eq!(table.cells(), vec![1]);
    assert_eq!(table.records.len(), 3);

    let first = &table.records[0];
    for r in &table.records {
        assert!(r.exist);
        assert!(r.good);
        let area = r.area.unwrap();
        assert!((1600..=1800).contains(&area), "area {area}");
        assert_relative_eq!(r.position_x.unwrap(), 31.5, epsilon = 1e-9);
        assert_relative_eq!(r.position_y.unwrap(), 31.5, epsilon = 1e-9);
        // 1600 square pixels at 200, the rest of the mask at 50.
        let expected = 200.0 * 1600.0 + 50.0 * (area - 1600) as f64;
        assert_relative_eq!(r.features[0].unwrap(), expected, epsilon = 1e-6);
        assert_eq!(r.area, first.area);
    }
}

#[test]
fn test_dense_grid_per_cell() {
    let stack = two_square_stack();
    let (labels, table) = traces_for(&stack, &two_square_fluor(), &TraceConfig::default());
    let n_frames = stack.len_of(Axis(0));

    assert_eq!(table.cells(), vec![1, 2]);
    for cell in table.cells() {
        assert_eq!(table.rows_for(cell).count(), n_frames);
    }

    let cell1: Vec<_> = table.rows_for(1).collect();
    assert!(cell1[0].exist && cell1[1].exist && !cell1[2].exist);
    assert_eq!(cell1[2].features, vec![None]);
    assert_eq!(cell1[2].position_x, None);

    let cell2: Vec<_> = table.rows_for(2).collect();
    assert!(!cell2[0].exist && cell2[1].exist && cell2[2].exist);

    // Area round-trips against the labeled stack.
    for r in table.records.iter().filter(|r| r.exist) {
        let frame = labels.index_axis(Axis(0), r.frame);
        let pixels = frame.iter().filter(|&&l| l == r.cell).count();
        assert_eq!(r.area, Some(pixels));
    }
}

#[test]
fn test_rows_sorted_by_cell_then_frame() {
    let (_, table) = traces_for(&two_square_stack(), &two_square_fluor(), &TraceConfig::default());
    let keys: Vec<(u32, usize)> = table.records.iter().map(|r| (r.cell, r.frame)).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_min_trace_length() {
    let stack = two_square_stack();
    let keep = TraceConfig {
        min_trace_length: 3,
        drop_short: false,
    };
    let (_, table) = traces_for(&stack, &two_square_fluor(), &keep);
    assert_eq!(table.n_cells(), 2);
    assert!(table.records.iter().all(|r| !r.good));

    let drop = TraceConfig {
        min_trace_length: 3,
        drop_short: true,
    };
    let (_, table) = traces_for(&stack, &two_square_fluor(), &drop);
    assert!(table.is_empty());
}

#[test]
fn test_csv_round_trip() {
    let (_, table) = traces_for(&two_square_stack(), &two_square_fluor(), &TraceConfig::default());
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("traces.csv");
    write_traces(&path, &table).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("fov,time,cell,good,exist,position_x,position_y,area,intensity_total\n"));

    let back = read_traces(&path).unwrap();
    assert_eq!(back.feature_names, table.feature_names);
    assert_eq!(back.records.len(), table.records.len());
    for (a, b) in back.records.iter().zip(&table.records) {
        assert_eq!((a.cell, a.frame, a.exist, a.good, a.area), (b.cell, b.frame, b.exist, b.good, b.area));
        match (a.features[0], b.features[0]) {
            (Some(x), Some(y)) => assert_relative_eq!(x, y, epsilon = 1e-9),
            (None, None) => {}
            other => panic!("feature mismatch: {other:?}"),
        }
    }
}

#[test]
fn test_read_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_traces(&dir.path().join("nope.csv")).unwrap_err();
    assert!(matches!(err, cellstream_core::error::CellstreamError::MissingInput(_)));
}
