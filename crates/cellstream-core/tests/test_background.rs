use approx::assert_relative_eq;
use cellstream_core::background::{correct_stack, BackgroundConfig, BackgroundEstimator};
use cellstream_core::control::StageControl;
use cellstream_core::error::CellstreamError;
use ndarray::{s, Array2, Array3};

#[test]
fn test_flat_frame_corrects_to_zero() {
    let fluor = Array3::from_elem((3, 64, 64), 1234u16);
    let masks = Array3::from_elem((3, 64, 64), false);
    let out = correct_stack(
        fluor.view(),
        masks.view(),
        &BackgroundConfig::default(),
        &StageControl::detached(),
    )
    .unwrap();
    assert_eq!(out.dim(), (3, 64, 64));
    assert!(out.iter().all(|v| v.abs() < 1e-3));
}

#[test]
fn test_lamp_decay_removed() {
    // Flat illumination dimming over time.
    let fluor = Array3::from_shape_fn((4, 48, 64), |(t, _, _)| 1000 - 100 * t as u16);
    let masks = Array3::from_elem((4, 48, 64), 0u8);
    let out = correct_stack(
        fluor.view(),
        masks.view(),
        &BackgroundConfig::default(),
        &StageControl::detached(),
    )
    .unwrap();
    assert!(out.iter().all(|v| v.abs() < 1e-2));
}

#[test]
fn test_vignetting_follows_surface() {
    // Smooth radial falloff with no cells: the surface should track it.
    let (h, w) = (80usize, 96usize);
    let frame = Array2::from_shape_fn((h, w), |(r, c)| {
        let dr = r as f64 - 40.0;
        let dc = c as f64 - 48.0;
        (2000.0 - 0.1 * (dr * dr + dc * dc)) as u16
    });
    let mask = Array2::from_elem((h, w), false);
    let est = BackgroundEstimator::new(h, w, &BackgroundConfig::default()).unwrap();
    let bg = est.estimate(frame.view(), mask.view()).unwrap();
    let centre_err = (bg.surface[[40, 48]] - frame[[40, 48]] as f64).abs();
    assert!(centre_err < 15.0, "centre error {centre_err}");
    assert!(bg.surface[[40, 48]] > bg.surface[[5, 5]]);
}

#[test]
fn test_cells_keep_their_signal() {
    let mut fluor = Array3::from_elem((3, 64, 64), 100u16);
    let mut masks = Array3::from_elem((3, 64, 64), false);
    fluor.slice_mut(s![.., 20..40, 20..40]).fill(900);
    masks.slice_mut(s![.., 20..40, 20..40]).fill(true);
    let out = correct_stack(
        fluor.view(),
        masks.view(),
        &BackgroundConfig::default(),
        &StageControl::detached(),
    )
    .unwrap();
    assert_relative_eq!(out[[1, 30, 30]], 800.0, epsilon = 1e-2);
    assert_relative_eq!(out[[1, 5, 5]], 0.0, epsilon = 1e-2);
}

#[test]
fn test_shape_mismatch_rejected() {
    let fluor = Array3::<u16>::zeros((2, 32, 32));
    let masks = Array3::from_elem((2, 32, 31), false);
    let err = correct_stack(
        fluor.view(),
        masks.view(),
        &BackgroundConfig::default(),
        &StageControl::detached(),
    )
    .unwrap_err();
    assert!(matches!(err, CellstreamError::ShapeMismatch { .. }));
}

#[test]
fn test_frame_too_small_for_tiles() {
    let fluor = Array3::<u16>::zeros((1, 6, 6));
    let masks = Array3::from_elem((1, 6, 6), false);
    let err = correct_stack(
        fluor.view(),
        masks.view(),
        &BackgroundConfig::default(),
        &StageControl::detached(),
    )
    .unwrap_err();
    assert!(matches!(err, CellstreamError::InvalidParameter(_)));
}
