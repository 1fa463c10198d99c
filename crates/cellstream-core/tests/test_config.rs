use cellstream_core::error::CellstreamError;
use cellstream_core::pipeline::{FovStage, FovState, PipelineConfig};

#[test]
fn test_defaults() {
    let config = PipelineConfig::default();
    assert_eq!(config.segmentation.mask_size, 3);
    assert_eq!(config.background.div_horiz, 7);
    assert_eq!(config.background.div_vert, 5);
    assert_eq!(config.tracking.ignore_size, 300);
    assert_eq!(config.tracking.min_size, 1000);
    assert_eq!(config.tracking.max_size, Some(10_000));
    assert_eq!(config.traces.min_trace_length, 0);
    assert!(config.traces.drop_short);
    assert_eq!(config.execution.workers, 0);
    assert_eq!(config.execution.batch_size, 4);
    assert_eq!(config.execution.progress_interval, 30);
    assert!(config.execution.keep_intermediates);
    assert!(config.validate().is_ok());
}

#[test]
fn test_toml_round_trip() {
    let mut config = PipelineConfig::default();
    config.segmentation.mask_size = 5;
    config.tracking.max_size = None;
    config.execution.workers = 2;
    let text = toml::to_string_pretty(&config).unwrap();
    let back: PipelineConfig = toml::from_str(&text).unwrap();
    assert_eq!(back, config);
}

#[test]
fn test_partial_toml_uses_defaults() {
    let text = r#"
[background]
div_horiz = 4

[execution]
keep_intermediates = false
"#;
    let config: PipelineConfig = toml::from_str(text).unwrap();
    assert_eq!(config.background.div_horiz, 4);
    assert_eq!(config.background.div_vert, 5);
    assert!(!config.execution.keep_intermediates);
    assert_eq!(config.execution.batch_size, 4);
    assert_eq!(config.segmentation.mask_size, 3);
}

#[test]
fn test_empty_toml_is_default() {
    let config: PipelineConfig = toml::from_str("").unwrap();
    assert_eq!(config, PipelineConfig::default());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut config = PipelineConfig::default();
    config.segmentation.mask_size = 2;
    assert!(matches!(config.validate(), Err(CellstreamError::InvalidParameter(_))));

    let mut config = PipelineConfig::default();
    config.background.div_vert = 1;
    assert!(config.validate().is_err());

    let mut config = PipelineConfig::default();
    config.execution.batch_size = 0;
    assert!(config.validate().is_err());

    let mut config = PipelineConfig::default();
    config.tracking.min_size = 20_000;
    assert!(config.validate().is_err());
}

#[test]
fn test_worker_count_resolves() {
    let mut config = PipelineConfig::default();
    assert!(config.execution.worker_count() >= 1);
    config.execution.workers = 3;
    assert_eq!(config.execution.worker_count(), 3);
}

#[test]
fn test_state_display() {
    assert_eq!(FovState::Pending.to_string(), "Pending");
    assert_eq!(
        FovState::Running(FovStage::Correcting).to_string(),
        "Correcting background"
    );
    assert_eq!(FovState::Cancelled.to_string(), "Cancelled");
    assert!(FovState::Done.is_terminal());
    assert!(FovState::Failed.is_terminal());
    assert!(!FovState::Running(FovStage::Tracking).is_terminal());
}
