use serde::{Deserialize, Serialize};

use crate::background::BackgroundConfig;
use crate::consts::{DEFAULT_BATCH_SIZE, DEFAULT_PROGRESS_INTERVAL};
use crate::error::{CellstreamError, Result};
use crate::segment::SegmentationConfig;
use crate::track::TrackingConfig;
use crate::traces::TraceConfig;

/// Full pipeline configuration. Every section falls back to its defaults
/// when absent, so a partial TOML file is valid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub segmentation: SegmentationConfig,
    #[serde(default)]
    pub background: BackgroundConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub traces: TraceConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.segmentation.validate()?;
        self.background.validate()?;
        self.tracking.validate()?;
        self.execution.validate()
    }
}

/// How FOVs are scheduled.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Worker threads; `0` uses the available parallelism.
    #[serde(default)]
    pub workers: usize,
    /// FOVs extracted from the source per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Report progress every this many frames.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    /// Keep raw, mask and corrected stacks after traces are written.
    #[serde(default = "default_keep_intermediates")]
    pub keep_intermediates: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_progress_interval() -> usize {
    DEFAULT_PROGRESS_INTERVAL
}

fn default_keep_intermediates() -> bool {
    true
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            batch_size: DEFAULT_BATCH_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            keep_intermediates: true,
        }
    }
}

impl ExecutionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CellstreamError::InvalidParameter(
                "batch_size must be >= 1".into(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(CellstreamError::InvalidParameter(
                "progress_interval must be >= 1".into(),
            ));
        }
        Ok(())
    }

    /// Resolved worker count.
    pub fn worker_count(&self) -> usize {
        if self.workers > 0 {
            self.workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}
