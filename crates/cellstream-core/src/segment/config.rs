use serde::{Deserialize, Serialize};

use crate::consts::DEFAULT_MASK_SIZE;
use crate::error::{CellstreamError, Result};

/// Configuration for phase-contrast segmentation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Side length of the local-variance window (odd, >= 3).
    #[serde(default = "default_mask_size")]
    pub mask_size: usize,
}

fn default_mask_size() -> usize {
    DEFAULT_MASK_SIZE
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mask_size: DEFAULT_MASK_SIZE,
        }
    }
}

impl SegmentationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.mask_size < 3 || self.mask_size % 2 == 0 {
            return Err(CellstreamError::InvalidParameter(format!(
                "mask_size must be odd and >= 3, got {}",
                self.mask_size
            )));
        }
        Ok(())
    }
}
