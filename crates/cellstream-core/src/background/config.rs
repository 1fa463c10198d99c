use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_DIV_HORIZ, DEFAULT_DIV_VERT};
use crate::error::{CellstreamError, Result};

/// Configuration for tile-based background correction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackgroundConfig {
    /// Horizontal tile divisions; yields `2 * div_horiz - 3` tile columns.
    #[serde(default = "default_div_horiz")]
    pub div_horiz: usize,
    /// Vertical tile divisions; yields `2 * div_vert - 3` tile rows.
    #[serde(default = "default_div_vert")]
    pub div_vert: usize,
}

fn default_div_horiz() -> usize {
    DEFAULT_DIV_HORIZ
}

fn default_div_vert() -> usize {
    DEFAULT_DIV_VERT
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            div_horiz: DEFAULT_DIV_HORIZ,
            div_vert: DEFAULT_DIV_VERT,
        }
    }
}

impl BackgroundConfig {
    pub fn validate(&self) -> Result<()> {
        if self.div_horiz < 2 || self.div_vert < 2 {
            return Err(CellstreamError::InvalidParameter(format!(
                "tile divisions must be >= 2, got div_horiz={} div_vert={}",
                self.div_horiz, self.div_vert
            )));
        }
        Ok(())
    }
}
