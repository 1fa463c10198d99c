use serde::{Deserialize, Serialize};

/// Post-processing of assembled traces.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    /// Minimum number of frames a cell must exist in to be `good`.
    #[serde(default)]
    pub min_trace_length: usize,
    /// Drop short traces instead of keeping them with `good = false`.
    #[serde(default = "default_drop_short")]
    pub drop_short: bool,
}

fn default_drop_short() -> bool {
    true
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            min_trace_length: 0,
            drop_short: true,
        }
    }
}
