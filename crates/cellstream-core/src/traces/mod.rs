pub mod config;
pub mod extract;
pub mod table;

pub use config::TraceConfig;
pub use extract::{extract, measure_frame, FrameMeasurement};
pub use table::{feature_names, CellRecord, TraceTable};
