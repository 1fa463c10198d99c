pub mod config;
pub mod logstd;
pub mod morphology;
pub mod variance;

pub use config::SegmentationConfig;
pub use logstd::{segment_frame, segment_stack, segment_stack_into};
pub use variance::window_variance;
