pub mod config;
pub mod job;
mod orchestrator;
pub mod progress;
pub mod stages;
mod types;

pub use config::{ExecutionConfig, PipelineConfig};
pub use job::FovJob;
pub use orchestrator::Orchestrator;
pub use progress::ProgressAggregator;
pub use stages::{correct_file, extract_file, segment_file, track_file};
pub use types::{
    BatchReport, FovOutcome, FovStage, FovState, NoOpReporter, ProgressMessage, ProgressReporter,
};
