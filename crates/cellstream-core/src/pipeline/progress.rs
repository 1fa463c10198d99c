use std::collections::BTreeMap;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use tracing::debug;

use super::types::{FovStage, ProgressMessage, ProgressReporter};

/// Folds per-FOV progress messages into one overall completion fraction.
///
/// Each FOV weighs the same; within a FOV the four stages weigh the same.
#[derive(Debug, Default)]
pub struct ProgressAggregator {
    per_fov: BTreeMap<usize, f32>,
}

impl ProgressAggregator {
    pub fn new(fovs: impl IntoIterator<Item = usize>) -> Self {
        Self {
            per_fov: fovs.into_iter().map(|fov| (fov, 0.0)).collect(),
        }
    }

    /// Apply one message and return the updated overall fraction.
    pub fn record(&mut self, msg: &ProgressMessage) -> f32 {
        let within = if msg.total == 0 {
            1.0
        } else {
            ((msg.frame + 1) as f32 / msg.total as f32).min(1.0)
        };
        let stages = FovStage::ALL.len() as f32;
        let value = (msg.stage.index() as f32 + within) / stages;
        let entry = self.per_fov.entry(msg.fov).or_insert(0.0);
        *entry = entry.max(value);
        self.fraction()
    }

    /// Mark a FOV as finished regardless of how far its stages got.
    pub fn complete(&mut self, fov: usize) -> f32 {
        self.per_fov.insert(fov, 1.0);
        self.fraction()
    }

    pub fn fraction(&self) -> f32 {
        if self.per_fov.is_empty() {
            return 1.0;
        }
        self.per_fov.values().sum::<f32>() / self.per_fov.len() as f32
    }
}

/// Update sent from workers to the aggregator thread.
#[derive(Clone, Copy, Debug)]
pub(super) enum WorkerEvent {
    Progress(ProgressMessage),
    Finished(usize),
}

/// Drain worker events until every sender is dropped, forwarding the
/// overall fraction to `reporter`.
pub(super) fn run_aggregator(
    rx: Receiver<WorkerEvent>,
    mut aggregator: ProgressAggregator,
    reporter: Arc<dyn ProgressReporter>,
) {
    for event in rx {
        match event {
            WorkerEvent::Progress(msg) => {
                let fraction = aggregator.record(&msg);
                debug!(
                    fov = msg.fov,
                    stage = %msg.stage,
                    frame = msg.frame,
                    total = msg.total,
                    "Progress"
                );
                reporter.progress(fraction, &format!("FOV {}: {}", msg.fov, msg.stage));
            }
            WorkerEvent::Finished(fov) => {
                let fraction = aggregator.complete(fov);
                reporter.progress(fraction, &format!("FOV {fov} finished"));
            }
        }
    }
}
