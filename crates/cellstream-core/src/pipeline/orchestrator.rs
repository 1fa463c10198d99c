use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, SyncSender};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::consts::PROGRESS_CHANNEL_CAPACITY;
use crate::control::CancellationToken;
use crate::error::{CellstreamError, Result};
use crate::frame::ChannelRoles;
use crate::io::source::ChannelSource;

use super::config::PipelineConfig;
use super::job::FovJob;
use super::progress::{run_aggregator, ProgressAggregator, WorkerEvent};
use super::types::{
    BatchReport, FovOutcome, FovState, NoOpReporter, ProgressMessage, ProgressReporter,
};

/// Runs the per-FOV pipeline over a range of FOVs.
///
/// FOVs are processed in batches: each batch's raw channels are first
/// copied out of the source into memory-mapped files, then the batch's FOVs
/// run in parallel on a fixed-size worker pool. A failing FOV never stops
/// its siblings.
pub struct Orchestrator<'a> {
    source: &'a dyn ChannelSource,
    roles: ChannelRoles,
    config: PipelineConfig,
    work_dir: PathBuf,
    cancel: CancellationToken,
    reporter: Arc<dyn ProgressReporter>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn ChannelSource,
        roles: ChannelRoles,
        config: PipelineConfig,
        work_dir: &Path,
    ) -> Result<Self> {
        config.validate()?;
        roles.validate(source.metadata().n_channels)?;
        Ok(Self {
            source,
            roles,
            config,
            work_dir: work_dir.to_path_buf(),
            cancel: CancellationToken::new(),
            reporter: Arc::new(NoOpReporter),
        })
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Job description for one FOV, as dispatched to a worker.
    pub fn job(&self, fov: usize) -> FovJob {
        FovJob::new(
            fov,
            self.roles.clone(),
            self.source.metadata().shape(),
            &self.work_dir,
            self.config.clone(),
        )
    }

    /// Process FOVs `fovs.start..fovs.end`.
    ///
    /// Only setup problems (bad range, pool creation) are returned as
    /// errors; per-FOV failures and cancellation land in the report.
    pub fn run(&self, fovs: Range<usize>) -> Result<BatchReport> {
        let n_fovs = self.source.metadata().n_fovs;
        if fovs.end > n_fovs {
            return Err(CellstreamError::FovIndexOutOfRange {
                index: fovs.end.saturating_sub(1),
                total: n_fovs,
            });
        }

        let workers = self.config.execution.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| CellstreamError::Pipeline(format!("failed to build worker pool: {e}")))?;

        let fov_list: Vec<usize> = fovs.collect();
        info!(
            fovs = fov_list.len(),
            workers,
            batch_size = self.config.execution.batch_size,
            "Starting pipeline"
        );

        let (tx, rx) = sync_channel::<WorkerEvent>(PROGRESS_CHANNEL_CAPACITY);
        let aggregator = ProgressAggregator::new(fov_list.iter().copied());
        let reporter = Arc::clone(&self.reporter);

        let outcomes = std::thread::scope(|scope| {
            scope.spawn(move || run_aggregator(rx, aggregator, reporter));

            let mut outcomes = Vec::with_capacity(fov_list.len());
            for batch in fov_list.chunks(self.config.execution.batch_size) {
                outcomes.extend(self.run_batch(batch, &pool, &tx));
            }
            drop(tx);
            outcomes
        });

        let report = BatchReport::from_outcomes(outcomes);
        self.reporter.progress(1.0, "Done");
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Pipeline finished"
        );
        Ok(report)
    }

    fn run_batch(
        &self,
        batch: &[usize],
        pool: &rayon::ThreadPool,
        tx: &SyncSender<WorkerEvent>,
    ) -> Vec<FovOutcome> {
        let mut outcomes = Vec::with_capacity(batch.len());
        let mut ready = Vec::with_capacity(batch.len());

        for &fov in batch {
            let job = self.job(fov);
            if self.cancel.is_cancelled() {
                outcomes.push(self.finish(tx, cancelled(fov)));
                continue;
            }
            match job.extract_raw(self.source) {
                Ok(()) => ready.push(job),
                Err(e) => {
                    job.remove_all();
                    warn!(fov, error = %e, "Raw extraction failed");
                    outcomes.push(self.finish(
                        tx,
                        FovOutcome {
                            fov,
                            state: FovState::Failed,
                            message: Some(e.to_string()),
                            n_cells: 0,
                        },
                    ));
                }
            }
        }

        let progress = |msg: ProgressMessage| {
            let _ = tx.send(WorkerEvent::Progress(msg));
        };
        let state = |fov: usize, state: FovState| {
            debug!(fov, state = %state, "FOV state");
        };
        let processed: Vec<FovOutcome> = pool.install(|| {
            ready
                .par_iter()
                .map(|job| {
                    let outcome = job.run(&self.cancel, &progress, &state);
                    self.finish(tx, outcome)
                })
                .collect()
        });

        outcomes.extend(processed);
        outcomes
    }

    fn finish(&self, tx: &SyncSender<WorkerEvent>, outcome: FovOutcome) -> FovOutcome {
        let _ = tx.send(WorkerEvent::Finished(outcome.fov));
        self.reporter.fov_finished(&outcome);
        outcome
    }
}

fn cancelled(fov: usize) -> FovOutcome {
    FovOutcome {
        fov,
        state: FovState::Cancelled,
        message: None,
        n_cells: 0,
    }
}
