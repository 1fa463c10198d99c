use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::control::{CancellationToken, StageControl};
use crate::error::{CellstreamError, Result};
use crate::frame::{ChannelRoles, StackShape};
use crate::io::npy::NpyStackMut;
use crate::io::source::ChannelSource;
use crate::traces::feature_names;

use super::config::PipelineConfig;
use super::stages::{correct_file, extract_file, segment_file, track_file};
use super::types::{FovOutcome, FovStage, FovState, ProgressMessage};

/// Everything one worker needs to process one FOV.
///
/// Built by the orchestrator before dispatch; the worker owns every file
/// under `dir` until the job finishes.
#[derive(Clone, Debug)]
pub struct FovJob {
    pub fov: usize,
    pub roles: ChannelRoles,
    pub shape: StackShape,
    pub dir: PathBuf,
    pub config: PipelineConfig,
}

impl FovJob {
    pub fn new(
        fov: usize,
        roles: ChannelRoles,
        shape: StackShape,
        work_dir: &Path,
        config: PipelineConfig,
    ) -> Self {
        Self {
            fov,
            roles,
            shape,
            dir: work_dir.join(format!("fov_{fov:03}")),
            config,
        }
    }

    pub fn raw_path(&self, channel: usize) -> PathBuf {
        self.dir.join(format!("raw_ch{channel}.npy"))
    }

    pub fn mask_path(&self) -> PathBuf {
        self.dir.join("mask.npy")
    }

    pub fn corrected_path(&self, channel: usize) -> PathBuf {
        self.dir.join(format!("corrected_ch{channel}.npy"))
    }

    pub fn labels_path(&self) -> PathBuf {
        self.dir.join("labels.npy")
    }

    pub fn traces_path(&self) -> PathBuf {
        self.dir.join("traces.csv")
    }

    /// Distinct source channels this job reads.
    pub fn channels(&self) -> Vec<usize> {
        let mut channels = vec![self.roles.phase_contrast];
        for &c in &self.roles.fluorescence {
            if !channels.contains(&c) {
                channels.push(c);
            }
        }
        channels
    }

    /// Copy the raw channel stacks of this FOV out of `source` into
    /// memory-mapped files under `dir`.
    pub fn extract_raw(&self, source: &dyn ChannelSource) -> Result<()> {
        for channel in self.channels() {
            let path = self.raw_path(channel);
            let mut stack = NpyStackMut::<u16>::create(&path, self.shape)?;
            source.copy_channel(self.fov, channel, stack.view_mut()?)?;
            stack.flush()?;
        }
        debug!(fov = self.fov, channels = ?self.channels(), "Raw channels extracted");
        Ok(())
    }

    /// Run the four stages in order, converting any error into the outcome.
    ///
    /// `on_progress` receives frame-level progress; `on_state` sees every
    /// state transition.
    pub fn run(
        &self,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ProgressMessage) + Sync),
        on_state: &(dyn Fn(usize, FovState) + Sync),
    ) -> FovOutcome {
        let result = self.run_stages(cancel, on_progress, on_state);
        let outcome = match result {
            Ok(n_cells) => {
                if !self.config.execution.keep_intermediates {
                    self.remove_intermediates();
                }
                info!(fov = self.fov, cells = n_cells, "FOV complete");
                FovOutcome {
                    fov: self.fov,
                    state: FovState::Done,
                    message: None,
                    n_cells,
                }
            }
            Err(e) if e.is_cancelled() => {
                self.remove_all();
                info!(fov = self.fov, "FOV cancelled");
                FovOutcome {
                    fov: self.fov,
                    state: FovState::Cancelled,
                    message: None,
                    n_cells: 0,
                }
            }
            Err(e) => {
                warn!(fov = self.fov, error = %e, "FOV failed");
                FovOutcome {
                    fov: self.fov,
                    state: FovState::Failed,
                    message: Some(e.to_string()),
                    n_cells: 0,
                }
            }
        };
        on_state(self.fov, outcome.state);
        outcome
    }

    fn run_stages(
        &self,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(ProgressMessage) + Sync),
        on_state: &(dyn Fn(usize, FovState) + Sync),
    ) -> Result<usize> {
        let interval = self.config.execution.progress_interval;
        let fov = self.fov;
        let enter = |stage: FovStage| -> Result<()> {
            cancel.check()?;
            debug!(fov, stage = %stage, "Stage started");
            on_state(fov, FovState::Running(stage));
            Ok(())
        };

        enter(FovStage::Segmenting)?;
        let report = stage_progress(fov, FovStage::Segmenting, 0, 1, on_progress);
        let ctl = StageControl::new(cancel.clone())
            .with_progress(&report)
            .with_interval(interval);
        segment_file(
            &self.raw_path(self.roles.phase_contrast),
            &self.mask_path(),
            &self.config.segmentation,
            &ctl,
        )?;

        enter(FovStage::Correcting)?;
        let n_fluor = self.roles.fluorescence.len();
        for (k, &channel) in self.roles.fluorescence.iter().enumerate() {
            let report = stage_progress(fov, FovStage::Correcting, k, n_fluor, on_progress);
            let ctl = StageControl::new(cancel.clone())
                .with_progress(&report)
                .with_interval(interval);
            correct_file(
                &self.raw_path(channel),
                &self.mask_path(),
                &self.corrected_path(channel),
                &self.config.background,
                &ctl,
            )?;
        }

        enter(FovStage::Tracking)?;
        let report = stage_progress(fov, FovStage::Tracking, 0, 1, on_progress);
        let ctl = StageControl::new(cancel.clone())
            .with_progress(&report)
            .with_interval(interval);
        let n_ids = track_file(
            &self.mask_path(),
            &self.labels_path(),
            &self.config.tracking,
            &ctl,
        )?;
        debug!(fov, ids = n_ids, "Tracking finished");

        enter(FovStage::Extracting)?;
        let report = stage_progress(fov, FovStage::Extracting, 0, 1, on_progress);
        let ctl = StageControl::new(cancel.clone())
            .with_progress(&report)
            .with_interval(interval);
        let corrected: Vec<PathBuf> = self
            .roles
            .fluorescence
            .iter()
            .map(|&c| self.corrected_path(c))
            .collect();
        let table = extract_file(
            fov,
            &corrected,
            &self.labels_path(),
            &self.traces_path(),
            feature_names(&self.roles.fluorescence),
            &self.config.traces,
            &ctl,
        )?;

        Ok(table.n_cells())
    }

    /// Delete the raw, mask and corrected stacks, keeping labels and traces.
    pub fn remove_intermediates(&self) {
        let mut paths: Vec<PathBuf> = self.channels().iter().map(|&c| self.raw_path(c)).collect();
        paths.push(self.mask_path());
        paths.extend(self.roles.fluorescence.iter().map(|&c| self.corrected_path(c)));
        for path in paths {
            if let Err(e) = remove_if_exists(&path) {
                warn!(fov = self.fov, path = %path.display(), error = %e, "Failed to remove intermediate");
            }
        }
    }

    /// Delete everything this job wrote.
    pub fn remove_all(&self) {
        if self.dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                warn!(fov = self.fov, error = %e, "Failed to remove partial outputs");
            }
        }
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CellstreamError::Io(e)),
    }
}

/// Adapt a stage's `(frame, total)` callback into `ProgressMessage`s. Part
/// `part` of `parts` maps onto its slice of the stage's overall range.
fn stage_progress<'a>(
    fov: usize,
    stage: FovStage,
    part: usize,
    parts: usize,
    on_progress: &'a (dyn Fn(ProgressMessage) + Sync),
) -> impl Fn(usize, usize, &str) + Sync + 'a {
    move |frame, total, _message| {
        on_progress(ProgressMessage {
            fov,
            stage,
            frame: part * total + frame,
            total: parts * total,
        })
    }
}
