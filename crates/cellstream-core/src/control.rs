use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::consts::DEFAULT_PROGRESS_INTERVAL;
use crate::error::{CellstreamError, Result};

/// Cooperative cancellation flag shared between a caller and the stages it
/// runs. Stages poll it between frames, never mid-frame.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Cancelled)` once `cancel()` has been called.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(CellstreamError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Per-frame progress callback: `(frame_index, total_frames, message)`.
pub type FrameProgress<'a> = &'a (dyn Fn(usize, usize, &str) + Sync);

/// Cancellation and progress plumbing handed to every frame-sequential stage.
#[derive(Clone)]
pub struct StageControl<'a> {
    cancel: CancellationToken,
    progress: Option<FrameProgress<'a>>,
    interval: usize,
}

impl<'a> StageControl<'a> {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            progress: None,
            interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// No progress reporting and a token nobody can cancel.
    pub fn detached() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn with_progress(mut self, progress: FrameProgress<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Report every `interval` frames (and always on the last frame).
    pub fn with_interval(mut self, interval: usize) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Called before processing a frame.
    pub fn checkpoint(&self) -> Result<()> {
        self.cancel.check()
    }

    /// Called after frame `index` of `total` has been processed.
    pub fn frame_done(&self, index: usize, total: usize, message: &str) {
        let Some(progress) = self.progress else {
            return;
        };
        let done = index + 1;
        if done % self.interval == 0 || done == total {
            progress(index, total, message);
        }
    }
}
