/// Processing stage of one FOV, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FovStage {
    Segmenting,
    Correcting,
    Tracking,
    Extracting,
}

impl FovStage {
    pub const ALL: [FovStage; 4] = [
        Self::Segmenting,
        Self::Correcting,
        Self::Tracking,
        Self::Extracting,
    ];

    /// Position in the per-FOV sequence.
    pub fn index(self) -> usize {
        match self {
            Self::Segmenting => 0,
            Self::Correcting => 1,
            Self::Tracking => 2,
            Self::Extracting => 3,
        }
    }
}

impl std::fmt::Display for FovStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Segmenting => write!(f, "Segmenting"),
            Self::Correcting => write!(f, "Correcting background"),
            Self::Tracking => write!(f, "Tracking"),
            Self::Extracting => write!(f, "Extracting traces"),
        }
    }
}

/// Lifecycle of one FOV.
///
/// `Pending -> Segmenting -> Correcting -> Tracking -> Extracting -> Done`,
/// with `Failed` and `Cancelled` reachable from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FovState {
    Pending,
    Running(FovStage),
    Done,
    Failed,
    Cancelled,
}

impl FovState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for FovState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running(stage) => write!(f, "{stage}"),
            Self::Done => write!(f, "Done"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Progress update sent from a worker: frame `frame` of `total` done in
/// `stage` of FOV `fov`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressMessage {
    pub fov: usize,
    pub stage: FovStage,
    pub frame: usize,
    pub total: usize,
}

/// Final status of one FOV.
#[derive(Clone, Debug, PartialEq)]
pub struct FovOutcome {
    pub fov: usize,
    pub state: FovState,
    /// Error text for failed FOVs.
    pub message: Option<String>,
    /// Cells in the written trace table.
    pub n_cells: usize,
}

/// Per-FOV results of one orchestrator run, in FOV order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<FovOutcome>,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl BatchReport {
    pub fn from_outcomes(mut outcomes: Vec<FovOutcome>) -> Self {
        outcomes.sort_by_key(|o| o.fov);
        let count = |state: FovState| outcomes.iter().filter(|o| o.state == state).count();
        Self {
            succeeded: count(FovState::Done),
            failed: count(FovState::Failed),
            cancelled: count(FovState::Cancelled),
            outcomes,
        }
    }

    pub fn outcome(&self, fov: usize) -> Option<&FovOutcome> {
        self.outcomes.iter().find(|o| o.fov == fov)
    }
}

/// Thread-safe progress reporting for orchestrator runs.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// Overall completion in `0.0..=1.0` with a short description.
    fn progress(&self, _fraction: f32, _message: &str) {}

    /// A FOV reached a terminal state.
    fn fov_finished(&self, _outcome: &FovOutcome) {}
}

/// No-op progress reporter.
pub struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
