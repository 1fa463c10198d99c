/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Small epsilon to avoid division by zero in floating-point comparisons.
pub const EPSILON: f64 = 1e-12;

/// Default side length of the local-variance window used for segmentation.
pub const DEFAULT_MASK_SIZE: usize = 3;

/// Number of histogram bins used to locate the background peak of the
/// log-std distribution.
pub const LOGSTD_HISTOGRAM_BINS: usize = 200;

/// Threshold = background peak + this many standard deviations.
pub const LOGSTD_SIGMA_MULTIPLIER: f64 = 3.0;

/// Percentile used as threshold when no valid value lies at or below the peak.
pub const LOGSTD_FALLBACK_PERCENTILE: f64 = 75.0;

/// Iterations of the binary opening during mask cleanup.
pub const OPENING_ITERATIONS: usize = 2;

/// Default number of horizontal tile divisions for background estimation.
pub const DEFAULT_DIV_HORIZ: usize = 7;

/// Default number of vertical tile divisions for background estimation.
pub const DEFAULT_DIV_VERT: usize = 5;

/// Blobs with area at or below this are treated as noise.
pub const DEFAULT_IGNORE_SIZE: usize = 300;

/// Smallest plausible cell area in pixels.
pub const DEFAULT_MIN_SIZE: usize = 1_000;

/// Largest plausible cell area in pixels.
pub const DEFAULT_MAX_SIZE: usize = 10_000;

/// Frames between two progress reports inside a stage.
pub const DEFAULT_PROGRESS_INTERVAL: usize = 30;

/// FOVs extracted from the source container per batch.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Capacity of the bounded progress channel between workers and aggregator.
pub const PROGRESS_CHANNEL_CAPACITY: usize = 256;

/// Alignment of the npy header (magic + version + length + dict).
pub const NPY_HEADER_ALIGN: usize = 64;
