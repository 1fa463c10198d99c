use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cellstream_core::frame::ChannelRoles;
use cellstream_core::io::source::{ChannelSource, NpyDirSource};
use cellstream_core::pipeline::{FovOutcome, Orchestrator, PipelineConfig, ProgressReporter};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

use crate::summary::{outcome_line, print_report, print_run_summary};

#[derive(Args)]
pub struct RunArgs {
    /// Input directory of `fov_NNN_chC.npy` uint16 stacks
    pub input: PathBuf,

    /// Working directory for per-FOV outputs
    #[arg(short, long, default_value = "cellstream-out")]
    pub output: PathBuf,

    /// Pipeline config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// FOVs to process: a single index or `START..END` (default: all)
    #[arg(long, value_parser = parse_fov_range)]
    pub fovs: Option<Range<usize>>,

    /// Phase-contrast channel
    #[arg(long, default_value = "0")]
    pub phase: usize,

    /// Comma-separated fluorescence channels
    #[arg(long, value_delimiter = ',', default_value = "1")]
    pub fluor: Vec<usize>,

    /// Worker threads (0 = available parallelism)
    #[arg(long)]
    pub workers: Option<usize>,

    /// FOVs extracted from the source per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Local-variance window side length (odd)
    #[arg(long)]
    pub mask_size: Option<usize>,

    /// Blobs at or below this area are ignored
    #[arg(long)]
    pub ignore_size: Option<usize>,

    /// Minimum cell area
    #[arg(long)]
    pub min_size: Option<usize>,

    /// Maximum cell area (0 = unlimited)
    #[arg(long)]
    pub max_size: Option<usize>,

    /// Minimum number of frames a cell must exist in
    #[arg(long)]
    pub min_trace_length: Option<usize>,

    /// Keep short traces, flagged as not good, instead of dropping them
    #[arg(long)]
    pub keep_short: bool,

    /// Delete raw, mask and corrected stacks once traces are written
    #[arg(long)]
    pub discard_intermediates: bool,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let mut config: PipelineConfig = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        toml::from_str(&contents).context("Invalid pipeline config")?
    } else {
        PipelineConfig::default()
    };
    apply_overrides(&mut config, args);
    debug!(?config, "Resolved pipeline config");

    let source = NpyDirSource::open(&args.input)
        .with_context(|| format!("Failed to open input directory {}", args.input.display()))?;
    let fovs = args.fovs.clone().unwrap_or(0..source.metadata().n_fovs);
    let roles = ChannelRoles::new(args.phase, args.fluor.clone());

    print_run_summary(&args.input, &args.output, source.metadata(), &roles, &fovs, &config);

    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:20} [{bar:40}] {pos}%")?
            .progress_chars("=> "),
    );
    let reporter = Arc::new(BarReporter { pb: pb.clone() });

    let orchestrator = Orchestrator::new(&source, roles, config, &args.output)
        .context("Invalid pipeline setup")?
        .with_reporter(reporter);
    let report = orchestrator.run(fovs)?;

    pb.finish_with_message("Done");
    print_report(&report, &args.output);

    if report.failed > 0 {
        bail!("{} of {} FOVs failed", report.failed, report.outcomes.len());
    }
    Ok(())
}

fn apply_overrides(config: &mut PipelineConfig, args: &RunArgs) {
    if let Some(workers) = args.workers {
        config.execution.workers = workers;
    }
    if let Some(batch_size) = args.batch_size {
        config.execution.batch_size = batch_size;
    }
    if let Some(mask_size) = args.mask_size {
        config.segmentation.mask_size = mask_size;
    }
    if let Some(ignore_size) = args.ignore_size {
        config.tracking.ignore_size = ignore_size;
    }
    if let Some(min_size) = args.min_size {
        config.tracking.min_size = min_size;
    }
    if let Some(max_size) = args.max_size {
        config.tracking.max_size = (max_size > 0).then_some(max_size);
    }
    if let Some(min_trace_length) = args.min_trace_length {
        config.traces.min_trace_length = min_trace_length;
    }
    if args.keep_short {
        config.traces.drop_short = false;
    }
    if args.discard_intermediates {
        config.execution.keep_intermediates = false;
    }
}

fn parse_fov_range(s: &str) -> Result<Range<usize>, String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid FOV index '{v}': {e}"))
    };
    match s.split_once("..") {
        Some((start, end)) => {
            let (start, end) = (parse(start)?, parse(end)?);
            if start >= end {
                return Err(format!("empty FOV range {start}..{end}"));
            }
            Ok(start..end)
        }
        None => {
            let index = parse(s)?;
            Ok(index..index + 1)
        }
    }
}

struct BarReporter {
    pb: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn progress(&self, fraction: f32, message: &str) {
        self.pb.set_message(message.to_string());
        self.pb.set_position((fraction.clamp(0.0, 1.0) * 100.0) as u64);
    }

    fn fov_finished(&self, outcome: &FovOutcome) {
        self.pb.println(outcome_line(outcome));
    }
}
