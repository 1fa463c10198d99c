use std::ops::Range;
use std::path::Path;

use cellstream_core::frame::{ChannelRoles, StackMetadata};
use cellstream_core::pipeline::{BatchReport, FovOutcome, FovState, PipelineConfig};
use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    ok: Style,
    failed: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            ok: Style::new().green(),
            failed: Style::new().red().bold(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

pub fn print_run_summary(
    input: &Path,
    output: &Path,
    meta: &StackMetadata,
    roles: &ChannelRoles,
    fovs: &Range<usize>,
    config: &PipelineConfig,
) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Cellstream Pipeline"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(19)));
    println!();

    println!("  {:<14}{}", s.label.apply_to("Input"), s.path.apply_to(input.display()));
    println!("  {:<14}{}", s.label.apply_to("Output"), s.path.apply_to(output.display()));
    println!(
        "  {:<14}{}",
        s.label.apply_to("Stacks"),
        s.value.apply_to(format!(
            "{} frames of {}x{}",
            meta.n_frames, meta.width, meta.height
        ))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("FOVs"),
        s.value.apply_to(format!("{}..{} of {}", fovs.start, fovs.end, meta.n_fovs))
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Channels"),
        s.value.apply_to(format!(
            "phase {}, fluorescence {:?}",
            roles.phase_contrast, roles.fluorescence
        ))
    );
    println!();

    println!("  {}", s.header.apply_to("Segmentation"));
    row(&s, "Window", config.segmentation.mask_size);
    println!();

    println!("  {}", s.header.apply_to("Background"));
    row(
        &s,
        "Tiles",
        format!("{} x {}", config.background.div_vert, config.background.div_horiz),
    );
    println!();

    println!("  {}", s.header.apply_to("Tracking"));
    row(&s, "Ignore", config.tracking.ignore_size);
    row(&s, "Min size", config.tracking.min_size);
    match config.tracking.max_size {
        Some(max) => row(&s, "Max size", max),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Max size"),
            s.disabled.apply_to("unlimited")
        ),
    }
    println!();

    println!("  {}", s.header.apply_to("Traces"));
    row(&s, "Min length", config.traces.min_trace_length);
    row(
        &s,
        "Short",
        if config.traces.drop_short { "drop" } else { "keep" },
    );
    println!();

    println!("  {}", s.header.apply_to("Execution"));
    row(&s, "Workers", config.execution.worker_count());
    row(&s, "Batch", config.execution.batch_size);
    if !config.execution.keep_intermediates {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Stacks"),
            s.disabled.apply_to("discarded after traces")
        );
    }
    println!();
}

fn row(s: &Styles, label: &str, value: impl std::fmt::Display) {
    println!("    {:<12}{}", s.label.apply_to(label), s.value.apply_to(value));
}

/// One styled line per finished FOV.
pub fn outcome_line(outcome: &FovOutcome) -> String {
    let s = Styles::new();
    let state = match outcome.state {
        FovState::Done => s.ok.apply_to(outcome.state.to_string()),
        FovState::Failed => s.failed.apply_to(outcome.state.to_string()),
        _ => s.disabled.apply_to(outcome.state.to_string()),
    };
    match (&outcome.state, &outcome.message) {
        (FovState::Done, _) => format!("  FOV {:>3}  {}  {} cells", outcome.fov, state, outcome.n_cells),
        (_, Some(message)) => format!("  FOV {:>3}  {}  {}", outcome.fov, state, message),
        _ => format!("  FOV {:>3}  {}", outcome.fov, state),
    }
}

pub fn print_report(report: &BatchReport, output: &Path) {
    let s = Styles::new();
    println!();
    println!(
        "  {}  {}  {}",
        s.ok.apply_to(format!("{} done", report.succeeded)),
        s.failed.apply_to(format!("{} failed", report.failed)),
        s.disabled.apply_to(format!("{} cancelled", report.cancelled)),
    );
    let cells: usize = report.outcomes.iter().map(|o| o.n_cells).sum();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Cells"),
        s.value.apply_to(cells)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Traces in"),
        s.path.apply_to(output.display())
    );
}
