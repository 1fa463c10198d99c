#![allow(dead_code)]

use std::ops::Range;
use std::path::Path;

use cellstream_core::error::{CellstreamError, Result};
use cellstream_core::frame::StackMetadata;
use cellstream_core::io::npy::write_stack;
use cellstream_core::io::source::{stack_path, ChannelSource};
use ndarray::{s, Array2, Array3, Axis};

pub const BACKGROUND: u16 = 50;
pub const FOREGROUND: u16 = 200;

/// Phase-contrast background level; cells sit `PHASE_CELL_OFFSET` above it.
pub const PHASE_BACKGROUND: u16 = 1000;
pub const PHASE_CELL_OFFSET: u16 = 100;

/// Deterministic per-pixel hash used as texture.
pub fn texture(row: usize, col: usize) -> u32 {
    let mut x = (row as u32).wrapping_mul(0x9E37_79B1) ^ (col as u32).wrapping_mul(0x85EB_CA77);
    x ^= x >> 15;
    x = x.wrapping_mul(0x2C1B_3C6D);
    x ^= x >> 12;
    x = x.wrapping_mul(0x297A_2D39);
    x ^= x >> 15;
    x
}

/// Fluorescence frame: constant `BACKGROUND` with flat bright rectangles.
pub fn frame_with_squares(h: usize, w: usize, squares: &[(Range<usize>, Range<usize>)]) -> Array2<u16> {
    let mut frame = Array2::from_elem((h, w), BACKGROUND);
    for (rows, cols) in squares {
        frame
            .slice_mut(s![rows.clone(), cols.clone()])
            .fill(FOREGROUND);
    }
    frame
}

/// Phase-contrast frame: faint noise (0..=4) on the background, strong
/// texture (0..=160) on a brighter level inside the rectangles.
pub fn phase_with_squares(h: usize, w: usize, squares: &[(Range<usize>, Range<usize>)]) -> Array2<u16> {
    let inside = |r: usize, c: usize| {
        squares
            .iter()
            .any(|(rows, cols)| rows.contains(&r) && cols.contains(&c))
    };
    Array2::from_shape_fn((h, w), |(r, c)| {
        let t = texture(r, c);
        if inside(r, c) {
            PHASE_BACKGROUND + PHASE_CELL_OFFSET + (t % 161) as u16
        } else {
            PHASE_BACKGROUND + (t % 5) as u16
        }
    })
}

pub const STATIC_SQUARE: (Range<usize>, Range<usize>) = (12..52, 12..52);
pub const SQUARE_A: (Range<usize>, Range<usize>) = (12..52, 10..50);
pub const SQUARE_B: (Range<usize>, Range<usize>) = (12..52, 80..120);

/// 3-frame 96x96 phase stack with one static 40x40 cell at rows/cols 12..52.
pub fn static_square_stack() -> Array3<u16> {
    let frame = phase_with_squares(96, 96, &[STATIC_SQUARE]);
    stack_of(&[frame.clone(), frame.clone(), frame])
}

/// Fluorescence counterpart of `static_square_stack`.
pub fn static_square_fluor() -> Array3<u16> {
    let frame = frame_with_squares(96, 96, &[STATIC_SQUARE]);
    stack_of(&[frame.clone(), frame.clone(), frame])
}

/// 3-frame 96x160 phase stack: cell A (cols 10..50) in frames 0-1, cell B
/// (cols 80..120) in frames 1-2. The cells are 30 px apart.
pub fn two_square_stack() -> Array3<u16> {
    stack_of(&[
        phase_with_squares(96, 160, &[SQUARE_A]),
        phase_with_squares(96, 160, &[SQUARE_A, SQUARE_B]),
        phase_with_squares(96, 160, &[SQUARE_B]),
    ])
}

/// Fluorescence counterpart of `two_square_stack`.
pub fn two_square_fluor() -> Array3<u16> {
    stack_of(&[
        frame_with_squares(96, 160, &[SQUARE_A]),
        frame_with_squares(96, 160, &[SQUARE_A, SQUARE_B]),
        frame_with_squares(96, 160, &[SQUARE_B]),
    ])
}

pub fn stack_of(frames: &[Array2<u16>]) -> Array3<u16> {
    let (h, w) = frames[0].dim();
    let mut stack = Array3::zeros((frames.len(), h, w));
    for (mut dst, src) in stack.axis_iter_mut(Axis(0)).zip(frames) {
        dst.assign(src);
    }
    stack
}

/// In-memory source: `stacks[fov][channel]`. FOVs listed in `failing`
/// return an error for every frame read.
pub struct MemorySource {
    pub metadata: StackMetadata,
    pub stacks: Vec<Vec<Array3<u16>>>,
    pub failing: Vec<usize>,
}

impl MemorySource {
    /// Every FOV gets the same stack on every channel.
    pub fn uniform(n_fovs: usize, n_channels: usize, stack: &Array3<u16>) -> Self {
        let (n_frames, height, width) = stack.dim();
        Self {
            metadata: StackMetadata {
                n_fovs,
                n_channels,
                n_frames,
                height,
                width,
            },
            stacks: vec![vec![stack.clone(); n_channels]; n_fovs],
            failing: Vec::new(),
        }
    }

    /// Every FOV gets `channels[c]` on channel `c`.
    pub fn with_channels(n_fovs: usize, channels: &[Array3<u16>]) -> Self {
        let (n_frames, height, width) = channels[0].dim();
        Self {
            metadata: StackMetadata {
                n_fovs,
                n_channels: channels.len(),
                n_frames,
                height,
                width,
            },
            stacks: vec![channels.to_vec(); n_fovs],
            failing: Vec::new(),
        }
    }
}

impl ChannelSource for MemorySource {
    fn metadata(&self) -> &StackMetadata {
        &self.metadata
    }

    fn read_frame(&self, fov: usize, channel: usize, frame: usize) -> Result<Array2<u16>> {
        self.check_index(fov, channel, frame)?;
        if self.failing.contains(&fov) {
            return Err(CellstreamError::Pipeline(format!("unreadable FOV {fov}")));
        }
        Ok(self.stacks[fov][channel].index_axis(Axis(0), frame).to_owned())
    }
}

/// Write `stack` as `fov_{fov:03}_ch{channel}.npy` under `dir`.
pub fn write_source_stack(dir: &Path, fov: usize, channel: usize, stack: &Array3<u16>) {
    write_stack(&stack_path(dir, fov, channel), stack.view()).unwrap();
}
