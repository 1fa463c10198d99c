use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayViewMut3, Axis};
use tracing::debug;

use crate::error::{CellstreamError, Result};
use crate::frame::{StackMetadata, StackShape};
use crate::io::npy::{read_header, NpyStack};

/// Boundary to the microscope container loader.
///
/// Implementors decode one raw frame of one channel of one FOV; everything
/// container-specific stays behind this trait.
pub trait ChannelSource: Send + Sync {
    fn metadata(&self) -> &StackMetadata;

    fn read_frame(&self, fov: usize, channel: usize, frame: usize) -> Result<Array2<u16>>;

    /// Copy a whole channel of one FOV into `out`, frame by frame.
    fn copy_channel(
        &self,
        fov: usize,
        channel: usize,
        mut out: ArrayViewMut3<'_, u16>,
    ) -> Result<()> {
        let shape = self.metadata().shape();
        shape.ensure_matches(out.dim())?;
        for (t, mut dst) in out.axis_iter_mut(Axis(0)).enumerate() {
            let frame = self.read_frame(fov, channel, t)?;
            if frame.dim() != (shape.height, shape.width) {
                return Err(CellstreamError::ShapeMismatch {
                    expected: (1, shape.height, shape.width),
                    found: (1, frame.nrows(), frame.ncols()),
                });
            }
            dst.assign(&frame);
        }
        Ok(())
    }

    /// Bounds-check a request against `metadata()`.
    fn check_index(&self, fov: usize, channel: usize, frame: usize) -> Result<()> {
        let meta = self.metadata();
        if fov >= meta.n_fovs {
            return Err(CellstreamError::FovIndexOutOfRange {
                index: fov,
                total: meta.n_fovs,
            });
        }
        if channel >= meta.n_channels {
            return Err(CellstreamError::ChannelOutOfRange {
                index: channel,
                total: meta.n_channels,
            });
        }
        if frame >= meta.n_frames {
            return Err(CellstreamError::InvalidParameter(format!(
                "frame {frame} out of range (total: {})",
                meta.n_frames
            )));
        }
        Ok(())
    }
}

/// Source backed by one `uint16` npy stack per FOV and channel, named
/// `fov_{fov:03}_ch{channel}.npy`.
pub struct NpyDirSource {
    dir: PathBuf,
    metadata: StackMetadata,
}

impl NpyDirSource {
    /// Scan `dir` for stack files and derive the metadata from their headers.
    ///
    /// FOVs must be numbered contiguously from 0 and every FOV must have the
    /// same channels and stack shape.
    pub fn open(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CellstreamError::MissingInput(dir.to_path_buf()));
        }

        let mut n_fovs = 0;
        while stack_path(dir, n_fovs, 0).exists() {
            n_fovs += 1;
        }
        if n_fovs == 0 {
            return Err(CellstreamError::MissingInput(stack_path(dir, 0, 0)));
        }

        let mut n_channels = 0;
        while stack_path(dir, 0, n_channels).exists() {
            n_channels += 1;
        }

        let shape = read_header(&stack_path(dir, 0, 0))?.stack_shape()?;
        for fov in 0..n_fovs {
            for channel in 0..n_channels {
                let path = stack_path(dir, fov, channel);
                let found = read_header(&path)?.stack_shape()?;
                shape.ensure_matches(found.dim())?;
            }
        }

        debug!(dir = %dir.display(), n_fovs, n_channels, "Opened npy source");
        Ok(Self {
            dir: dir.to_path_buf(),
            metadata: StackMetadata {
                n_fovs,
                n_channels,
                n_frames: shape.frames,
                height: shape.height,
                width: shape.width,
            },
        })
    }

    pub fn shape(&self) -> StackShape {
        self.metadata.shape()
    }
}

impl ChannelSource for NpyDirSource {
    fn metadata(&self) -> &StackMetadata {
        &self.metadata
    }

    fn read_frame(&self, fov: usize, channel: usize, frame: usize) -> Result<Array2<u16>> {
        self.check_index(fov, channel, frame)?;
        let stack = NpyStack::<u16>::open(&stack_path(&self.dir, fov, channel))?;
        Ok(stack.frame(frame)?.to_owned())
    }

    fn copy_channel(
        &self,
        fov: usize,
        channel: usize,
        mut out: ArrayViewMut3<'_, u16>,
    ) -> Result<()> {
        self.check_index(fov, channel, 0)?;
        let stack = NpyStack::<u16>::open(&stack_path(&self.dir, fov, channel))?;
        stack.shape().ensure_matches(out.dim())?;
        out.assign(&stack.view()?);
        Ok(())
    }
}

/// File name convention used by [`NpyDirSource`].
pub fn stack_path(dir: &Path, fov: usize, channel: usize) -> PathBuf {
    dir.join(format!("fov_{fov:03}_ch{channel}.npy"))
}
