use serde::{Deserialize, Serialize};

use crate::error::{CellstreamError, Result};

/// Pixel type usable as a cell/background mask.
///
/// Masks live in memory as `bool` and on disk as `u8` (npy `|b1`), so the
/// stages accept either.
pub trait MaskPixel: Copy + Send + Sync {
    fn is_cell(self) -> bool;
}

impl MaskPixel for bool {
    #[inline]
    fn is_cell(self) -> bool {
        self
    }
}

impl MaskPixel for u8 {
    #[inline]
    fn is_cell(self) -> bool {
        self != 0
    }
}

/// Dimensions shared by every stack of one FOV.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackShape {
    pub frames: usize,
    pub height: usize,
    pub width: usize,
}

impl StackShape {
    pub fn new(frames: usize, height: usize, width: usize) -> Self {
        Self {
            frames,
            height,
            width,
        }
    }

    pub fn from_dim(dim: (usize, usize, usize)) -> Self {
        Self::new(dim.0, dim.1, dim.2)
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        (self.frames, self.height, self.width)
    }

    pub fn frame_pixels(&self) -> usize {
        self.height * self.width
    }

    pub fn len(&self) -> usize {
        self.frames * self.frame_pixels()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail with `ShapeMismatch` unless `other` has the same dimensions.
    pub fn ensure_matches(&self, other: (usize, usize, usize)) -> Result<()> {
        if self.dim() != other {
            return Err(CellstreamError::ShapeMismatch {
                expected: self.dim(),
                found: other,
            });
        }
        Ok(())
    }
}

/// Which source channels carry which imaging modality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoles {
    /// Phase-contrast channel used for segmentation.
    pub phase_contrast: usize,
    /// Fluorescence channels to correct and measure.
    pub fluorescence: Vec<usize>,
}

impl ChannelRoles {
    pub fn new(phase_contrast: usize, fluorescence: Vec<usize>) -> Self {
        Self {
            phase_contrast,
            fluorescence,
        }
    }

    /// Check the assignment against the number of channels in the source.
    pub fn validate(&self, n_channels: usize) -> Result<()> {
        for &channel in std::iter::once(&self.phase_contrast).chain(&self.fluorescence) {
            if channel >= n_channels {
                return Err(CellstreamError::ChannelOutOfRange {
                    index: channel,
                    total: n_channels,
                });
            }
        }
        if self.fluorescence.is_empty() {
            return Err(CellstreamError::InvalidParameter(
                "at least one fluorescence channel is required".into(),
            ));
        }
        Ok(())
    }
}

/// Metadata describing the source container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackMetadata {
    pub n_fovs: usize,
    pub n_channels: usize,
    pub n_frames: usize,
    pub height: usize,
    pub width: usize,
}

impl StackMetadata {
    pub fn shape(&self) -> StackShape {
        StackShape::new(self.n_frames, self.height, self.width)
    }
}
