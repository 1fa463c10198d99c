use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellstreamError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid npy file: {0}")]
    InvalidNpy(String),

    #[error("Dtype mismatch: expected {expected}, found {found}")]
    DtypeMismatch { expected: String, found: String },

    #[error("Stack shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    #[error("Missing input file: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("FOV index {index} out of range (total: {total})")]
    FovIndexOutOfRange { index: usize, total: usize },

    #[error("Channel index {index} out of range (total: {total})")]
    ChannelOutOfRange { index: usize, total: usize },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Processing was interrupted through a cancellation token.
    #[error("Cancelled")]
    Cancelled,

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl CellstreamError {
    /// True for the cooperative-cancellation result, which callers must not
    /// treat as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CellstreamError>;
