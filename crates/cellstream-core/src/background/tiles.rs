use crate::error::{CellstreamError, Result};

/// One tile along a single axis: pixel range `start..end` with its centre.
#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub center: f64,
    pub start: usize,
    pub end: usize,
}

/// Split an axis of length `n` into `2 * div - 3` overlapping tiles.
///
/// Borders are `round(linspace(0, n, 2 * div - 1))`; tile `i` spans from
/// border `i` to border `i + 2` and is centred on the midpoint of that
/// span, so neighbouring tiles overlap by half.
pub fn make_tiles(n: usize, div: usize) -> Result<Vec<Tile>> {
    if div < 2 {
        return Err(CellstreamError::InvalidParameter(format!(
            "tile divisions must be >= 2, got {div}"
        )));
    }
    let n_borders = 2 * div - 1;
    if n < n_borders - 1 {
        return Err(CellstreamError::InvalidParameter(format!(
            "axis of length {n} is too short for {div} tile divisions"
        )));
    }

    let step = n as f64 / (n_borders - 1) as f64;
    let borders: Vec<usize> = (0..n_borders)
        .map(|i| (i as f64 * step).round_ties_even() as usize)
        .collect();

    Ok(borders
        .windows(3)
        .map(|b| Tile {
            center: (b[0] + b[2]) as f64 / 2.0,
            start: b[0],
            end: b[2],
        })
        .collect())
}

/// Tiles of a frame: `rows` along the vertical axis, `cols` along the
/// horizontal one. Generated once per frame size and shared by all frames.
#[derive(Clone, Debug)]
pub struct TileGrid {
    pub rows: Vec<Tile>,
    pub cols: Vec<Tile>,
}

impl TileGrid {
    pub fn new(height: usize, width: usize, div_vert: usize, div_horiz: usize) -> Result<Self> {
        Ok(Self {
            rows: make_tiles(height, div_vert)?,
            cols: make_tiles(width, div_horiz)?,
        })
    }

    pub fn row_centers(&self) -> Vec<f64> {
        self.rows.iter().map(|t| t.center).collect()
    }

    pub fn col_centers(&self) -> Vec<f64> {
        self.cols.iter().map(|t| t.center).collect()
    }
}
