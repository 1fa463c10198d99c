pub mod config;
pub mod corrector;
pub mod estimator;
pub mod spline;
pub mod tiles;

pub use config::BackgroundConfig;
pub use corrector::{correct_into, correct_stack, gain_map};
pub use estimator::{BackgroundEstimate, BackgroundEstimator};
pub use tiles::{make_tiles, Tile, TileGrid};
