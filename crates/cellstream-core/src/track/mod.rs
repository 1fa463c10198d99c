pub mod components;
pub mod config;
pub mod tracker;

pub use components::{label_components, Components};
pub use config::TrackingConfig;
pub use tracker::{track_into, track_stack, Tracker};
