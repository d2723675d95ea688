//! Utility modules for path_optimizer

pub mod grid_map;
pub mod logger;
pub mod spline;
pub mod visualization;

pub use grid_map::GridMap;
pub use spline::Spline;
pub use visualization::{colors, PathStyle, Visualizer};
