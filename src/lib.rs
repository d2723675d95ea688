//! path_optimizer - QP-based path optimization for wheeled vehicles
//!
//! This crate refines a coarse reference path into a smooth, kinematically
//! feasible and collision-free path, given the vehicle's start and end
//! states and an obstacle map.

// Core modules
pub mod common;
pub mod config;
pub mod utils;

// Algorithm modules
pub mod collision;
pub mod optimizer;
pub mod reference_path;

// Re-export common types for convenience
pub use common::{normalize_angle, State, VehicleState};
pub use common::{CollisionCheck, ObstacleMap, ReferenceSmoother};
pub use common::{OptimizerError, OptimizerResult};
pub use config::{CarType, Config, SolverSettings, TerminalMode};
pub use optimizer::{OptimizedPath, PathOptimizer};
