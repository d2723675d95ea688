//! Parameters of one PathOptimizer instance
//!
//! Every field has a default so a parameter file only needs to list the
//! values it overrides.

use serde::Deserialize;
use std::f64::consts::PI;
use std::fs::read_to_string;
use std::path::Path;

use crate::common::error::{OptimizerError, OptimizerResult};

/// Steering system of the vehicle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CarType {
    AckermannSteering,
    SkidSteering,
}

/// How the end of the optimized path is constrained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TerminalMode {
    /// End state is left free
    Free,
    /// Final heading error is pinned to the goal heading
    Heading,
    /// Final heading error and lateral offset are pinned within tolerances
    HeadingAndOffset,
}

/// Settings passed to the OSQP solver
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    pub max_iter: usize,
    /// Absolute convergence tolerance
    pub eps_abs: f64,
    /// Relative convergence tolerance
    pub eps_rel: f64,
    /// Primal infeasibility tolerance
    pub eps_prim_inf: f64,
    /// Initial ADMM penalty (OSQP `rho`)
    pub rho: f64,
    /// Regularization of the x-update
    pub sigma: f64,
    /// Over-relaxation parameter, in (0, 2)
    pub alpha: f64,
    /// Iterations between step-size updates, 0 disables adaptation
    pub adaptive_rho_interval: usize,
    /// Refine the solution on the detected active set
    pub polish: bool,
    /// Seed the solver with the previous solution when the horizon is unchanged
    pub warm_start: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: 8000,
            eps_abs: 1e-4,
            eps_rel: 1e-4,
            eps_prim_inf: 1e-4,
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            adaptive_rho_interval: 50,
            polish: true,
            warm_start: false,
        }
    }
}

/// Static configuration shared read-only by all components of one optimizer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    // ---- VEHICLE ----
    pub car_type: CarType,
    /// Wheel base [m]
    pub wheel_base: f64,
    /// Distance from the rear axle center to the vehicle center [m]
    pub rear_axle_to_center: f64,
    /// Radius of the covering circles [m]
    pub circle_radius: f64,
    /// Distances from the vehicle center to the covering circles, rear to front [m]
    pub d1: f64,
    pub d2: f64,
    pub d3: f64,
    pub d4: f64,
    /// Maximum front-wheel steering angle [rad]
    pub max_steer_angle: f64,

    // ---- WEIGHTS ----
    pub opt_curvature_w: f64,
    pub opt_curvature_rate_w: f64,
    pub opt_deviation_w: f64,

    // ---- OUTPUT ----
    /// Emit the optimized samples directly instead of densifying them
    pub raw_output: bool,
    /// Output spacing [m]
    pub output_spacing: f64,
    pub enable_collision_check: bool,
    /// Search for the goal on a finer grid
    pub enable_exact_position: bool,
    pub enable_computation_time_output: bool,
    /// Shortest collision-truncated path still reported as usable [m]
    pub min_usable_length: f64,

    // ---- SEGMENTATION ----
    /// Sample spacing near the start when the initial heading error is large [m]
    pub delta_s_smaller: f64,
    /// Sample spacing used when the result is densified afterwards [m]
    pub delta_s_default: f64,
    /// Length of the finely sampled section at the start [m]
    pub fine_section_length: f64,
    /// Largest initial heading error the linearization accepts [rad]
    pub max_initial_heading_error: f64,
    /// Below this initial heading error the fine section is skipped [rad]
    pub small_heading_error: f64,
    /// Goal-to-curve-end distance that triggers the goal search [m]
    pub goal_tolerance: f64,

    // ---- BOUNDS ----
    /// Farthest lateral distance searched for obstacles [m]
    pub bound_search_range: f64,
    pub bound_search_resolution: f64,

    // ---- TERMINAL ----
    pub terminal_mode: TerminalMode,
    /// [rad]
    pub end_heading_tolerance: f64,
    /// [m]
    pub end_offset_tolerance: f64,

    // ---- SMOOTHER ----
    pub smoother_sample_spacing: f64,
    pub smoother_passes: usize,

    pub solver: SolverSettings,
}

impl Default for Config {
    fn default() -> Self {
        // 4.9 m x 2.0 m car covered by four circles.
        let length = 4.9;
        let width = 2.0;
        Self {
            car_type: CarType::AckermannSteering,
            wheel_base: 2.85,
            rear_axle_to_center: 1.45,
            circle_radius: ((length / 8.0_f64).powi(2) + (width / 2.0_f64).powi(2)).sqrt(),
            d1: -3.0 / 8.0 * length,
            d2: -1.0 / 8.0 * length,
            d3: 1.0 / 8.0 * length,
            d4: 3.0 / 8.0 * length,
            max_steer_angle: 35.0 * PI / 180.0,
            opt_curvature_w: 10.0,
            opt_curvature_rate_w: 200.0,
            opt_deviation_w: 0.0,
            raw_output: false,
            output_spacing: 0.3,
            enable_collision_check: true,
            enable_exact_position: false,
            enable_computation_time_output: false,
            min_usable_length: 20.0,
            delta_s_smaller: 0.3,
            delta_s_default: 1.0,
            fine_section_length: 3.0,
            max_initial_heading_error: 75.0 * PI / 180.0,
            small_heading_error: 20.0 * PI / 180.0,
            goal_tolerance: 0.001,
            bound_search_range: 10.0,
            bound_search_resolution: 0.05,
            terminal_mode: TerminalMode::Free,
            end_heading_tolerance: 0.0,
            end_offset_tolerance: 0.0,
            smoother_sample_spacing: 0.5,
            smoother_passes: 0,
            solver: SolverSettings::default(),
        }
    }
}

impl Config {
    /// Parse a TOML parameter string
    pub fn from_toml_str(params: &str) -> OptimizerResult<Self> {
        let config: Config = toml::from_str(params)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML parameter file
    pub fn load<P: AsRef<Path>>(path: P) -> OptimizerResult<Self> {
        let params = read_to_string(path)?;
        Self::from_toml_str(&params)
    }

    pub fn validate(&self) -> OptimizerResult<()> {
        let positive = [
            ("wheel_base", self.wheel_base),
            ("circle_radius", self.circle_radius),
            ("max_steer_angle", self.max_steer_angle),
            ("output_spacing", self.output_spacing),
            ("delta_s_smaller", self.delta_s_smaller),
            ("delta_s_default", self.delta_s_default),
            ("max_initial_heading_error", self.max_initial_heading_error),
            ("bound_search_range", self.bound_search_range),
            ("bound_search_resolution", self.bound_search_resolution),
            ("smoother_sample_spacing", self.smoother_sample_spacing),
        ];
        for (name, value) in positive.iter() {
            if !(*value > 0.0) {
                return Err(OptimizerError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        let non_negative = [
            ("opt_curvature_w", self.opt_curvature_w),
            ("opt_curvature_rate_w", self.opt_curvature_rate_w),
            ("opt_deviation_w", self.opt_deviation_w),
            ("min_usable_length", self.min_usable_length),
            ("fine_section_length", self.fine_section_length),
            ("goal_tolerance", self.goal_tolerance),
            ("end_heading_tolerance", self.end_heading_tolerance),
            ("end_offset_tolerance", self.end_offset_tolerance),
        ];
        for (name, value) in non_negative.iter() {
            if !(*value >= 0.0) {
                return Err(OptimizerError::InvalidParameter(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }
        if self.max_steer_angle >= PI / 2.0 {
            return Err(OptimizerError::InvalidParameter(
                "max_steer_angle must be below 90 deg".to_string(),
            ));
        }
        let solver = &self.solver;
        if solver.max_iter == 0 || !(solver.rho > 0.0) || !(solver.sigma > 0.0) {
            return Err(OptimizerError::InvalidParameter(
                "solver max_iter, rho and sigma must be positive".to_string(),
            ));
        }
        if !(solver.alpha > 0.0 && solver.alpha < 2.0) {
            return Err(OptimizerError::InvalidParameter(format!(
                "solver alpha must be in (0, 2), got {}",
                solver.alpha
            )));
        }
        Ok(())
    }

    /// Longitudinal offsets of the covering circles from the rear axle [m]
    pub fn circle_offsets(&self) -> [f64; 4] {
        let c = self.rear_axle_to_center;
        [c + self.d1, c + self.d2, c + self.d3, c + self.d4]
    }

    /// Largest path curvature the steering allows [1/m]
    pub fn max_curvature(&self) -> f64 {
        match self.car_type {
            CarType::AckermannSteering => self.max_steer_angle.tan() / self.wheel_base,
            CarType::SkidSteering => f64::INFINITY,
        }
    }

    /// Sample spacing used after the finely sampled start section [m]
    pub fn delta_s_larger(&self) -> f64 {
        if self.raw_output {
            self.output_spacing
        } else {
            self.delta_s_default
        }
    }
}
