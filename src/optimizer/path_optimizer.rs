//! Path optimizer
//!
//! Smooths a coarse reference, segments it, solves the QP over the lateral
//! and heading errors and turns the result into a collision-checked path.
//!
//! ```text
//! points -> smoother -> segmenter -> formulator -> solver -> output
//! ```

use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::collision::CollisionChecker;
use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::{CollisionCheck, ObstacleMap, ReferenceSmoother};
use crate::common::types::{State, VehicleState};
use crate::config::Config;
use crate::optimizer::formulation::{QpFormulator, TerminalConstraint};
use crate::optimizer::output::{build_output, OptimizedPath};
use crate::optimizer::segmenter::segment_smooth_path;
use crate::optimizer::solver::QpSolver;
use crate::reference_path::{ReferencePath, SplineSmoother};

pub struct PathOptimizer {
    config: Config,
    vehicle_state: VehicleState,
    map: Box<dyn ObstacleMap>,
    collision_checker: Box<dyn CollisionCheck>,
    smoother: Box<dyn ReferenceSmoother>,
    reference_path: ReferencePath,
    smoothed_path: Vec<State>,
    formulator: QpFormulator,
    solver: QpSolver,
}

impl PathOptimizer {
    pub fn new(
        start: State,
        end: State,
        map: Box<dyn ObstacleMap>,
        config: Config,
    ) -> OptimizerResult<Self> {
        config.validate()?;
        Ok(Self {
            vehicle_state: VehicleState::new(start, end),
            map,
            collision_checker: Box::new(CollisionChecker::new(&config)),
            smoother: Box::new(SplineSmoother::new(&config)),
            reference_path: ReferencePath::new(),
            smoothed_path: Vec::new(),
            formulator: QpFormulator::new(&config),
            solver: QpSolver::new(config.solver.clone()),
            config,
        })
    }

    pub fn with_collision_checker(mut self, checker: Box<dyn CollisionCheck>) -> Self {
        self.collision_checker = checker;
        self
    }

    pub fn with_smoother(mut self, smoother: Box<dyn ReferenceSmoother>) -> Self {
        self.smoother = smoother;
        self
    }

    /// Optimize a path along `points`. Writes the result into `final_path`
    /// and returns true on success.
    ///
    /// When a collision cuts the path short of `min_usable_length`, the
    /// truncated path is still written but false is returned. On every other
    /// failure `final_path` is left untouched.
    pub fn solve(&mut self, points: &[State], final_path: &mut Vec<State>) -> bool {
        Self::write_result(self.try_solve(points), final_path)
    }

    /// [`solve`](Self::solve) on a reference that is already smooth and
    /// aligned with the vehicle.
    pub fn solve_without_smoothing(
        &mut self,
        points: &[State],
        final_path: &mut Vec<State>,
    ) -> bool {
        Self::write_result(self.try_solve_without_smoothing(points), final_path)
    }

    fn write_result(result: OptimizerResult<OptimizedPath>, final_path: &mut Vec<State>) -> bool {
        match result {
            Ok(path) => {
                *final_path = path.states;
                true
            }
            Err(OptimizerError::PathTooShort { path, .. }) => {
                *final_path = path;
                false
            }
            Err(_) => false,
        }
    }

    pub fn try_solve(&mut self, points: &[State]) -> OptimizerResult<OptimizedPath> {
        let t1 = Instant::now();
        if points.is_empty() {
            warn!("Empty input, quit path optimization");
            return Err(OptimizerError::EmptyInput);
        }
        self.reference_path.clear();

        let smoothed = self.smoother.smooth(
            points,
            &self.vehicle_state.start,
            self.map.as_ref(),
            &mut self.reference_path,
        );
        self.smoothed_path = match smoothed {
            Ok(path) => path,
            Err(e) => {
                warn!("Reference smoothing failed: {}", e);
                self.smoothed_path.clear();
                return Err(e);
            }
        };

        let t2 = Instant::now();
        if let Err(e) = segment_smooth_path(
            &mut self.reference_path,
            &mut self.vehicle_state,
            self.map.as_ref(),
            &self.config,
        ) {
            warn!("Reference segmentation failed: {}", e);
            return Err(e);
        }
        info!("Reference path segmentation succeeded, size {}", self.reference_path.size());

        let t3 = Instant::now();
        let terminal = TerminalConstraint::from_config(
            &self.config,
            &self.reference_path,
            &self.vehicle_state,
        );
        let result = self.optimize(&terminal);
        let t4 = Instant::now();
        match &result {
            Ok(_) => {
                if self.config.enable_computation_time_output {
                    log_phase("Reference smoothing", t2 - t1);
                    log_phase("Reference segmentation", t3 - t2);
                    log_phase("Optimization phase", t4 - t3);
                    log_phase("All", t4 - t1);
                }
                info!(
                    "Path optimization succeeded in {:.3} s",
                    (t4 - t1).as_secs_f64()
                );
            }
            Err(e) => warn!("Path optimization failed: {}", e),
        }
        result
    }

    pub fn try_solve_without_smoothing(
        &mut self,
        points: &[State],
    ) -> OptimizerResult<OptimizedPath> {
        let t1 = Instant::now();
        if points.is_empty() {
            warn!("Empty input, quit path optimization");
            return Err(OptimizerError::EmptyInput);
        }
        self.vehicle_state.set_initial_error(0.0, 0.0);
        self.reference_path.clear();
        if let Err(e) = self.reference_path.set_reference(points) {
            warn!("Reference could not be set: {}", e);
            return Err(e);
        }
        self.reference_path.update_bounds(self.map.as_ref(), &self.config);
        self.reference_path.update_limits();

        let result = self.optimize(&TerminalConstraint::None);
        let t2 = Instant::now();
        match &result {
            Ok(_) => {
                if self.config.enable_computation_time_output {
                    log_phase("Solve without smoothing", t2 - t1);
                }
                info!(
                    "Path optimization without smoothing succeeded in {:.3} s",
                    (t2 - t1).as_secs_f64()
                );
            }
            Err(e) => warn!("Path optimization without smoothing failed: {}", e),
        }
        result
    }

    fn optimize(&mut self, terminal: &TerminalConstraint) -> OptimizerResult<OptimizedPath> {
        let problem = self
            .formulator
            .formulate(&self.reference_path, &self.vehicle_state, terminal)?;
        if self.solver.horizon().map_or(false, |h| h != problem.horizon) {
            self.solver.reset();
        }
        let solution = self
            .solver
            .solve(&problem)
            .map_err(OptimizerError::QpFailed)?;
        info!(
            "QP succeeded after {} iterations, objective {:.6}",
            solution.iterations, solution.objective
        );
        build_output(
            &solution.x,
            &self.reference_path,
            self.map.as_ref(),
            self.collision_checker.as_ref(),
            &self.config,
        )
    }

    /// Sampled smoothed reference of the last `solve`
    pub fn smoothed_path(&self) -> &[State] {
        &self.smoothed_path
    }

    /// Reference samples whose corridor was empty in the last solve
    pub fn abnormal_bounds(&self) -> &[(State, f64, f64)] {
        self.reference_path.abnormal_bounds()
    }

    pub fn search_diagnostics(&self) -> &[Vec<f64>] {
        self.smoother.search_diagnostics()
    }

    pub fn reference_path(&self) -> &ReferencePath {
        &self.reference_path
    }

    pub fn vehicle_state(&self) -> &VehicleState {
        &self.vehicle_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

fn log_phase(name: &str, elapsed: Duration) {
    debug!("{} cost {:.3} ms", name, elapsed.as_secs_f64() * 1e3);
}
