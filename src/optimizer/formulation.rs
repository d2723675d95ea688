//! QP formulation of the path optimization problem
//!
//! Decision vector: `[e_0, psi_0, ..., e_{N-1}, psi_{N-1}, kappa_0, ..., kappa_{N-2}]`
//! where `e` is the lateral error, `psi` the heading error relative to the
//! reference tangent and `kappa` the path curvature over each segment.
//!
//! Linearized error dynamics over segment `i` of length `ds`:
//!
//! ```text
//! e_{i+1}   = e_i + ds * psi_i
//! psi_{i+1} = -k_i^2 ds * e_i + psi_i + ds * kappa_i - k_i ds
//! ```

use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CscMatrix};

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::types::{global_to_local, normalize_angle, VehicleState};
use crate::config::{Config, TerminalMode};
use crate::reference_path::ReferencePath;

/// Constraint on the final state of the horizon
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminalConstraint {
    None,
    /// Final heading error equals the target [rad]
    HeadingOnly(f64),
    /// Final heading error and lateral offset lie within the tolerances
    HeadingAndOffset {
        heading: f64,
        offset: f64,
        heading_tolerance: f64,
        offset_tolerance: f64,
    },
}

impl TerminalConstraint {
    /// Terminal constraint reaching `vehicle_state.end` on the segmented reference.
    pub fn from_config(
        config: &Config,
        reference: &ReferencePath,
        vehicle_state: &VehicleState,
    ) -> Self {
        if reference.is_empty() {
            return TerminalConstraint::None;
        }
        let last = reference.sample(reference.size() - 1);
        let end = &vehicle_state.end;
        let heading = normalize_angle(end.heading - last.heading);
        match config.terminal_mode {
            TerminalMode::Free => TerminalConstraint::None,
            TerminalMode::Heading => TerminalConstraint::HeadingOnly(heading),
            TerminalMode::HeadingAndOffset => TerminalConstraint::HeadingAndOffset {
                heading,
                offset: global_to_local(&last, end).y,
                heading_tolerance: config.end_heading_tolerance,
                offset_tolerance: config.end_offset_tolerance,
            },
        }
    }

    fn rows(&self) -> usize {
        match self {
            TerminalConstraint::None => 0,
            TerminalConstraint::HeadingOnly(_) => 1,
            TerminalConstraint::HeadingAndOffset { .. } => 2,
        }
    }
}

/// `min 0.5 x'Px + q'x  s.t.  l <= Ax <= u`, with `P` stored full (symmetric).
#[derive(Debug, Clone)]
pub struct QpProblem {
    pub hessian: CscMatrix<f64>,
    pub gradient: DVector<f64>,
    pub constraints: CscMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
    /// Number of reference samples
    pub horizon: usize,
}

impl QpProblem {
    pub fn num_variables(&self) -> usize {
        self.gradient.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.lower.len()
    }
}

pub fn num_variables(horizon: usize) -> usize {
    3 * horizon - 1
}

/// Index of `e_i`; `psi_i` follows it.
pub fn state_index(i: usize) -> usize {
    2 * i
}

/// Index of `kappa_i`
pub fn control_index(horizon: usize, i: usize) -> usize {
    2 * horizon + i
}

/// Builds QP problems for one vehicle configuration. The cost matrix only
/// depends on the horizon and is reused while the horizon stays the same.
pub struct QpFormulator {
    curvature_w: f64,
    curvature_rate_w: f64,
    deviation_w: f64,
    circle_offsets: [f64; 4],
    circle_radius: f64,
    max_curvature: f64,
    hessian_cache: Option<(usize, CscMatrix<f64>)>,
}

impl QpFormulator {
    pub fn new(config: &Config) -> Self {
        Self {
            curvature_w: config.opt_curvature_w,
            curvature_rate_w: config.opt_curvature_rate_w,
            deviation_w: config.opt_deviation_w,
            circle_offsets: config.circle_offsets(),
            circle_radius: config.circle_radius,
            max_curvature: config.max_curvature(),
            hessian_cache: None,
        }
    }

    pub fn formulate(
        &mut self,
        reference: &ReferencePath,
        vehicle_state: &VehicleState,
        terminal: &TerminalConstraint,
    ) -> OptimizerResult<QpProblem> {
        let horizon = reference.size();
        if horizon < 2 {
            return Err(OptimizerError::InvalidParameter(format!(
                "QP horizon needs at least 2 samples, got {}",
                horizon
            )));
        }
        if reference.bounds().len() != horizon {
            return Err(OptimizerError::InvalidParameter(
                "reference bounds are not up to date".to_string(),
            ));
        }
        let hessian = self.hessian(horizon);
        let (constraints, lower, upper) = self.constraints(reference, vehicle_state, terminal);
        debug!(
            "QP formulated: {} variables, {} constraints, {} hessian entries",
            num_variables(horizon),
            lower.len(),
            hessian.nnz()
        );
        Ok(QpProblem {
            hessian,
            gradient: DVector::zeros(num_variables(horizon)),
            constraints,
            lower,
            upper,
            horizon,
        })
    }

    fn hessian(&mut self, horizon: usize) -> CscMatrix<f64> {
        if let Some((cached, hessian)) = &self.hessian_cache {
            if *cached == horizon {
                return hessian.clone();
            }
        }
        let hessian = self.build_hessian(horizon);
        self.hessian_cache = Some((horizon, hessian.clone()));
        hessian
    }

    fn build_hessian(&self, horizon: usize) -> CscMatrix<f64> {
        let n = num_variables(horizon);
        let mut coo = CooMatrix::new(n, n);
        if self.deviation_w > 0.0 {
            for i in 0..horizon {
                coo.push(state_index(i), state_index(i), self.deviation_w);
            }
        }
        for i in 0..horizon - 1 {
            let k = control_index(horizon, i);
            if self.curvature_w > 0.0 {
                coo.push(k, k, self.curvature_w);
            }
            // (kappa_{i+1} - kappa_i)^2
            if self.curvature_rate_w > 0.0 && i + 1 < horizon - 1 {
                let w = self.curvature_rate_w;
                coo.push(k, k, w);
                coo.push(k + 1, k + 1, w);
                coo.push(k, k + 1, -w);
                coo.push(k + 1, k, -w);
            }
        }
        CscMatrix::from(&coo)
    }

    fn constraints(
        &self,
        reference: &ReferencePath,
        vehicle_state: &VehicleState,
        terminal: &TerminalConstraint,
    ) -> (CscMatrix<f64>, DVector<f64>, DVector<f64>) {
        let horizon = reference.size();
        let segments = horizon - 1;
        let rows = 2 + 2 * segments + 4 * segments + segments + terminal.rows();
        let mut coo = CooMatrix::new(rows, num_variables(horizon));
        let mut lower = DVector::zeros(rows);
        let mut upper = DVector::zeros(rows);
        let s = reference.s();
        let k = reference.curvature();

        // Initial state
        let (offset, heading_error) = vehicle_state.initial_error();
        coo.push(0, state_index(0), 1.0);
        coo.push(1, state_index(0) + 1, 1.0);
        lower[0] = offset;
        upper[0] = offset;
        lower[1] = heading_error;
        upper[1] = heading_error;
        let mut row = 2;

        // Dynamics
        for i in 0..segments {
            let ds = s[i + 1] - s[i];
            let (e, psi) = (state_index(i), state_index(i) + 1);
            let (e_next, psi_next) = (state_index(i + 1), state_index(i + 1) + 1);
            coo.push(row, e_next, 1.0);
            coo.push(row, e, -1.0);
            coo.push(row, psi, -ds);
            row += 1;

            coo.push(row, psi_next, 1.0);
            coo.push(row, e, k[i] * k[i] * ds);
            coo.push(row, psi, -1.0);
            coo.push(row, control_index(horizon, i), -ds);
            lower[row] = -k[i] * ds;
            upper[row] = -k[i] * ds;
            row += 1;
        }

        // Corridor: every covering circle stays inside the free interval.
        // A circle at offset l sits at e + l*psi from the tangent at s_i, and
        // the reference at s_i + l has bent away from that tangent by k l^2 / 2.
        for i in 1..horizon {
            for &l in self.circle_offsets.iter() {
                let (lb, ub) = reference.bound_near(s[i] + l);
                let bend = 0.5 * k[i] * l * l;
                coo.push(row, state_index(i), 1.0);
                coo.push(row, state_index(i) + 1, l);
                lower[row] = lb + self.circle_radius + bend;
                upper[row] = ub - self.circle_radius + bend;
                row += 1;
            }
        }

        // Steering
        for i in 0..segments {
            coo.push(row, control_index(horizon, i), 1.0);
            lower[row] = -self.max_curvature;
            upper[row] = self.max_curvature;
            row += 1;
        }

        let last = state_index(horizon - 1);
        match *terminal {
            TerminalConstraint::None => {}
            TerminalConstraint::HeadingOnly(target) => {
                coo.push(row, last + 1, 1.0);
                lower[row] = target;
                upper[row] = target;
                row += 1;
            }
            TerminalConstraint::HeadingAndOffset {
                heading,
                offset,
                heading_tolerance,
                offset_tolerance,
            } => {
                coo.push(row, last + 1, 1.0);
                lower[row] = heading - heading_tolerance;
                upper[row] = heading + heading_tolerance;
                row += 1;
                coo.push(row, last, 1.0);
                lower[row] = offset - offset_tolerance;
                upper[row] = offset + offset_tolerance;
                row += 1;
            }
        }
        debug_assert_eq!(row, rows);

        (CscMatrix::from(&coo), lower, upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::traits::ObstacleMap;
    use crate::common::types::{global_to_local, State};
    use nalgebra::DMatrix;

    struct OpenMap;

    impl ObstacleMap for OpenMap {
        fn obstacle_distance(&self, _x: f64, _y: f64) -> f64 {
            100.0
        }

        fn is_inside(&self, _x: f64, _y: f64) -> bool {
            true
        }
    }

    fn arc_reference(radius: f64, n: usize) -> ReferencePath {
        let points: Vec<State> = (0..=n)
            .map(|i| {
                let t = i as f64 * 0.05;
                State::new(radius * t.sin(), radius * (1.0 - t.cos()), t)
            })
            .collect();
        let mut reference = ReferencePath::new();
        reference.set_reference(&points).unwrap();
        reference.update_bounds(&OpenMap, &Config::default());
        reference
    }

    #[test]
    fn test_problem_dimensions() {
        let config = Config::default();
        let reference = arc_reference(20.0, 10);
        let vehicle = VehicleState::new(State::default(), State::default());
        let mut formulator = QpFormulator::new(&config);
        let problem = formulator
            .formulate(&reference, &vehicle, &TerminalConstraint::None)
            .unwrap();
        let horizon = 11;
        assert_eq!(problem.horizon, horizon);
        assert_eq!(problem.num_variables(), 32);
        assert_eq!(problem.num_constraints(), 2 + 7 * (horizon - 1));
        assert_eq!(problem.constraints.ncols(), 32);
        assert_eq!(problem.hessian.nrows(), 32);

        let heading = formulator
            .formulate(&reference, &vehicle, &TerminalConstraint::HeadingOnly(0.1))
            .unwrap();
        assert_eq!(heading.num_constraints(), problem.num_constraints() + 1);
    }

    #[test]
    fn test_hessian_structure() {
        let config = Config::default();
        let mut formulator = QpFormulator::new(&config);
        let p = DMatrix::from(&formulator.hessian(4));
        // kappa_0..kappa_2 at columns 8..10
        assert_eq!(p[(8, 8)], 10.0 + 200.0);
        assert_eq!(p[(9, 9)], 10.0 + 400.0);
        assert_eq!(p[(10, 10)], 10.0 + 200.0);
        assert_eq!(p[(8, 9)], -200.0);
        assert_eq!(p[(9, 8)], -200.0);
        assert_eq!(p[(0, 0)], 0.0);
        assert_eq!(p, p.transpose());
    }

    #[test]
    fn test_hessian_cached_per_horizon() {
        let mut formulator = QpFormulator::new(&Config::default());
        formulator.hessian(5);
        assert_eq!(formulator.hessian_cache.as_ref().map(|c| c.0), Some(5));
        formulator.hessian(7);
        assert_eq!(formulator.hessian_cache.as_ref().map(|c| c.0), Some(7));
    }

    #[test]
    fn test_reference_solution_satisfies_dynamics() {
        let config = Config::default();
        let reference = arc_reference(20.0, 20);
        let vehicle = VehicleState::new(State::default(), State::default());
        let mut formulator = QpFormulator::new(&config);
        let problem = formulator
            .formulate(&reference, &vehicle, &TerminalConstraint::None)
            .unwrap();
        // Zero error while following the reference curvature is feasible.
        let horizon = reference.size();
        let mut x = DVector::zeros(problem.num_variables());
        for i in 0..horizon - 1 {
            x[control_index(horizon, i)] = reference.curvature()[i];
        }
        let ax = DMatrix::from(&problem.constraints) * &x;
        for row in 0..2 + 2 * (horizon - 1) {
            assert!((ax[row] - problem.lower[row]).abs() < 1e-9, "row {}", row);
        }
        for row in 0..problem.num_constraints() {
            assert!(ax[row] >= problem.lower[row] - 1e-9 && ax[row] <= problem.upper[row] + 1e-9);
        }
    }

    #[test]
    fn test_corridor_rows_follow_circles_on_arc() {
        let config = Config::default();
        let reference = arc_reference(10.0, 60);
        let vehicle = VehicleState::new(State::default(), State::default());
        let mut formulator = QpFormulator::new(&config);
        let problem = formulator
            .formulate(&reference, &vehicle, &TerminalConstraint::None)
            .unwrap();
        let horizon = reference.size();
        let i = horizon / 2;
        let (e, psi) = (0.3, 0.05);
        let mut x = DVector::zeros(problem.num_variables());
        x[state_index(i)] = e;
        x[state_index(i) + 1] = psi;
        let ax = DMatrix::from(&problem.constraints) * &x;

        let sample = reference.sample(i);
        let normal = sample.normal();
        let corridor_start = 2 + 2 * (horizon - 1);
        for (c, &l) in config.circle_offsets().iter().enumerate() {
            let row = corridor_start + 4 * (i - 1) + c;
            // Offset of the circle center from the reference at s_i + l.
            let heading = sample.heading + psi;
            let center = State::new(
                sample.x + e * normal[0] + l * heading.cos(),
                sample.y + e * normal[1] + l * heading.sin(),
                0.0,
            );
            let actual = global_to_local(&reference.pose_at(sample.s + l), &center).y;
            let (lb, _) = reference.bound_near(sample.s + l);
            let modeled = ax[row] - (problem.lower[row] - lb - config.circle_radius);
            assert!((modeled - actual).abs() < 0.05, "l = {}: {} vs {}", l, modeled, actual);
        }
    }

    #[test]
    fn test_narrow_corridor_gives_crossed_bounds() {
        // Walls at y = +-0.8, narrower than one covering circle.
        struct Narrow;
        impl ObstacleMap for Narrow {
            fn obstacle_distance(&self, _x: f64, y: f64) -> f64 {
                (0.8 - y.abs()).max(0.0)
            }
            fn is_inside(&self, _x: f64, _y: f64) -> bool {
                true
            }
        }
        let config = Config::default();
        let points: Vec<State> = (0..=10).map(|i| State::new(i as f64, 0.0, 0.0)).collect();
        let mut reference = ReferencePath::new();
        reference.set_reference(&points).unwrap();
        reference.update_bounds(&Narrow, &config);
        let vehicle = VehicleState::new(State::default(), State::default());
        let mut formulator = QpFormulator::new(&config);
        let problem = formulator
            .formulate(&reference, &vehicle, &TerminalConstraint::None)
            .unwrap();
        assert!((0..problem.num_constraints()).any(|r| problem.lower[r] > problem.upper[r]));
    }

    #[test]
    fn test_terminal_constraint_from_config() {
        let mut config = Config::default();
        let mut reference = ReferencePath::new();
        let points: Vec<State> = (0..=10).map(|i| State::new(i as f64, 0.0, 0.0)).collect();
        reference.set_reference(&points).unwrap();
        let vehicle = VehicleState::new(State::default(), State::new(10.0, 0.4, 0.2));

        assert_eq!(
            TerminalConstraint::from_config(&config, &reference, &vehicle),
            TerminalConstraint::None
        );
        config.terminal_mode = TerminalMode::Heading;
        match TerminalConstraint::from_config(&config, &reference, &vehicle) {
            TerminalConstraint::HeadingOnly(h) => assert!((h - 0.2).abs() < 1e-9),
            other => panic!("unexpected {:?}", other),
        }
        config.terminal_mode = TerminalMode::HeadingAndOffset;
        config.end_offset_tolerance = 0.1;
        match TerminalConstraint::from_config(&config, &reference, &vehicle) {
            TerminalConstraint::HeadingAndOffset { offset, offset_tolerance, .. } => {
                assert!((offset - 0.4).abs() < 1e-9);
                assert_eq!(offset_tolerance, 0.1);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
