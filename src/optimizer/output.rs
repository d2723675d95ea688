//! Conversion of the QP solution into the output path

use log::{debug, warn};
use nalgebra::DVector;

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::{CollisionCheck, ObstacleMap};
use crate::common::types::{normalize_angle, State};
use crate::config::Config;
use crate::optimizer::formulation::{control_index, num_variables, state_index};
use crate::reference_path::ReferencePath;
use crate::utils::spline::{chord_lengths, curve_curvature, curve_heading, Spline};

/// Result of a successful solve
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedPath {
    pub states: Vec<State>,
    /// Arc length at which the path was cut by a collision
    pub truncated_at: Option<f64>,
}

/// Optimized sample poses: the reference shifted by the lateral error along
/// its normal and rotated by the heading error. The last sample reuses the
/// last segment's curvature.
pub fn solution_to_states(
    solution: &DVector<f64>,
    reference: &ReferencePath,
) -> OptimizerResult<Vec<State>> {
    let horizon = reference.size();
    if horizon < 2 || solution.len() != num_variables(horizon) {
        return Err(OptimizerError::NumericalError(format!(
            "solution of size {} does not match horizon {}",
            solution.len(),
            horizon
        )));
    }
    let states = (0..horizon)
        .map(|i| {
            let e = solution[state_index(i)];
            let psi = solution[state_index(i) + 1];
            let kappa = solution[control_index(horizon, i.min(horizon - 2))];
            let theta = reference.heading()[i];
            let (sin, cos) = theta.sin_cos();
            State::with_all(
                reference.xs()[i] - e * sin,
                reference.ys()[i] + e * cos,
                normalize_angle(theta + psi),
                kappa,
                reference.s()[i],
            )
        })
        .collect();
    Ok(states)
}

/// Interpolants through `states` by chord length, with the chord lengths.
/// Coincident consecutive states are merged.
pub fn fit_output_splines(states: &[State]) -> OptimizerResult<(Spline, Spline, Vec<f64>)> {
    let mut x: Vec<f64> = Vec::with_capacity(states.len());
    let mut y: Vec<f64> = Vec::with_capacity(states.len());
    for p in states {
        if let (Some(&lx), Some(&ly)) = (x.last(), y.last()) {
            if (p.x - lx).hypot(p.y - ly) < 1e-6 {
                continue;
            }
        }
        x.push(p.x);
        y.push(p.y);
    }
    let s = chord_lengths(&x, &y);
    let x_s = Spline::from_points(&s, &x)?;
    let y_s = Spline::from_points(&s, &y)?;
    Ok((x_s, y_s, s))
}

/// Resample the optimized states every `spacing` meters.
pub fn densify(states: &[State], spacing: f64) -> OptimizerResult<Vec<State>> {
    if !(spacing > 0.0) {
        return Err(OptimizerError::InvalidParameter(
            "output spacing must be positive".to_string(),
        ));
    }
    let (x_s, y_s, s) = fit_output_splines(states)?;
    let s_last = s[s.len() - 1];
    let mut dense = Vec::new();
    let mut i = 0;
    loop {
        let s = i as f64 * spacing;
        if s > s_last {
            break;
        }
        dense.push(State::with_all(
            x_s.eval(s),
            y_s.eval(s),
            curve_heading(&x_s, &y_s, s),
            curve_curvature(&x_s, &y_s, s),
            s,
        ));
        i += 1;
    }
    Ok(dense)
}

/// Re-measure `s` as the Euclidean distance along the states.
pub fn accumulate_arc_length(states: &mut [State]) {
    let mut s = 0.0;
    for i in 0..states.len() {
        if i > 0 {
            s += states[i - 1].distance(&states[i]);
        }
        states[i].s = s;
    }
}

/// Cut `states` before the first pose in collision. Returns the arc length of
/// the colliding pose, if any.
pub fn truncate_at_collision(
    states: &mut Vec<State>,
    map: &dyn ObstacleMap,
    checker: &dyn CollisionCheck,
) -> Option<f64> {
    let hit = states
        .iter()
        .position(|state| !checker.is_state_collision_free(map, state))?;
    let s = states[hit].s;
    states.truncate(hit);
    Some(s)
}

/// Build the output path from a QP solution.
///
/// Raw mode emits the optimized samples; otherwise they are densified to
/// `output_spacing`. A path cut by a collision is still a success when its
/// last pose reaches `min_usable_length`.
pub fn build_output(
    solution: &DVector<f64>,
    reference: &ReferencePath,
    map: &dyn ObstacleMap,
    checker: &dyn CollisionCheck,
    config: &Config,
) -> OptimizerResult<OptimizedPath> {
    let optimized = solution_to_states(solution, reference)?;
    let mut states = if config.raw_output {
        let mut states = optimized;
        accumulate_arc_length(&mut states);
        states
    } else {
        densify(&optimized, config.output_spacing)?
    };

    let truncated_at = if config.enable_collision_check {
        truncate_at_collision(&mut states, map, checker)
    } else {
        None
    };
    match truncated_at {
        None => {
            debug!(
                "Output {} result with {} states",
                if config.raw_output { "raw" } else { "densified" },
                states.len()
            );
            Ok(OptimizedPath {
                states,
                truncated_at: None,
            })
        }
        Some(collision_s) => {
            let length = states.last().map(|p| p.s).unwrap_or(0.0);
            warn!(
                "Collision check failed at {:.2} m, path kept up to {:.2} m",
                collision_s, length
            );
            if !states.is_empty() && length >= config.min_usable_length {
                Ok(OptimizedPath {
                    states,
                    truncated_at: Some(collision_s),
                })
            } else {
                Err(OptimizerError::PathTooShort {
                    length,
                    path: states,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct OpenMap;

    impl ObstacleMap for OpenMap {
        fn obstacle_distance(&self, _x: f64, _y: f64) -> f64 {
            100.0
        }

        fn is_inside(&self, _x: f64, _y: f64) -> bool {
            true
        }
    }

    /// Reports a collision for every pose at or beyond arc length `limit`.
    struct CollideBeyond {
        limit: f64,
    }

    impl CollisionCheck for CollideBeyond {
        fn is_state_collision_free(&self, _map: &dyn ObstacleMap, state: &State) -> bool {
            state.s < self.limit
        }
    }

    fn straight_reference(length: f64, spacing: f64) -> ReferencePath {
        let n = (length / spacing).round() as usize;
        let points: Vec<State> = (0..=n)
            .map(|i| State::new(i as f64 * spacing, 0.0, 0.0))
            .collect();
        let mut reference = ReferencePath::new();
        reference.set_reference(&points).unwrap();
        reference
    }

    /// Lateral error following a smooth bump.
    fn bump_solution(reference: &ReferencePath) -> DVector<f64> {
        let horizon = reference.size();
        let mut x = DVector::zeros(num_variables(horizon));
        for i in 0..horizon {
            let s = reference.s()[i];
            x[state_index(i)] = 0.5 * (s / 5.0).sin();
            x[state_index(i) + 1] = 0.1 * (s / 5.0).cos();
        }
        x
    }

    #[test]
    fn test_solution_to_states_offsets_along_normal() {
        let reference = straight_reference(10.0, 1.0);
        let mut x = DVector::zeros(num_variables(reference.size()));
        x[state_index(3)] = 0.7;
        x[state_index(3) + 1] = 0.1;
        x[control_index(reference.size(), 9)] = 0.05;
        let states = solution_to_states(&x, &reference).unwrap();
        assert!((states[3].x - 3.0).abs() < 1e-12);
        assert!((states[3].y - 0.7).abs() < 1e-12);
        assert!((states[3].heading - 0.1).abs() < 1e-12);
        // Last sample takes the last segment's curvature.
        assert_eq!(states[10].curvature, 0.05);
        assert!(solution_to_states(&DVector::zeros(3), &reference).is_err());
    }

    #[test]
    fn test_densified_states_reproduce_optimized_samples() {
        let reference = straight_reference(30.0, 1.0);
        let optimized = solution_to_states(&bump_solution(&reference), &reference).unwrap();
        let (_, _, s) = fit_output_splines(&optimized).unwrap();
        let dense = densify(&optimized, 0.3).unwrap();
        assert!(dense.windows(2).all(|w| (w[1].s - w[0].s - 0.3).abs() < 1e-9));

        // Interpolate the dense output alone and compare with the optimized
        // samples at their arc lengths.
        let dense_s: Vec<f64> = dense.iter().map(|p| p.s).collect();
        let dense_x: Vec<f64> = dense.iter().map(|p| p.x).collect();
        let dense_y: Vec<f64> = dense.iter().map(|p| p.y).collect();
        let x_s = Spline::from_points(&dense_s, &dense_x).unwrap();
        let y_s = Spline::from_points(&dense_s, &dense_y).unwrap();
        let dense_end = dense_s[dense_s.len() - 1];
        assert!(s[s.len() - 1] - dense_end < 0.3);

        let mut checked = 0;
        for (state, &si) in optimized.iter().zip(s.iter()).filter(|(_, &si)| si <= dense_end) {
            assert!((x_s.eval(si) - state.x).abs() < 1e-3, "x at s = {}", si);
            assert!((y_s.eval(si) - state.y).abs() < 1e-3, "y at s = {}", si);
            checked += 1;
        }
        assert!(checked + 1 >= optimized.len());
    }

    #[test]
    fn test_raw_output_measures_euclidean_length() {
        let reference = straight_reference(30.0, 0.5);
        let mut config = Config::default();
        config.raw_output = true;
        let solution = bump_solution(&reference);
        let checker = CollideBeyond { limit: 1e9 };
        let path = build_output(&solution, &reference, &OpenMap, &checker, &config).unwrap();
        assert_eq!(path.states.len(), reference.size());
        assert!(path.truncated_at.is_none());
        // The bump makes the path longer than the reference.
        assert!(path.states[path.states.len() - 1].s > 30.0);
    }

    fn check_truncation(raw_output: bool) {
        let reference = straight_reference(50.0, if raw_output { 0.3 } else { 1.0 });
        let mut config = Config::default();
        config.raw_output = raw_output;
        let solution = bump_solution(&reference);

        let limit = 25.0;
        let path = build_output(&solution, &reference, &OpenMap, &CollideBeyond { limit }, &config)
            .unwrap();
        assert!(path.states.iter().all(|p| p.s < limit));
        assert!(path.states[path.states.len() - 1].s >= 20.0);
        assert!(path.truncated_at.map_or(false, |s| s >= limit));

        let limit = 12.0;
        match build_output(&solution, &reference, &OpenMap, &CollideBeyond { limit }, &config) {
            Err(OptimizerError::PathTooShort { length, path }) => {
                assert!(length < 20.0);
                assert!(path.iter().all(|p| p.s < limit));
            }
            other => panic!("expected a too-short path, got {:?}", other),
        }
    }

    #[test]
    fn test_raw_collision_truncation() {
        check_truncation(true);
    }

    #[test]
    fn test_densified_collision_truncation() {
        check_truncation(false);
    }

    #[test]
    fn test_collision_at_start_fails() {
        let reference = straight_reference(50.0, 1.0);
        let mut config = Config::default();
        config.min_usable_length = 0.0;
        let result = build_output(
            &bump_solution(&reference),
            &reference,
            &OpenMap,
            &CollideBeyond { limit: 0.0 },
            &config,
        );
        assert!(matches!(result, Err(OptimizerError::PathTooShort { .. })));
    }

    #[test]
    fn test_collision_check_disabled() {
        let reference = straight_reference(50.0, 1.0);
        let mut config = Config::default();
        config.enable_collision_check = false;
        let path = build_output(
            &bump_solution(&reference),
            &reference,
            &OpenMap,
            &CollideBeyond { limit: 0.0 },
            &config,
        )
        .unwrap();
        assert!(path.truncated_at.is_none());
        assert!(path.states.len() > 150);
    }
}
