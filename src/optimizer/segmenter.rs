//! Path segmentation
//!
//! Turns the smoothed reference curve into the arc-length grid the QP is
//! formulated on, and measures the vehicle's initial tracking error.

use log::{debug, warn};

use crate::common::error::{OptimizerError, OptimizerResult};
use crate::common::traits::ObstacleMap;
use crate::common::types::{global_to_local, normalize_angle, VehicleState};
use crate::config::Config;
use crate::reference_path::ReferencePath;

/// Goal search step in exact-position mode [m]
const FINE_GOAL_STEP: f64 = 0.1;
/// Goal search step otherwise [m]
const COARSE_GOAL_STEP: f64 = 0.3;

/// Segment `reference` for the vehicle in `vehicle_state`.
///
/// On success the reference holds strictly increasing samples starting at
/// `s = 0` and ending at the (possibly goal-truncated) curve end, with
/// heading, curvature and bounds filled in, and the vehicle state holds the
/// initial offset and heading error.
pub fn segment_smooth_path(
    reference: &mut ReferencePath,
    vehicle_state: &mut VehicleState,
    map: &dyn ObstacleMap,
    config: &Config,
) -> OptimizerResult<()> {
    if !(reference.length() > 0.0) {
        warn!("Smoothed reference has zero length");
        return Err(OptimizerError::EmptyInput);
    }

    let first = reference.pose_at(0.0);
    let local = global_to_local(&first, &vehicle_state.start);
    let distance = local.x.hypot(local.y);
    let offset = if local.y < 0.0 { -distance } else { distance };
    let heading_error = normalize_angle(vehicle_state.start.heading - first.heading);
    vehicle_state.set_initial_error(offset, heading_error);
    if heading_error.abs() > config.max_initial_heading_error {
        warn!(
            "Initial heading error {:.1} deg exceeds {:.1} deg",
            heading_error.to_degrees(),
            config.max_initial_heading_error.to_degrees()
        );
        return Err(OptimizerError::Misaligned(heading_error));
    }

    let end = &vehicle_state.end;
    let curve_end = reference.pose_at(reference.length());
    if curve_end.distance(end) > config.goal_tolerance {
        let step = if config.enable_exact_position {
            FINE_GOAL_STEP
        } else {
            COARSE_GOAL_STEP
        };
        let goal_s = search_goal(reference, end.x, end.y, step);
        debug!(
            "Goal search truncates the reference from {:.2} m to {:.2} m",
            reference.length(),
            goal_s
        );
        reference.set_length(goal_s);
    }

    let delta_s_larger = config.delta_s_larger();
    let delta_s_smaller = if heading_error.abs() < config.small_heading_error {
        delta_s_larger
    } else {
        config.delta_s_smaller
    };
    reference.build_reference_from_spline(
        delta_s_smaller,
        delta_s_larger,
        config.fine_section_length,
    )?;
    reference.update_bounds(map, config);
    debug!(
        "Segmented {:.2} m of reference into {} samples, initial error ({:.3} m, {:.3} rad)",
        reference.length(),
        reference.size(),
        offset,
        heading_error
    );
    Ok(())
}

/// Walk backward from the curve end and return the arc length whose point is
/// closest to `(x, y)`. Ties keep the farthest arc length.
fn search_goal(reference: &ReferencePath, x: f64, y: f64, step: f64) -> f64 {
    let mut best_s = reference.length();
    let mut best_dist = f64::INFINITY;
    let mut s = reference.length();
    while s >= 0.0 {
        let dist = (reference.x_at(s) - x).hypot(reference.y_at(s) - y);
        if dist < best_dist {
            best_dist = dist;
            best_s = s;
        }
        s -= step;
    }
    best_s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::State;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct OpenMap;

    impl ObstacleMap for OpenMap {
        fn obstacle_distance(&self, _x: f64, _y: f64) -> f64 {
            100.0
        }

        fn is_inside(&self, _x: f64, _y: f64) -> bool {
            true
        }
    }

    fn straight_reference(length: f64) -> ReferencePath {
        let points: Vec<State> = (0..=10)
            .map(|i| State::new(length * i as f64 / 10.0, 0.0, 0.0))
            .collect();
        let mut reference = ReferencePath::new();
        reference.set_reference(&points).unwrap();
        reference
    }

    #[test]
    fn test_initial_error_sign() {
        let config = Config::default();
        let mut reference = straight_reference(30.0);
        let mut vehicle = VehicleState::new(
            State::new(0.0, -0.5, 0.2),
            State::new(30.0, 0.0, 0.0),
        );
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((vehicle.initial_offset + 0.5).abs() < 1e-9);
        assert!((vehicle.initial_heading_error - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_misaligned_start_rejected() {
        let config = Config::default();
        let mut reference = straight_reference(30.0);
        let mut vehicle = VehicleState::new(
            State::new(0.0, 0.0, 80.0_f64.to_radians()),
            State::new(30.0, 0.0, 0.0),
        );
        let result = segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config);
        assert!(matches!(result, Err(OptimizerError::Misaligned(_))));
        // The measured error is kept for inspection.
        let (offset, heading_error) = vehicle.initial_error();
        assert!(offset.abs() < 1e-9);
        assert!((heading_error - 80.0_f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_goal_search_truncates() {
        let config = Config::default();
        let mut reference = straight_reference(30.0);
        let mut vehicle = VehicleState::new(
            State::new(0.0, 0.0, 0.0),
            State::new(21.0, 1.0, 0.0),
        );
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((reference.length() - 21.0).abs() <= 0.15 + 1e-9);
        let s = reference.s();
        assert!((s[s.len() - 1] - reference.length()).abs() < 1e-12);
    }

    #[test]
    fn test_exact_position_refines_goal_search() {
        let mut config = Config::default();
        let goal = State::new(21.14, 1.0, 0.0);

        let mut reference = straight_reference(30.0);
        let mut vehicle = VehicleState::new(State::new(0.0, 0.0, 0.0), goal);
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((reference.length() - 21.0).abs() < 1e-6, "{}", reference.length());

        config.enable_exact_position = true;
        let mut reference = straight_reference(30.0);
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((reference.length() - 21.1).abs() < 1e-6, "{}", reference.length());
        assert!((reference.length() - goal.x).abs() <= 0.05 + 1e-9);
    }

    #[test]
    fn test_fine_section_only_with_large_heading_error() {
        let config = Config::default();
        let mut reference = straight_reference(30.0);
        let mut vehicle = VehicleState::new(
            State::new(0.0, 0.0, 0.0),
            State::new(30.0, 0.0, 0.0),
        );
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((reference.s()[1] - 1.0).abs() < 1e-12);

        let mut reference = straight_reference(30.0);
        vehicle.start.heading = 0.5;
        segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
        assert!((reference.s()[1] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_empty_reference_rejected() {
        let config = Config::default();
        let mut reference = ReferencePath::new();
        let mut vehicle = VehicleState::new(State::default(), State::default());
        let result = segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config);
        assert!(matches!(result, Err(OptimizerError::EmptyInput)));
    }

    #[test]
    fn test_segmentation_is_monotone() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            let mut config = Config::default();
            config.raw_output = rng.gen_bool(0.5);
            config.output_spacing = rng.gen_range(0.1..2.0);
            config.fine_section_length = rng.gen_range(0.0..5.0);
            let length = rng.gen_range(0.05..40.0);
            let mut reference = straight_reference(length);
            let mut vehicle = VehicleState::new(
                State::new(0.0, rng.gen_range(-1.0..1.0), rng.gen_range(-1.2..1.2)),
                State::new(length, 0.0, 0.0),
            );
            segment_smooth_path(&mut reference, &mut vehicle, &OpenMap, &config).unwrap();
            let s = reference.s();
            assert!(s.len() >= 2);
            assert_eq!(s[0], 0.0);
            assert!(s.windows(2).all(|w| w[1] > w[0]), "{:?}", s);
            assert!((s[s.len() - 1] - reference.length()).abs() < 1e-12);
            assert_eq!(reference.bounds().len(), s.len());
        }
    }
}
