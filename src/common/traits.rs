//! Common traits defining the collaborators of the path optimizer

use crate::common::error::OptimizerResult;
use crate::common::types::State;
use crate::reference_path::ReferencePath;

/// Obstacle map queried for clearance around poses.
pub trait ObstacleMap {
    /// Distance [m] from (x, y) to the closest obstacle, 0 when (x, y) is occupied
    /// or outside the map.
    fn obstacle_distance(&self, x: f64, y: f64) -> f64;

    /// Whether (x, y) lies inside the mapped area.
    fn is_inside(&self, x: f64, y: f64) -> bool;

    /// Free lateral interval around `pose`, measured along its normal.
    ///
    /// Returns `(lower, upper)` with `lower <= 0 <= upper`, where `upper` is the
    /// free distance to the left and `lower` the negated free distance to the
    /// right, both capped at `search_range`. Points outside the map count as
    /// occupied; an occupied pose yields `(0, 0)`.
    fn lateral_clearance(&self, pose: &State, search_range: f64, resolution: f64) -> (f64, f64) {
        if !self.is_inside(pose.x, pose.y) || self.obstacle_distance(pose.x, pose.y) <= 0.0 {
            return (0.0, 0.0);
        }
        let normal = pose.normal();
        let march = |sign: f64| -> f64 {
            let point = |d: f64| (pose.x + sign * d * normal[0], pose.y + sign * d * normal[1]);
            let inside = |d: f64| {
                let (x, y) = point(d);
                self.is_inside(x, y)
            };
            let mut free = 0.0;
            let mut d = 0.0;
            loop {
                if !inside(d) {
                    // Leaps only see obstacles; walk up to the map edge.
                    while free + resolution < d && inside(free + resolution) {
                        free += resolution;
                    }
                    return free;
                }
                let (x, y) = point(d);
                let clearance = self.obstacle_distance(x, y);
                if clearance <= 0.0 {
                    return (d - resolution).max(0.0);
                }
                if d >= search_range {
                    return search_range;
                }
                free = d;
                // Leap through free space, never slower than the resolution.
                d = (d + clearance.max(resolution)).min(search_range);
            }
        };
        (-march(-1.0), march(1.0))
    }
}

/// Single-pose collision test.
pub trait CollisionCheck {
    fn is_state_collision_free(&self, map: &dyn ObstacleMap, state: &State) -> bool;
}

/// Turns a raw reference point sequence into a continuous reference curve.
pub trait ReferenceSmoother {
    /// Fill `reference` with interpolants starting at the point closest to
    /// `start` and return a sampled version of the smoothed curve.
    fn smooth(
        &mut self,
        points: &[State],
        start: &State,
        map: &dyn ObstacleMap,
        reference: &mut ReferencePath,
    ) -> OptimizerResult<Vec<State>>;

    /// Rows recorded while searching, for visualization.
    fn search_diagnostics(&self) -> &[Vec<f64>];
}
